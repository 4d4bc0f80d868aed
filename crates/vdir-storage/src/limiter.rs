use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Admits at most `limit` call starts within any rolling `window`.
///
/// Start times of recent calls are kept in memory; when the window is full
/// the caller sleeps until the oldest start ages out.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            starts: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for capacity and record a call start. Returns the time spent
    /// waiting.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let mut starts = self.starts.lock().await;
            let now = Instant::now();
            while starts
                .front()
                .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
            {
                starts.pop_front();
            }

            if starts.len() < self.limit {
                starts.push_back(now);
                return waited;
            }

            let Some(&oldest) = starts.front() else {
                continue;
            };
            let sleep_for = (oldest + self.window).saturating_duration_since(now);
            drop(starts);
            info!(
                limit = self.limit,
                wait_secs = sleep_for.as_secs_f64(),
                "rate limit reached, waiting"
            );
            tokio::time::sleep(sleep_for).await;
            waited += sleep_for;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_calls_up_to_limit_do_not_wait() {
        let limiter = SlidingWindowLimiter::per_minute(3);
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn call_past_limit_waits_for_oldest_to_expire() {
        let limiter = SlidingWindowLimiter::per_minute(2);
        let origin = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(50));
        assert_eq!(Instant::now().duration_since(origin), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_limit_starts_in_any_window() {
        let limit = 4;
        let window = Duration::from_secs(60);
        let limiter = SlidingWindowLimiter::new(limit, window);
        let mut starts = Vec::new();
        for i in 0..17u64 {
            limiter.acquire().await;
            starts.push(Instant::now());
            tokio::time::advance(Duration::from_secs(i % 7)).await;
        }
        for pair in starts.windows(limit + 1) {
            let first = pair[0];
            let last = pair[limit];
            assert!(last.duration_since(first) >= window);
        }
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        assert_eq!(SlidingWindowLimiter::per_minute(0).limit(), 1);
    }
}
