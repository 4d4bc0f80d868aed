use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug_span, Instrument};

use crate::SlidingWindowLimiter;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },
}

/// JSON-over-HTTP client for third-party APIs. Every call first passes the
/// shared rate limiter, when one is configured. There is no retry: a failed
/// call is returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct ApiHttp {
    client: reqwest::Client,
    limiter: Option<Arc<SlidingWindowLimiter>>,
}

impl ApiHttp {
    pub fn new(config: HttpClientConfig, limiter: Option<SlidingWindowLimiter>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            limiter: limiter.map(Arc::new),
        })
    }

    pub fn limiter(&self) -> Option<&SlidingWindowLimiter> {
        self.limiter.as_deref()
    }

    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        self.throttle().await;
        let request = self.client.get(url).query(query);
        Self::execute(request, url)
            .instrument(debug_span!("api_get", url))
            .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, FetchError> {
        self.throttle().await;
        let request = self.client.post(url).query(query).json(body);
        Self::execute(request, url)
            .instrument(debug_span!("api_post", url))
            .await
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }

    async fn execute(request: reqwest::RequestBuilder, url: &str) -> Result<Value, FetchError> {
        let resp = request.send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Request(err)
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }
}
