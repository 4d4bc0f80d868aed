use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use vdir_storage::ReportStore;

use crate::verify::Coverage;

/// Outcome of one job run: tallies plus the per-record change and review
/// lists. Persisted as `<reports>/<run_id>/<job>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub run_id: Uuid,
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manual_review: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<Coverage>,
}

impl JobReport {
    pub fn start(job: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            counts: BTreeMap::new(),
            entries: Vec::new(),
            manual_review: Vec::new(),
            coverage: Vec::new(),
        }
    }

    pub fn tally(&mut self, key: &str) {
        self.add(key, 1);
    }

    pub fn add(&mut self, key: &str, n: usize) {
        *self.counts.entry(key.to_string()).or_default() += n;
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn push_entry(&mut self, entry: impl Serialize) {
        match serde_json::to_value(entry) {
            Ok(value) => self.entries.push(value),
            Err(e) => tracing::warn!(job = %self.job, error = %e, "dropping unserializable report entry"),
        }
    }

    pub fn push_review(&mut self, entry: impl Serialize) {
        match serde_json::to_value(entry) {
            Ok(value) => self.manual_review.push(value),
            Err(e) => tracing::warn!(job = %self.job, error = %e, "dropping unserializable review entry"),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// `job: key=n key=n` line for the console summary.
    pub fn summary_line(&self) -> String {
        let counts = self
            .counts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} complete: run_id={} {counts}", self.job, self.run_id)
    }

    pub async fn save(&self, reports: &ReportStore) -> Result<PathBuf> {
        reports
            .write_json(self.run_id, &self.job, self)
            .await
            .with_context(|| format!("saving {} report", self.job))
    }
}
