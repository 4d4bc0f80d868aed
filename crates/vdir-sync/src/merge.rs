use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use vdir_core::{column, is_empty_value, table, MergePair, Patch, Record};
use vdir_storage::{find_by_slug, Filter, RecordStore, StoreError};

use crate::config::MergeConfig;
use crate::report::JobReport;

pub const JOB: &str = "merge-duplicates";

/// Resolve one column of a duplicate pair. Empty `delete` keeps `keep`;
/// empty `keep` takes `delete`; strings prefer the longer; lists union
/// without duplicates (keep's items first); numbers prefer non-zero.
/// Anything else, ties included, stays with `keep`.
pub fn merge_field(keep: &Value, delete: &Value) -> Value {
    if is_empty_value(delete) {
        return keep.clone();
    }
    if is_empty_value(keep) {
        return delete.clone();
    }
    match (keep, delete) {
        (Value::String(k), Value::String(d)) => {
            if d.chars().count() > k.chars().count() {
                delete.clone()
            } else {
                keep.clone()
            }
        }
        (Value::Array(k), Value::Array(d)) => {
            let mut union: Vec<Value> = Vec::with_capacity(k.len() + d.len());
            for item in k.iter().chain(d.iter()) {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        (Value::Number(k), Value::Number(d)) => {
            let is_zero = |n: &serde_json::Number| n.as_f64() == Some(0.0);
            if is_zero(k) && !is_zero(d) {
                delete.clone()
            } else {
                keep.clone()
            }
        }
        _ => keep.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Patch for `keep` carrying only the columns whose merged value differs.
pub fn merged_patch(keep: &Record, other: &Record, columns: &[String]) -> (Patch, Vec<FieldChange>) {
    let mut patch = Patch::new();
    let mut changes = Vec::new();
    for field in columns {
        let old = keep.value(field);
        let new = merge_field(&old, &other.value(field));
        if new != old {
            patch.set(field, new.clone());
            changes.push(FieldChange {
                field: field.clone(),
                old,
                new,
            });
        }
    }
    (patch, changes)
}

/// Filter addressing exactly this record: id when known, slug otherwise.
pub fn record_filter(record: &Record) -> Filter {
    match record.id {
        Some(id) => Filter::eq(column::ID, id),
        None => Filter::eq(column::SLUG, record.slug.as_str()),
    }
}

/// Fold `other` into `keep`: update `keep` with the merged columns, then
/// delete `other`. The delete is never issued if the update failed.
pub async fn fold_into(
    store: &dyn RecordStore,
    keep: &Record,
    other: &Record,
    columns: &[String],
) -> Result<Vec<FieldChange>, StoreError> {
    let (patch, changes) = merged_patch(keep, other, columns);
    for change in &changes {
        info!(field = %change.field, old = %change.old, new = %change.new, "merging field");
    }
    if !patch.is_empty() {
        let updated = store
            .update(table::DESTINATIONS, &[record_filter(keep)], patch.as_row())
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("record {} vanished before update", keep.slug)));
        }
    }
    store
        .delete(table::DESTINATIONS, &[record_filter(other)])
        .await?;
    Ok(changes)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub name: String,
    pub keep_slug: String,
    pub delete_slug: String,
    pub status: MergeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

impl MergeResult {
    fn error(pair: &MergePair, message: String) -> Self {
        Self {
            name: pair.name.clone(),
            keep_slug: pair.keep_slug.clone(),
            delete_slug: pair.delete_slug.clone(),
            status: MergeStatus::Error,
            message: Some(message),
            changes: Vec::new(),
        }
    }
}

async fn merge_pair(store: &dyn RecordStore, pair: &MergePair, columns: &[String]) -> MergeResult {
    let lookups = (
        find_by_slug(store, &pair.keep_slug).await,
        find_by_slug(store, &pair.delete_slug).await,
    );
    let (keep, other) = match lookups {
        (Ok(Some(keep)), Ok(Some(other))) => (keep, other),
        (Ok(keep), Ok(other)) => {
            return MergeResult::error(
                pair,
                format!(
                    "entry not found (keep found: {}, delete found: {})",
                    keep.is_some(),
                    other.is_some()
                ),
            )
        }
        (Err(e), _) | (_, Err(e)) => return MergeResult::error(pair, e.to_string()),
    };

    match fold_into(store, &keep, &other, columns).await {
        Ok(changes) => MergeResult {
            name: pair.name.clone(),
            keep_slug: pair.keep_slug.clone(),
            delete_slug: pair.delete_slug.clone(),
            status: MergeStatus::Success,
            message: None,
            changes,
        },
        Err(e) => MergeResult::error(pair, e.to_string()),
    }
}

/// Merge every configured duplicate pair.
pub async fn merge_duplicates(store: &dyn RecordStore, config: &MergeConfig) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    info!(pairs = config.pairs.len(), "merging duplicate pairs");

    for pair in &config.pairs {
        let span = info_span!("merge_pair", keep = %pair.keep_slug, delete = %pair.delete_slug);
        let result = merge_pair(store, pair, &config.columns).instrument(span).await;
        match result.status {
            MergeStatus::Success => {
                info!(name = %pair.name, changes = result.changes.len(), "merged");
                report.tally("merged");
            }
            MergeStatus::Error => {
                warn!(
                    name = %pair.name,
                    error = result.message.as_deref().unwrap_or_default(),
                    "merge failed"
                );
                report.tally("failed");
            }
        }
        report.push_entry(&result);
    }

    match store.count(table::DESTINATIONS, &[]).await {
        Ok(total) => report.add("final_records", total),
        Err(e) => warn!(error = %e, "could not count records after merge"),
    }
    Ok(report.finish())
}
