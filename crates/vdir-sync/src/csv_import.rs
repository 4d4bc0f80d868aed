use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use vdir_adapters::SpaceRow;
use vdir_core::{column, table, Patch, Record};
use vdir_storage::{fetch_records, find_by_slug, Filter, Query, RecordStore};

use crate::matcher::{best_match, MatchClass, MatchConfig};
use crate::merge::record_filter;
use crate::report::JobReport;

pub const IMPORT_JOB: &str = "import-csv";
pub const MERGE_JOB: &str = "merge-csv";

#[derive(Debug, Clone, Serialize)]
struct ImportEntry<'a> {
    slug: &'a str,
    action: &'static str,
    fields: Vec<&'a String>,
}

/// Write `patch` onto `record`; true only when a row was actually updated.
async fn apply_update(store: &dyn RecordStore, report: &mut JobReport, record: &Record, patch: &Patch) -> bool {
    match store
        .update(table::DESTINATIONS, &[record_filter(record)], patch.as_row())
        .await
    {
        Ok(0) => {
            warn!(slug = %record.slug, "record vanished before update");
            report.tally("failed");
            false
        }
        Ok(_) => {
            report.tally("updated");
            report.push_entry(ImportEntry {
                slug: &record.slug,
                action: "updated",
                fields: patch.iter().map(|(k, _)| k).collect(),
            });
            true
        }
        Err(e) => {
            warn!(slug = %record.slug, error = %e, "update failed");
            report.tally("failed");
            false
        }
    }
}

/// Partial update of existing records keyed by the export's slug column.
pub async fn import_csv(store: &dyn RecordStore, rows: &[SpaceRow]) -> Result<JobReport> {
    let mut report = JobReport::start(IMPORT_JOB);
    info!(rows = rows.len(), "importing export rows");

    for row in rows {
        let Some(slug) = row.slug() else {
            report.tally("no_slug");
            continue;
        };
        let record = match find_by_slug(store, &slug).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.tally("skipped_not_found");
                continue;
            }
            Err(e) => {
                warn!(slug = %slug, error = %e, "lookup failed");
                report.tally("failed");
                continue;
            }
        };
        let patch = row.update_patch();
        if patch.is_empty() {
            report.tally("no_new_data");
            continue;
        }
        apply_update(store, &mut report, &record, &patch).await;
    }
    Ok(report.finish())
}

/// Reconcile the export against the whole directory: exact slug hits and
/// confident fuzzy matches are updated, near misses go to manual review,
/// everything else is inserted as a new record.
pub async fn merge_csv(store: &dyn RecordStore, rows: &[SpaceRow], config: &MatchConfig) -> Result<JobReport> {
    let mut report = JobReport::start(MERGE_JOB);
    let mut pool = fetch_records(store, &Query::new().order_by(column::ID))
        .await
        .context("fetching records to match against")?;
    info!(rows = rows.len(), existing = pool.len(), "merging export");

    for row in rows {
        let (Some(title), Some(city)) = (row.title(), row.city()) else {
            report.tally("skipped_incomplete");
            continue;
        };
        let patch = row.update_patch();

        let exact = row
            .slug()
            .and_then(|slug| pool.iter().position(|r| r.slug == slug));
        let outcome = best_match(config, &title, &city, &pool);
        let target = match (exact, outcome.class) {
            (Some(index), _) => Some(index),
            (None, MatchClass::High) => outcome.index,
            (None, MatchClass::Review) => {
                info!(title = %title, similarity = outcome.score, "manual review needed");
                report.tally("manual_review");
                report.push_review(json!({
                    "csv_title": title,
                    "csv_slug": row.slug.trim(),
                    "csv_city": city,
                    "csv_type": row.kind.trim(),
                    "similarity": outcome.score,
                    "action": "MANUAL_REVIEW_NEEDED",
                }));
                continue;
            }
            (None, MatchClass::New) => None,
        };

        if let Some(index) = target {
            if patch.is_empty() {
                report.tally("no_new_data");
                continue;
            }
            if apply_update(store, &mut report, &pool[index], &patch).await {
                pool[index].apply_patch(&patch);
            }
            continue;
        }

        let new_row = row.new_record_row();
        match store.insert(table::DESTINATIONS, &new_row).await {
            Ok(inserted) => {
                info!(title = %title, "added new record");
                report.tally("added");
                report.push_entry(json!({
                    "slug": inserted.get(column::SLUG),
                    "action": "added",
                }));
                match Record::from_row(inserted) {
                    Ok(record) => pool.push(record),
                    Err(e) => warn!(title = %title, error = %e, "inserted row did not decode"),
                }
            }
            Err(e) if e.is_unique_violation() => {
                warn!(title = %title, error = %e, "slug already taken");
                report.tally("failed");
            }
            Err(e) => {
                warn!(title = %title, error = %e, "insert failed");
                report.tally("failed");
            }
        }
    }

    match store.count(table::DESTINATIONS, &[Filter::eq(column::COUNTRY, "Unknown")]).await {
        Ok(n) if n > 0 => info!(records = n, "records need a country filled in"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not count records without country"),
    }
    Ok(report.finish())
}
