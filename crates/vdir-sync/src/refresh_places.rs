use anyhow::{Context, Result};
use tracing::{info, warn};
use vdir_adapters::PlaceLookup;
use vdir_core::{column, table};
use vdir_storage::{fetch_records, Filter, Query, RecordStore};

use crate::merge::record_filter;
use crate::report::JobReport;
use crate::verify::coverage;

pub const JOB: &str = "refresh-places";

/// Columns whose first-time fill is tallied separately.
const TRACKED: &[(&str, &str)] = &[
    (column::PRICE_LEVEL, "price_level_added"),
    (column::OPENING_HOURS_JSON, "opening_hours_added"),
    (column::PHONE_NUMBER, "phone_added"),
];

/// Columns whose fill rate closes the run.
pub const PLACES_COVERAGE: &[&str] = &[
    column::PRICE_LEVEL,
    column::OPENING_HOURS_JSON,
    column::PHONE_NUMBER,
    "rating",
    "user_ratings_total",
    "formatted_address",
    "international_phone_number",
    "website",
    "latitude",
    "longitude",
    "tags",
];

/// Re-fetch place details for every record that already has a place id.
pub async fn refresh_places(store: &dyn RecordStore, places: &dyn PlaceLookup) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let query = Query::new()
        .filter(Filter::not_null(column::GOOGLE_PLACE_ID))
        .order_by(column::ID);
    let records = fetch_records(store, &query)
        .await
        .context("fetching records with a place id")?;
    for (col, _) in TRACKED {
        let missing = records.iter().filter(|r| !r.has_value(col)).count();
        info!(column = col, missing, "missing before refresh");
    }

    let total = records.len();
    for (i, record) in records.iter().enumerate() {
        if (i + 1) % 50 == 0 {
            info!(progress = %format!("{}/{total}", i + 1), "refreshing");
        }
        let Some(place_id) = record.text(column::GOOGLE_PLACE_ID) else {
            continue;
        };
        let details = match places.place_details(&place_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                report.tally("not_found");
                continue;
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "details lookup failed");
                report.tally("failed");
                continue;
            }
        };

        let patch = details.to_patch();
        if patch.is_empty() {
            report.tally("no_new_data");
            continue;
        }
        match store
            .update(table::DESTINATIONS, &[record_filter(record)], patch.as_row())
            .await
        {
            Ok(_) => {
                report.tally("updated");
                for (col, key) in TRACKED {
                    if patch.contains(col) && !record.has_value(col) {
                        report.tally(key);
                    }
                }
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "update failed");
                report.tally("failed");
            }
        }
    }

    match coverage(store, PLACES_COVERAGE).await {
        Ok(rows) => {
            for row in &rows {
                info!("{row}");
            }
            report.coverage = rows;
        }
        Err(e) => warn!(error = %e, "coverage query failed"),
    }
    Ok(report.finish())
}
