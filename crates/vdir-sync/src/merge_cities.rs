use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};
use vdir_core::{column, table, Patch};
use vdir_storage::{Filter, RecordStore};

use crate::config::CityAlias;
use crate::report::JobReport;

pub const JOB: &str = "merge-cities";

/// Rewrite the city of every record filed under an alias to its target.
pub async fn merge_cities(store: &dyn RecordStore, aliases: &[CityAlias]) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    for alias in aliases {
        let mut patch = Patch::new();
        patch.set(column::CITY, alias.into.as_str());
        match store
            .update(
                table::DESTINATIONS,
                &[Filter::eq(column::CITY, alias.from.as_str())],
                patch.as_row(),
            )
            .await
        {
            Ok(rows) => {
                info!(from = %alias.from, into = %alias.into, rows, "city merged");
                report.add("records_updated", rows);
                report.tally("aliases_applied");
                report.push_entry(json!({"from": alias.from, "into": alias.into, "records": rows}));
            }
            Err(e) => {
                warn!(from = %alias.from, into = %alias.into, error = %e, "city merge failed");
                report.tally("failed");
            }
        }
    }
    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use vdir_storage::{fetch_records, MemoryStore, Query};

    #[tokio::test]
    async fn aliases_rewrite_every_matching_record() {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "a", "name": "A", "city": "ho-chi-minh-city"})),
                    row(json!({"slug": "b", "name": "B", "city": "saigon"})),
                    row(json!({"slug": "c", "name": "C", "city": "ho-chi-minh-city"})),
                    row(json!({"slug": "d", "name": "D", "city": "hanoi"})),
                ],
            )
            .await;
        let aliases = vec![
            CityAlias { from: "ho-chi-minh-city".into(), into: "saigon".into() },
            CityAlias { from: "bombay".into(), into: "mumbai".into() },
        ];

        let report = merge_cities(&store, &aliases).await.expect("job");
        assert_eq!(report.count("records_updated"), 2);
        assert_eq!(report.count("aliases_applied"), 2);

        let records = fetch_records(&store, &Query::new().filter(Filter::eq("city", "saigon")))
            .await
            .expect("records");
        assert_eq!(records.len(), 3);
    }
}
