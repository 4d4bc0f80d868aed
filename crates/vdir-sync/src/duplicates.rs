use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use vdir_core::{column, Record};
use vdir_storage::{fetch_records, Query, RecordStore};

use crate::merge::{fold_into, FieldChange};
use crate::report::JobReport;

pub const JOB: &str = "find-duplicates";

/// Records sharing a lowercase trimmed name and a city value.
pub fn group_duplicates(records: Vec<Record>) -> Vec<Vec<Record>> {
    let mut groups: BTreeMap<(String, String), Vec<Record>> = BTreeMap::new();
    for record in records {
        let key = (
            record.name.trim().to_lowercase(),
            record.city.clone().unwrap_or_default(),
        );
        groups.entry(key).or_default().push(record);
    }
    let mut duplicates = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .collect::<Vec<_>>();
    duplicates.sort_by(|a, b| b.len().cmp(&a.len()));
    duplicates
}

fn prefer(best: Record, current: Record) -> Record {
    for col in [column::CONTENT, column::MAIN_IMAGE] {
        match (best.has_value(col), current.has_value(col)) {
            (false, true) => return current,
            (true, false) => return best,
            _ => {}
        }
    }
    let created = |r: &Record| r.text(column::CREATED_AT).unwrap_or_default();
    if created(&current) < created(&best) {
        current
    } else {
        best
    }
}

/// Split a group into its keeper and the rest. The keeper is the member
/// with content, then with a main image, then the oldest.
pub fn pick_keeper(group: Vec<Record>) -> Option<(Record, Vec<Record>)> {
    let keeper = group.iter().cloned().reduce(prefer)?;
    let others = group
        .into_iter()
        .filter(|r| r.id != keeper.id || r.slug != keeper.slug)
        .collect();
    Some((keeper, others))
}

#[derive(Debug, Clone, Serialize)]
struct GroupEntry {
    name: String,
    city: Option<String>,
    keep_slug: String,
    merged: Vec<String>,
    failed: Vec<String>,
    changes: Vec<FieldChange>,
}

/// Collapse every duplicate group into its keeper. Group members differ in
/// name only by case and padding, so the keeper's name is never merged.
pub async fn find_duplicates(store: &dyn RecordStore, columns: &[String]) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let columns = columns
        .iter()
        .filter(|col| col.as_str() != column::NAME)
        .cloned()
        .collect::<Vec<_>>();
    let records = fetch_records(store, &Query::new().order_by(column::NAME))
        .await
        .context("fetching records to group")?;
    let groups = group_duplicates(records);
    info!(groups = groups.len(), "duplicate groups found");

    for group in groups {
        let Some((mut keeper, others)) = pick_keeper(group) else {
            continue;
        };
        report.tally("groups");
        let span = info_span!("group", keep = %keeper.slug, size = others.len() + 1);
        let mut entry = GroupEntry {
            name: keeper.name.clone(),
            city: keeper.city.clone(),
            keep_slug: keeper.slug.clone(),
            merged: Vec::new(),
            failed: Vec::new(),
            changes: Vec::new(),
        };

        for other in others {
            match fold_into(store, &keeper, &other, &columns)
                .instrument(span.clone())
                .await
            {
                Ok(changes) => {
                    for change in &changes {
                        keeper.set(&change.field, change.new.clone());
                    }
                    info!(keep = %keeper.slug, deleted = %other.slug, "duplicate merged");
                    report.tally("deleted");
                    entry.merged.push(other.slug);
                    entry.changes.extend(changes);
                }
                Err(e) => {
                    warn!(keep = %keeper.slug, other = %other.slug, error = %e, "merge failed");
                    report.tally("failed");
                    entry.failed.push(other.slug);
                }
            }
        }
        report.push_entry(&entry);
    }
    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use serde_json::json;
    use vdir_storage::{find_by_slug, MemoryStore};

    fn record(value: serde_json::Value) -> Record {
        Record::from_row(row(value)).expect("record")
    }

    #[test]
    fn groups_ignore_case_and_padding_but_not_city() {
        let groups = group_duplicates(vec![
            record(json!({"slug": "a", "name": "Aman", "city": "tokyo"})),
            record(json!({"slug": "b", "name": " aman ", "city": "tokyo"})),
            record(json!({"slug": "c", "name": "Aman", "city": "kyoto"})),
            record(json!({"slug": "d", "name": "Solo", "city": "tokyo"})),
        ]);
        assert_eq!(groups.len(), 1);
        let slugs: Vec<_> = groups[0].iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, ["a", "b"]);
    }

    #[test]
    fn keeper_prefers_content_then_image_then_oldest() {
        let (keeper, others) = pick_keeper(vec![
            record(json!({"id": 1, "slug": "a", "name": "X", "main_image": "a.jpg", "created_at": "2023-01-01"})),
            record(json!({"id": 2, "slug": "b", "name": "X", "content": "Long read.", "created_at": "2024-01-01"})),
        ])
        .expect("keeper");
        assert_eq!(keeper.slug, "b");
        assert_eq!(others.len(), 1);

        let (keeper, _) = pick_keeper(vec![
            record(json!({"id": 1, "slug": "a", "name": "X", "created_at": "2023-01-01"})),
            record(json!({"id": 2, "slug": "b", "name": "X", "main_image": "b.jpg", "created_at": "2024-01-01"})),
        ])
        .expect("keeper");
        assert_eq!(keeper.slug, "b");

        let (keeper, _) = pick_keeper(vec![
            record(json!({"id": 1, "slug": "a", "name": "X", "created_at": "2024-05-01"})),
            record(json!({"id": 2, "slug": "b", "name": "X", "created_at": "2023-05-01"})),
            record(json!({"id": 3, "slug": "c", "name": "X", "created_at": "2023-05-01"})),
        ])
        .expect("keeper");
        assert_eq!(keeper.slug, "b");
    }

    #[tokio::test]
    async fn duplicates_fold_into_keeper_and_are_deleted() {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "aman-tokyo", "name": "Aman Tokyo", "city": "tokyo", "created_at": "2023-01-01"})),
                    row(json!({"slug": "aman-tokyo-2", "name": "aman tokyo", "city": "tokyo", "content": "Otemachi tower.", "architect": "Kerry Hill"})),
                    row(json!({"slug": "aman-tokyo-3", "name": "Aman Tokyo ", "city": "tokyo", "gallery": ["1.jpg"]})),
                    row(json!({"slug": "aman-kyoto", "name": "Aman Kyoto", "city": "kyoto"})),
                ],
            )
            .await;
        let columns = vec!["architect".to_string(), "gallery".to_string()];

        let report = find_duplicates(&store, &columns).await.expect("job");
        assert_eq!(report.count("groups"), 1);
        assert_eq!(report.count("deleted"), 2);
        assert_eq!(store.rows("destinations").await.len(), 2);

        let keeper = find_by_slug(&store, "aman-tokyo-2").await.expect("lookup").expect("keeper");
        assert_eq!(keeper.text("architect").as_deref(), Some("Kerry Hill"));
        assert_eq!(keeper.list("gallery"), vec!["1.jpg".to_string()]);
        assert!(find_by_slug(&store, "aman-tokyo").await.expect("lookup").is_none());
        assert_eq!(report.entries[0]["keep_slug"], json!("aman-tokyo-2"));
    }

    #[tokio::test]
    async fn padded_name_never_replaces_the_keeper_name() {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "aman-tokyo", "name": "Aman Tokyo", "city": "tokyo", "content": "Otemachi tower."})),
                    row(json!({"slug": "aman-tokyo-2", "name": "Aman Tokyo ", "city": "tokyo", "architect": "Kerry Hill"})),
                ],
            )
            .await;
        let columns = vec!["name".to_string(), "architect".to_string()];

        let report = find_duplicates(&store, &columns).await.expect("job");
        assert_eq!(report.count("deleted"), 1);
        let keeper = find_by_slug(&store, "aman-tokyo").await.expect("lookup").expect("keeper");
        assert_eq!(keeper.name, "Aman Tokyo");
        assert_eq!(keeper.text("architect").as_deref(), Some("Kerry Hill"));
        let changed: Vec<_> = report.entries[0]["changes"]
            .as_array()
            .expect("changes")
            .iter()
            .map(|c| c["field"].clone())
            .collect();
        assert_eq!(changed, vec![json!("architect")]);
    }
}
