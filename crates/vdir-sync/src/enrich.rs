use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use vdir_adapters::{AdapterError, Embedder, PlaceLookup, TagGenerator};
use vdir_core::{column, table, Patch, Record};
use vdir_storage::{fetch_records, Filter, Query, RecordStore};

use crate::embeddings::{embed_record, EmbedOutcome};
use crate::report::JobReport;

pub const JOB: &str = "enrich";

/// External sources available to an enrichment run. Any of them may be
/// absent; its fields are then simply not produced.
#[derive(Clone, Copy, Default)]
pub struct Enrichers<'a> {
    pub places: Option<&'a dyn PlaceLookup>,
    pub tagger: Option<&'a dyn TagGenerator>,
    pub embedder: Option<&'a dyn Embedder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Skipped,
    NotFound,
    Ok,
    Failed,
}

/// Per-record outcome of each enrichment step.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichEntry {
    pub slug: String,
    pub places: StepStatus,
    pub ai: StepStatus,
    pub embedding: StepStatus,
    pub fields: Vec<String>,
}

fn status_key(step: &str, status: StepStatus) -> Option<String> {
    match status {
        StepStatus::Skipped => None,
        StepStatus::NotFound => Some(format!("{step}_not_found")),
        StepStatus::Ok => Some(format!("{step}_ok")),
        StepStatus::Failed => Some(format!("{step}_failed")),
    }
}

async fn places_patch(places: &dyn PlaceLookup, record: &Record) -> Result<Option<Patch>, AdapterError> {
    let query = match record.city.as_deref() {
        Some(city) => format!("{} {city}", record.name),
        None => record.name.clone(),
    };
    let Some(place_id) = places.find_place_id(&query).await? else {
        return Ok(None);
    };
    let Some(details) = places.place_details(&place_id).await? else {
        return Ok(None);
    };
    let mut patch = details.to_patch();
    patch.set(column::GOOGLE_PLACE_ID, place_id);
    Ok(Some(patch))
}

/// Gather fields for one record from every available source. Each source
/// failing only drops its own fields.
pub async fn enrich_record(enrichers: Enrichers<'_>, record: &Record) -> (Patch, EnrichEntry) {
    let mut patch = Patch::new();
    let mut entry = EnrichEntry {
        slug: record.slug.clone(),
        places: StepStatus::Skipped,
        ai: StepStatus::Skipped,
        embedding: StepStatus::Skipped,
        fields: Vec::new(),
    };

    if let Some(places) = enrichers.places {
        entry.places = match places_patch(places, record).await {
            Ok(Some(found)) => {
                patch.extend(found);
                StepStatus::Ok
            }
            Ok(None) => StepStatus::NotFound,
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "places lookup failed");
                StepStatus::Failed
            }
        };
    }

    let has_text = record.has_value(column::CONTENT) || record.has_value(column::DESCRIPTION);
    if let (Some(tagger), true) = (enrichers.tagger, has_text) {
        entry.ai = match tagger.generate(record).await {
            Ok(fields) if !fields.is_empty() => {
                patch.extend(fields.to_patch(Utc::now()));
                StepStatus::Ok
            }
            Ok(_) => StepStatus::NotFound,
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "AI tagging failed");
                StepStatus::Failed
            }
        };
    }

    entry.fields = patch.iter().map(|(k, _)| k.clone()).collect();
    (patch, entry)
}

/// Enrich one batch of records that no earlier run has processed. Every
/// processed record is stamped with `last_enriched_at`, even when no source
/// found anything, so the next run moves on to fresh records.
pub async fn enrich(store: &dyn RecordStore, enrichers: Enrichers<'_>, batch_size: usize) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let query = Query::new()
        .filter(Filter::is_null(column::LAST_ENRICHED_AT))
        .order_by(column::ID)
        .limit(batch_size);
    let records = fetch_records(store, &query)
        .await
        .context("fetching records to enrich")?;
    info!(batch = records.len(), "enriching records");

    let total = records.len();
    for (i, record) in records.into_iter().enumerate() {
        let span = info_span!("enrich", slug = %record.slug, progress = %format!("{}/{total}", i + 1));
        let (mut patch, mut entry) = enrich_record(enrichers, &record)
            .instrument(span.clone())
            .await;

        let mut enriched = record.clone();
        let found_fields = !patch.is_empty();
        patch.set(column::LAST_ENRICHED_AT, Utc::now().to_rfc3339());
        match store
            .update(
                table::DESTINATIONS,
                &[Filter::eq(column::SLUG, record.slug.as_str())],
                patch.as_row(),
            )
            .await
        {
            Ok(0) => {
                warn!(slug = %record.slug, "record vanished before update");
                report.tally("update_failed");
            }
            Ok(_) => {
                enriched.apply_patch(&patch);
                report.tally(if found_fields { "updated" } else { "unchanged" });
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "update failed");
                report.tally("update_failed");
            }
        }

        if let Some(embedder) = enrichers.embedder {
            let outcome = embed_record(store, embedder, &enriched)
                .instrument(span.clone())
                .await;
            entry.embedding = match outcome {
                Ok(EmbedOutcome::Stored) => StepStatus::Ok,
                Ok(EmbedOutcome::EmptyText) => StepStatus::NotFound,
                Ok(EmbedOutcome::SearchTextOnly) => StepStatus::Failed,
                Err(e) => {
                    warn!(slug = %record.slug, error = %e, "embedding failed");
                    StepStatus::Failed
                }
            };
        }

        for (step, status) in [("places", entry.places), ("ai", entry.ai), ("embedding", entry.embedding)] {
            if let Some(key) = status_key(step, status) {
                report.tally(&key);
            }
        }
        report.push_entry(&entry);
    }
    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, StubEmbedder, StubPlaces, StubTagger};
    use serde_json::json;
    use vdir_storage::MemoryStore;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "the-mark", "name": "The Mark", "city": "new-york", "description": "Hotel on Madison."})),
                    row(json!({"slug": "nowhere", "name": "Nowhere Bar", "city": "paris"})),
                    row(json!({"slug": "done", "name": "Done", "city": "paris", "google_place_id": "ChIJdone", "last_enriched_at": "2026-01-05T10:00:00+00:00"})),
                ],
            )
            .await;
        store
    }

    #[tokio::test]
    async fn enriches_pending_records_from_every_source() {
        let store = seeded().await;
        let places = StubPlaces::knowing(&["The Mark new-york"]);
        let tagger = StubTagger::failing_for(&[]);
        let embedder = StubEmbedder::new(3);
        let enrichers = Enrichers {
            places: Some(&places),
            tagger: Some(&tagger),
            embedder: Some(&embedder),
        };

        let report = enrich(&store, enrichers, 20).await.expect("enrich");
        assert_eq!(report.count("places_ok"), 1);
        assert_eq!(report.count("places_not_found"), 1);
        assert_eq!(report.count("ai_ok"), 1);
        assert_eq!(report.count("embedding_ok"), 2);
        assert_eq!(report.count("updated"), 1);
        assert_eq!(report.count("unchanged"), 1);

        let rows = store.rows("destinations").await;
        assert_eq!(rows[0]["google_place_id"], json!("place:The Mark new-york"));
        assert_eq!(rows[0]["price_level"], json!(3));
        assert_eq!(rows[0]["vibe_tags"], json!(["calm"]));
        assert!(rows[0]["embedding"].is_string());
        assert!(rows[1].get("google_place_id").is_none());
        assert!(rows[1]["last_enriched_at"].is_string());
        assert!(rows[2].get("embedding").is_none());
        assert_eq!(rows[2]["last_enriched_at"], json!("2026-01-05T10:00:00+00:00"));
    }

    #[tokio::test]
    async fn failing_sources_degrade_without_aborting_the_batch() {
        let store = seeded().await;
        let places = StubPlaces::broken();
        let tagger = StubTagger::failing_for(&["the-mark"]);
        let enrichers = Enrichers {
            places: Some(&places),
            tagger: Some(&tagger),
            embedder: None,
        };

        let report = enrich(&store, enrichers, 20).await.expect("enrich");
        assert_eq!(report.count("places_failed"), 2);
        assert_eq!(report.count("ai_failed"), 1);
        assert_eq!(report.count("unchanged"), 2);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(store.rows("destinations").await[0].get("google_place_id"), None);
    }

    #[tokio::test]
    async fn batch_size_bounds_the_run() {
        let store = seeded().await;
        let report = enrich(&store, Enrichers::default(), 1).await.expect("enrich");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0]["slug"], json!("the-mark"));
    }

    #[tokio::test]
    async fn rerun_skips_processed_records_and_advances_batch() {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "ghost", "name": "Ghost Bar", "city": "paris"})),
                    row(json!({"slug": "real", "name": "Real Place", "city": "paris"})),
                ],
            )
            .await;
        let places = StubPlaces::knowing(&["Real Place paris"]);
        let enrichers = Enrichers {
            places: Some(&places),
            ..Default::default()
        };

        let first = enrich(&store, enrichers, 1).await.expect("first");
        assert_eq!(first.entries[0]["slug"], json!("ghost"));
        assert_eq!(first.count("places_not_found"), 1);
        assert_eq!(first.count("unchanged"), 1);

        let second = enrich(&store, enrichers, 1).await.expect("second");
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0]["slug"], json!("real"));
        assert_eq!(second.count("updated"), 1);

        let rows = store.rows("destinations").await;
        assert!(rows[0].get("google_place_id").is_none());
        assert_eq!(rows[1]["google_place_id"], json!("place:Real Place paris"));

        let third = enrich(&store, enrichers, 1).await.expect("third");
        assert!(third.entries.is_empty());
    }
}
