use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::{info, warn};
use vdir_adapters::{build_search_text, vector_literal, Embedder};
use vdir_core::{column, table, Record, Row};
use vdir_storage::{fetch_records, Filter, Query, RecordStore};

use crate::report::JobReport;

pub const JOB: &str = "generate-embeddings";
pub const EMBEDDING_FUNCTION: &str = "update_destination_embedding";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedOutcome {
    Stored,
    /// Nothing to embed: every searchable column is empty.
    EmptyText,
    /// The vector write failed; only `search_text` was saved.
    SearchTextOnly,
}

/// Embed one record's search text and store vector plus text through the
/// server-side function. Falls back to saving `search_text` alone when the
/// function call fails.
pub async fn embed_record(
    store: &dyn RecordStore,
    embedder: &dyn Embedder,
    record: &Record,
) -> Result<EmbedOutcome> {
    let search_text = build_search_text(record);
    if search_text.is_empty() {
        return Ok(EmbedOutcome::EmptyText);
    }

    let vector = embedder
        .embed(&search_text)
        .await
        .with_context(|| format!("embedding {}", record.slug))?;
    if vector.len() != embedder.dimension() {
        return Err(anyhow!(
            "embedding for {} has {} dimensions, expected {}",
            record.slug,
            vector.len(),
            embedder.dimension()
        ));
    }

    let args = json!({
        "p_slug": record.slug,
        "p_embedding": vector_literal(&vector),
        "p_search_text": search_text,
    });
    match store.rpc(EMBEDDING_FUNCTION, &args).await {
        Ok(_) => Ok(EmbedOutcome::Stored),
        Err(e) => {
            warn!(slug = %record.slug, error = %e, "vector write failed, saving search text only");
            let mut patch = Row::new();
            patch.insert(column::SEARCH_TEXT.to_string(), search_text.into());
            store
                .update(
                    table::DESTINATIONS,
                    &[Filter::eq(column::SLUG, record.slug.as_str())],
                    &patch,
                )
                .await
                .with_context(|| format!("saving search text for {}", record.slug))?;
            Ok(EmbedOutcome::SearchTextOnly)
        }
    }
}

/// Embed every record that has no vector yet.
pub async fn generate_embeddings(store: &dyn RecordStore, embedder: &dyn Embedder) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let query = Query::new()
        .filter(Filter::is_null(column::EMBEDDING))
        .order_by(column::ID);
    let records = fetch_records(store, &query)
        .await
        .context("fetching records without embeddings")?;
    info!(pending = records.len(), dimension = embedder.dimension(), "generating embeddings");

    let total = records.len();
    for (i, record) in records.iter().enumerate() {
        info!(progress = %format!("{}/{total}", i + 1), name = %record.name, "embedding");
        match embed_record(store, embedder, record).await {
            Ok(EmbedOutcome::Stored) => report.tally("embedded"),
            Ok(EmbedOutcome::EmptyText) => {
                warn!(slug = %record.slug, "no searchable text");
                report.tally("failed");
                report.tally("empty_text");
            }
            Ok(EmbedOutcome::SearchTextOnly) => {
                report.tally("failed");
                report.tally("search_text_only");
                report.push_entry(json!({"slug": record.slug, "status": "search_text_only"}));
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "embedding failed");
                report.tally("failed");
                report.push_entry(json!({"slug": record.slug, "status": "failed", "error": format!("{e:#}")}));
            }
        }
    }
    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, StubEmbedder};
    use vdir_storage::MemoryStore;

    async fn seeded(store: MemoryStore) -> MemoryStore {
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "aman", "name": "Aman Tokyo", "city": "tokyo"})),
                    row(json!({"slug": "done", "name": "Done", "embedding": "[1,2,3]"})),
                    row(json!({"slug": "blank", "name": ""})),
                ],
            )
            .await;
        store
    }

    #[tokio::test]
    async fn stores_vector_and_search_text_for_pending_records() {
        let store = seeded(MemoryStore::directory()).await;
        let embedder = StubEmbedder::new(3);
        let report = generate_embeddings(&store, &embedder).await.expect("job");

        assert_eq!(report.count("embedded"), 1);
        assert_eq!(report.count("empty_text"), 1);
        assert_eq!(report.count("failed"), 1);
        assert_eq!(embedder.calls(), vec!["Aman Tokyo tokyo".to_string()]);
        let rows = store.rows("destinations").await;
        assert_eq!(rows[0]["embedding"], json!("[0,0.5,1]"));
        assert_eq!(rows[0]["search_text"], json!("Aman Tokyo tokyo"));
        assert_eq!(rows[1]["embedding"], json!("[1,2,3]"));
    }

    #[tokio::test]
    async fn missing_function_falls_back_to_search_text() {
        let store = seeded(MemoryStore::directory().without_rpc()).await;
        let report = generate_embeddings(&store, &StubEmbedder::new(3)).await.expect("job");
        assert_eq!(report.count("search_text_only"), 1);
        assert_eq!(report.count("embedded"), 0);
        let rows = store.rows("destinations").await;
        assert_eq!(rows[0]["search_text"], json!("Aman Tokyo tokyo"));
        assert!(rows[0].get("embedding").is_none());
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let store = seeded(MemoryStore::directory()).await;
        let embedder = StubEmbedder::new(3).reporting_dimension(768);
        let report = generate_embeddings(&store, &embedder).await.expect("job");
        assert_eq!(report.count("embedded"), 0);
        assert_eq!(report.count("failed"), 2);
        assert!(store.rows("destinations").await[0].get("embedding").is_none());
    }
}
