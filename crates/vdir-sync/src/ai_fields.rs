use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use vdir_adapters::TagGenerator;
use vdir_core::{column, table, Record};
use vdir_storage::{fetch_records, Filter, Query, RecordStore};

use crate::report::JobReport;

pub const JOB: &str = "generate-ai-fields";

const AI_COLUMNS: &[&str] = &[column::VIBE_TAGS, column::KEYWORDS, column::SHORT_SUMMARY];

/// A record needs AI fields when none of the generated columns hold a value.
pub fn needs_ai_fields(record: &Record) -> bool {
    AI_COLUMNS.iter().all(|c| !record.has_value(c))
}

/// Generate tags, keywords and a summary for every record lacking them.
pub async fn generate_ai_fields(store: &dyn RecordStore, tagger: &dyn TagGenerator) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let records = fetch_records(store, &Query::new().order_by(column::ID))
        .await
        .context("fetching records for AI fields")?;
    let pending = records
        .into_iter()
        .filter(|r| {
            let pending = needs_ai_fields(r);
            if !pending {
                report.tally("already_present");
            }
            pending
        })
        .collect::<Vec<_>>();
    info!(
        pending = pending.len(),
        present = report.count("already_present"),
        "generating AI fields"
    );

    let total = pending.len();
    for (i, record) in pending.iter().enumerate() {
        info!(progress = %format!("{}/{total}", i + 1), name = %record.name, slug = %record.slug, "processing");
        let fields = match tagger.generate(record).await {
            Ok(fields) if !fields.is_empty() => fields,
            Ok(_) => {
                warn!(slug = %record.slug, "model returned no fields");
                report.tally("failed");
                continue;
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "generation failed");
                report.tally("failed");
                report.push_entry(json!({"slug": record.slug, "error": e.to_string()}));
                continue;
            }
        };

        let patch = fields.to_patch(Utc::now());
        match store
            .update(
                table::DESTINATIONS,
                &[Filter::eq(column::SLUG, record.slug.as_str())],
                patch.as_row(),
            )
            .await
        {
            Ok(_) => {
                info!(
                    slug = %record.slug,
                    vibe_tags = fields.vibe_tags.len(),
                    keywords = fields.keywords.len(),
                    "generated"
                );
                report.tally("generated");
            }
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "update failed");
                report.tally("failed");
            }
        }
    }
    Ok(report.finish())
}
