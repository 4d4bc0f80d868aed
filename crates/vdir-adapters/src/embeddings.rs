use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use vdir_core::{column, Record};
use vdir_storage::ApiHttp;

use crate::{AdapterError, Embedder};

const API: &str = "embeddings";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "text-embedding-004";

/// Output size of the default embedding model.
pub const EMBEDDING_DIMENSION: usize = 768;

const SEARCH_TEXT_SCALARS: &[&str] = &[
    column::NAME,
    column::DESCRIPTION,
    column::CONTENT,
    column::CITY,
    column::CATEGORY,
    column::COUNTRY,
];
const SEARCH_TEXT_LISTS: &[&str] = &[column::VIBE_TAGS, column::KEYWORDS, column::SEARCH_KEYWORDS];
const SEARCH_TEXT_SUMMARIES: &[&str] = &[column::SHORT_SUMMARY, column::EDITORIAL_SUMMARY];

/// Space-joined text a record is embedded from.
pub fn build_search_text(record: &Record) -> String {
    let mut parts = Vec::new();
    parts.extend(SEARCH_TEXT_SCALARS.iter().filter_map(|c| record.text(c)));
    for list in SEARCH_TEXT_LISTS {
        parts.extend(record.list(list).into_iter().filter(|s| !s.trim().is_empty()));
    }
    parts.extend(SEARCH_TEXT_SUMMARIES.iter().filter_map(|c| record.text(c)));
    parts.join(" ")
}

/// Text form of a vector accepted by the vector column: `[0.1,0.2,...]`.
pub fn vector_literal(values: &[f32]) -> String {
    let joined = values
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

pub fn parse_embedding(body: &Value, dimension: usize) -> Result<Vec<f32>, AdapterError> {
    let values = body["embedding"]["values"]
        .as_array()
        .ok_or_else(|| AdapterError::Decode {
            api: API,
            message: "missing embedding.values".to_string(),
        })?
        .iter()
        .map(|v| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| AdapterError::Decode {
                api: API,
                message: format!("non-numeric embedding value {v}"),
            })
        })
        .collect::<Result<Vec<f32>, _>>()?;
    if values.len() != dimension {
        return Err(AdapterError::Decode {
            api: API,
            message: format!("expected {dimension} dimensions, got {}", values.len()),
        });
    }
    Ok(values)
}

pub struct GeminiEmbedder {
    http: ApiHttp,
    api_key: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbedder {
    pub fn new(http: ApiHttp, api_key: String) -> Self {
        Self {
            http,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            dimension: EMBEDDING_DIMENSION,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let url = format!("{DEFAULT_BASE_URL}/models/{}:embedContent", self.model);
        debug!(chars = text.len(), model = %self.model, "requesting embedding");
        let request = json!({
            "model": format!("models/{}", self.model),
            "content": {"parts": [{"text": text}]},
        });
        let body = self
            .http
            .post_json(&url, &[("key", self.api_key.as_str())], &request)
            .await?;
        parse_embedding(&body, self.dimension)
    }
}
