//! Adapters from external sources (CSV exports, places API, generative and
//! embedding models) into record patches.

use async_trait::async_trait;
use thiserror::Error;
use vdir_core::Record;
use vdir_storage::FetchError;

mod csv_source;
mod embeddings;
mod generative;
mod places;

pub use csv_source::{parse_space_rows, read_space_rows, SpaceRow};
pub use embeddings::{build_search_text, parse_embedding, vector_literal, GeminiEmbedder, EMBEDDING_DIMENSION};
pub use generative::{build_prompt, parse_ai_fields, AiFields, GeminiTagger};
pub use places::{check_status, PlaceDetails, PlacesClient};

pub const CRATE_NAME: &str = "vdir-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("{api} answered {status}: {message}")]
    Status {
        api: &'static str,
        status: String,
        message: String,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding {api} response: {message}")]
    Decode { api: &'static str, message: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Text search + detail lookup against a places provider.
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn find_place_id(&self, text: &str) -> Result<Option<String>, AdapterError>;

    async fn place_details(&self, place_id: &str) -> Result<Option<PlaceDetails>, AdapterError>;
}

/// Generative model producing structured tags and a summary for a record.
#[async_trait]
pub trait TagGenerator: Send + Sync {
    async fn generate(&self, record: &Record) -> Result<AiFields, AdapterError>;
}

/// Text embedding model with a fixed output dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;
}

pub(crate) fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
