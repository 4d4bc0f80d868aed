use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Store failures, classified once at the client boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique violation: {message}")]
    UniqueViolation { message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out: {0}")]
    NetworkTimeout(String),
    #[error("store rejected request (http {status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decoding store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

const PG_UNIQUE_VIOLATION: &str = "23505";
const PGRST_NO_ROWS: &str = "PGRST116";
const PGRST_NO_FUNCTION: &str = "PGRST202";
const PGRST_NO_RELATION: &str = "42P01";

/// Map a non-success store response onto a typed error from its status and
/// the PostgREST error body (`code`, `message`, `details`).
pub fn classify_response(status: StatusCode, body: &str) -> StoreError {
    let parsed: PostgrestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (&parsed.message, &parsed.details) {
        (Some(m), Some(d)) => format!("{m} ({d})"),
        (Some(m), None) => m.clone(),
        (None, _) if !body.trim().is_empty() => body.trim().to_string(),
        _ => status.to_string(),
    };
    let code = parsed.code;

    match code.as_deref() {
        Some(PG_UNIQUE_VIOLATION) => return StoreError::UniqueViolation { message },
        Some(PGRST_NO_ROWS) | Some(PGRST_NO_FUNCTION) | Some(PGRST_NO_RELATION) => {
            return StoreError::NotFound(message)
        }
        _ => {}
    }

    match status {
        StatusCode::CONFLICT => StoreError::UniqueViolation { message },
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            StoreError::NetworkTimeout(message)
        }
        _ => StoreError::Rejected {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

pub fn classify_reqwest_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::NetworkTimeout(err.to_string())
    } else if err.is_decode() {
        StoreError::Decode(err.to_string())
    } else {
        StoreError::Transport(err.to_string())
    }
}
