//! Table-store clients, outbound HTTP plumbing, rate limiting and run reports.

mod error;
mod http;
mod limiter;
mod memory;
mod query;
mod reports;
mod rest;
mod store;

pub use error::{classify_reqwest_error, classify_response, StoreError};
pub use http::{ApiHttp, FetchError, HttpClientConfig};
pub use limiter::SlidingWindowLimiter;
pub use memory::MemoryStore;
pub use query::{Filter, Query};
pub use reports::ReportStore;
pub use rest::{parse_content_range, RestStore, StoreConfig};
pub use store::{fetch_records, find_by_slug, RecordStore};

pub const CRATE_NAME: &str = "vdir-storage";
