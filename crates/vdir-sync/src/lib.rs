//! Directory maintenance jobs: lookup population, enrichment, CSV merge,
//! duplicate cleanup and verification. Every job takes its collaborators
//! as trait objects and returns a [`JobReport`].

pub mod ai_fields;
pub mod config;
pub mod csv_import;
pub mod duplicates;
pub mod embeddings;
pub mod enrich;
pub mod matcher;
pub mod merge;
pub mod merge_cities;
pub mod populate;
pub mod refresh_places;
pub mod report;
pub mod verify;

pub use ai_fields::generate_ai_fields;
pub use config::{CityAlias, MergeConfig, SyncConfig};
pub use csv_import::{import_csv, merge_csv};
pub use duplicates::find_duplicates;
pub use embeddings::generate_embeddings;
pub use enrich::{enrich, Enrichers};
pub use matcher::{best_match, MatchClass, MatchConfig, MatchOutcome};
pub use merge::{merge_duplicates, merge_field};
pub use merge_cities::merge_cities;
pub use populate::populate_lookups;
pub use refresh_places::refresh_places;
pub use report::JobReport;
pub use verify::{verify, VerifyReport, VERIFY_COLUMNS};

pub const CRATE_NAME: &str = "vdir-sync";
