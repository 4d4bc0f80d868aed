use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use vdir_core::{MergePair, DEFAULT_MERGE_COLUMNS};
use vdir_storage::StoreConfig;

use crate::matcher::MatchConfig;

/// Process configuration, read once from the environment in `main`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store_url: String,
    pub store_key: String,
    pub places_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub reports_dir: PathBuf,
    pub csv_path: Option<PathBuf>,
    pub merge_config_path: PathBuf,
    pub enrich_batch_size: usize,
    pub places_per_minute: usize,
    pub ai_per_minute: usize,
    pub embed_per_minute: usize,
    pub http_timeout_secs: u64,
    pub matching: MatchConfig,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| var(*k));

        let Some(store_url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) else {
            bail!("missing store URL: set SUPABASE_URL or NEXT_PUBLIC_SUPABASE_URL");
        };
        let Some(store_key) = first(&["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_KEY"]) else {
            bail!("missing store key: set SUPABASE_SERVICE_ROLE_KEY or SUPABASE_KEY");
        };

        let parsed = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let defaults = MatchConfig::default();
        let matching = MatchConfig {
            high: parse_number(&parsed("VDIR_MATCH_HIGH", &defaults.high.to_string()), "VDIR_MATCH_HIGH")?,
            review: parse_number(
                &parsed("VDIR_MATCH_REVIEW", &defaults.review.to_string()),
                "VDIR_MATCH_REVIEW",
            )?,
        };
        matching.validate()?;

        Ok(Self {
            store_url,
            store_key,
            places_api_key: var("GOOGLE_PLACES_API_KEY"),
            google_api_key: first(&["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
            reports_dir: PathBuf::from(parsed("VDIR_REPORTS_DIR", "./reports")),
            csv_path: var("VDIR_CSV_PATH").map(PathBuf::from),
            merge_config_path: PathBuf::from(parsed("VDIR_MERGE_CONFIG", "./merge.yaml")),
            enrich_batch_size: parse_number(&parsed("VDIR_ENRICH_BATCH_SIZE", "20"), "VDIR_ENRICH_BATCH_SIZE")?,
            places_per_minute: parse_number(&parsed("VDIR_PLACES_PER_MINUTE", "540"), "VDIR_PLACES_PER_MINUTE")?,
            ai_per_minute: parse_number(&parsed("VDIR_AI_PER_MINUTE", "15"), "VDIR_AI_PER_MINUTE")?,
            embed_per_minute: parse_number(&parsed("VDIR_EMBED_PER_MINUTE", "100"), "VDIR_EMBED_PER_MINUTE")?,
            http_timeout_secs: parse_number(&parsed("VDIR_HTTP_TIMEOUT_SECS", "30"), "VDIR_HTTP_TIMEOUT_SECS")?,
            matching,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            base_url: self.store_url.clone(),
            service_key: self.store_key.clone(),
            timeout: self.http_timeout(),
        }
    }

    pub fn require_places_key(&self) -> Result<&str> {
        self.places_api_key
            .as_deref()
            .context("missing places key: set GOOGLE_PLACES_API_KEY")
    }

    pub fn require_google_key(&self) -> Result<&str> {
        self.google_api_key
            .as_deref()
            .context("missing generative API key: set GOOGLE_API_KEY or GEMINI_API_KEY")
    }

    pub fn require_csv_path(&self) -> Result<&Path> {
        self.csv_path
            .as_deref()
            .context("missing CSV export: set VDIR_CSV_PATH")
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CityAlias {
    pub from: String,
    pub into: String,
}

/// Merge allow-list, mergeable columns and city aliases, loaded from YAML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub pairs: Vec<MergePair>,
    #[serde(default = "default_merge_columns")]
    pub columns: Vec<String>,
    #[serde(default)]
    pub city_aliases: Vec<CityAlias>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            columns: default_merge_columns(),
            city_aliases: Vec::new(),
        }
    }
}

fn default_merge_columns() -> Vec<String> {
    DEFAULT_MERGE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

impl MergeConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing merge configuration")?;
        for pair in &config.pairs {
            if pair.keep_slug == pair.delete_slug {
                bail!("merge pair {:?} keeps and deletes the same slug", pair.name);
            }
        }
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("loading {}", path.display()))
    }
}
