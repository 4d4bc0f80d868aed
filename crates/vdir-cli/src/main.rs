use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vdir_adapters::{read_space_rows, Embedder, GeminiEmbedder, GeminiTagger, PlaceLookup, PlacesClient, TagGenerator};
use vdir_storage::{ApiHttp, HttpClientConfig, ReportStore, RestStore, SlidingWindowLimiter};
use vdir_sync::{Enrichers, JobReport, MergeConfig, SyncConfig, VERIFY_COLUMNS};

const USER_AGENT: &str = concat!("vdir/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Parser)]
#[command(name = "vdir")]
#[command(about = "Venue directory maintenance jobs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create city and category rows from the records table.
    PopulateLookups,
    /// Places, AI and embedding enrichment for one batch of records.
    Enrich,
    GenerateAiFields,
    GenerateEmbeddings,
    /// Re-fetch place details for records that already have a place id.
    RefreshPlaces,
    /// Slug-keyed partial update from the CSV export.
    ImportCsv,
    /// Fuzzy merge of the CSV export into the directory.
    MergeCsv,
    /// Fold the configured duplicate pairs.
    MergeDuplicates,
    /// Collapse records sharing a name and city.
    FindDuplicates,
    MergeCities,
    /// Read-only health check.
    Verify,
}

fn api_http(config: &SyncConfig, per_minute: usize) -> Result<ApiHttp> {
    ApiHttp::new(
        HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(USER_AGENT.to_string()),
        },
        Some(SlidingWindowLimiter::per_minute(per_minute)),
    )
}

fn places_client(config: &SyncConfig) -> Result<PlacesClient> {
    let key = config.require_places_key()?;
    Ok(PlacesClient::new(api_http(config, config.places_per_minute)?, key.to_string()))
}

fn tagger(config: &SyncConfig) -> Result<GeminiTagger> {
    let key = config.require_google_key()?;
    Ok(GeminiTagger::new(api_http(config, config.ai_per_minute)?, key.to_string()))
}

fn embedder(config: &SyncConfig) -> Result<GeminiEmbedder> {
    let key = config.require_google_key()?;
    Ok(GeminiEmbedder::new(api_http(config, config.embed_per_minute)?, key.to_string()))
}

async fn finish(report: JobReport, reports: &ReportStore) -> Result<()> {
    let path = report.save(reports).await?;
    println!("{}", report.summary_line());
    println!("report: {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;
    let store = RestStore::new(config.store_config())?;
    let reports = ReportStore::new(config.reports_dir.clone());

    let report = match cli.command.unwrap_or(Commands::Verify) {
        Commands::PopulateLookups => vdir_sync::populate_lookups(&store).await?,
        Commands::Enrich => {
            let places = config.places_api_key.is_some().then(|| places_client(&config)).transpose()?;
            let (ai, embed) = if config.google_api_key.is_some() {
                (Some(tagger(&config)?), Some(embedder(&config)?))
            } else {
                (None, None)
            };
            if places.is_none() && ai.is_none() {
                bail!("enrich needs GOOGLE_PLACES_API_KEY or GOOGLE_API_KEY");
            }
            let enrichers = Enrichers {
                places: places.as_ref().map(|p| p as &dyn PlaceLookup),
                tagger: ai.as_ref().map(|t| t as &dyn TagGenerator),
                embedder: embed.as_ref().map(|e| e as &dyn Embedder),
            };
            vdir_sync::enrich(&store, enrichers, config.enrich_batch_size).await?
        }
        Commands::GenerateAiFields => vdir_sync::generate_ai_fields(&store, &tagger(&config)?).await?,
        Commands::GenerateEmbeddings => vdir_sync::generate_embeddings(&store, &embedder(&config)?).await?,
        Commands::RefreshPlaces => vdir_sync::refresh_places(&store, &places_client(&config)?).await?,
        Commands::ImportCsv => {
            let path = config.require_csv_path()?;
            let rows = read_space_rows(path).with_context(|| format!("reading {}", path.display()))?;
            vdir_sync::import_csv(&store, &rows).await?
        }
        Commands::MergeCsv => {
            let path = config.require_csv_path()?;
            let rows = read_space_rows(path).with_context(|| format!("reading {}", path.display()))?;
            vdir_sync::merge_csv(&store, &rows, &config.matching).await?
        }
        Commands::MergeDuplicates => {
            let merge = MergeConfig::load(&config.merge_config_path).await?;
            vdir_sync::merge_duplicates(&store, &merge).await?
        }
        Commands::FindDuplicates => {
            let merge = MergeConfig::load(&config.merge_config_path).await?;
            vdir_sync::find_duplicates(&store, &merge.columns).await?
        }
        Commands::MergeCities => {
            let merge = MergeConfig::load(&config.merge_config_path).await?;
            vdir_sync::merge_cities(&store, &merge.city_aliases).await?
        }
        Commands::Verify => {
            let report = vdir_sync::verify(&store, VERIFY_COLUMNS).await;
            print!("{report}");
            info!("verify complete");
            return Ok(());
        }
    };

    finish(report, &reports).await
}
