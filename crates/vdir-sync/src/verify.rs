use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use vdir_core::{column, table, title_from_slug, Category, City, Record};
use vdir_storage::{fetch_records, Filter, Query, RecordStore, StoreError};

const SAMPLE_SIZE: usize = 5;
const CITIES_SHOWN: usize = 10;

/// Columns whose fill rate `verify` reports.
pub const VERIFY_COLUMNS: &[&str] = &[
    column::ARCHITECT,
    column::BRAND,
    column::MICHELIN_STARS,
    column::YEAR_OPENED,
    column::NEIGHBORHOOD,
    column::GALLERY,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub column: String,
    pub filled: usize,
    pub total: usize,
}

impl Coverage {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.filled as f64 / self.total as f64 * 100.0
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:30} - {:4}/{} ({:5.1}%)",
            self.column,
            self.filled,
            self.total,
            self.percent()
        )
    }
}

/// Non-null counts for each column over the records table.
pub async fn coverage(store: &dyn RecordStore, columns: &[&str]) -> Result<Vec<Coverage>, StoreError> {
    let total = store.count(table::DESTINATIONS, &[]).await?;
    let mut rows = Vec::with_capacity(columns.len());
    for col in columns {
        let filled = store
            .count(table::DESTINATIONS, &[Filter::not_null(col)])
            .await?;
        rows.push(Coverage {
            column: col.to_string(),
            filled,
            total,
        });
    }
    Ok(rows)
}

/// Row count of a table, or why it could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCheck {
    pub table: String,
    pub rows: Result<usize, String>,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub samples: Result<Vec<Record>, String>,
    pub cities: Result<Vec<City>, String>,
    pub categories: Result<Vec<Category>, String>,
    pub tables: Vec<TableCheck>,
    pub coverage: Result<Vec<Coverage>, String>,
}

async fn select_as<T: DeserializeOwned>(store: &dyn RecordStore, table: &str) -> Result<Vec<T>, String> {
    let rows = store
        .select(table, &Query::new())
        .await
        .map_err(|e| e.to_string())?;
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(|e| e.to_string()))
        .collect()
}

/// Read-only health check of the directory tables. Every section is
/// attempted; failures are captured in the report, never raised.
pub async fn verify(store: &dyn RecordStore, columns: &[&str]) -> VerifyReport {
    let sample_query = Query::new()
        .select("name,architect,brand,year_opened,michelin_stars,neighborhood,gallery")
        .filter(Filter::not_null(column::ARCHITECT))
        .limit(SAMPLE_SIZE);
    let samples = fetch_records(store, &sample_query)
        .await
        .map_err(|e| e.to_string());

    let cities = select_as::<City>(store, table::CITIES).await;
    let categories = select_as::<Category>(store, table::CATEGORIES).await;

    let mut tables = Vec::new();
    for name in [table::PROFILES, table::LIST_DESTINATIONS] {
        let rows = store.count(name, &[]).await.map_err(|e| e.to_string());
        if let Err(e) = &rows {
            warn!(table = name, error = %e, "table check failed");
        }
        tables.push(TableCheck {
            table: name.to_string(),
            rows,
        });
    }

    let coverage = coverage(store, columns).await.map_err(|e| e.to_string());
    info!("verification finished");
    VerifyReport {
        samples,
        cities,
        categories,
        tables,
        coverage,
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== records with architect data")?;
        match &self.samples {
            Ok(samples) if samples.is_empty() => writeln!(f, "  none found")?,
            Ok(samples) => {
                writeln!(f, "  found {} (sample)", samples.len())?;
                for record in samples {
                    writeln!(f, "  - {}", record.name)?;
                    for col in [column::ARCHITECT, column::BRAND, column::NEIGHBORHOOD] {
                        if let Some(text) = record.text(col) {
                            writeln!(f, "      {}: {text}", title_from_slug(col))?;
                        }
                    }
                    if let Value::Number(year) = record.value(column::YEAR_OPENED) {
                        writeln!(f, "      Opened: {year}")?;
                    }
                    if let Some(stars) = record.value(column::MICHELIN_STARS).as_u64().filter(|s| *s > 0) {
                        writeln!(f, "      Michelin: {}", "*".repeat(stars as usize))?;
                    }
                    let gallery = record.list(column::GALLERY);
                    if !gallery.is_empty() {
                        writeln!(f, "      Gallery: {} images", gallery.len())?;
                    }
                }
            }
            Err(e) => writeln!(f, "  error: {e}")?,
        }

        writeln!(f, "== cities")?;
        match &self.cities {
            Ok(cities) => {
                writeln!(f, "  found {}", cities.len())?;
                for city in cities.iter().take(CITIES_SHOWN) {
                    writeln!(f, "  - {}, {} (slug: {})", city.name, city.country, city.slug)?;
                }
                if cities.len() > CITIES_SHOWN {
                    writeln!(f, "  ... and {} more", cities.len() - CITIES_SHOWN)?;
                }
            }
            Err(e) => writeln!(f, "  error: {e}")?,
        }

        writeln!(f, "== categories")?;
        match &self.categories {
            Ok(categories) => {
                writeln!(f, "  found {}", categories.len())?;
                for category in categories {
                    writeln!(f, "  - {} (slug: {})", category.name, category.slug)?;
                }
            }
            Err(e) => writeln!(f, "  error: {e}")?,
        }

        for check in &self.tables {
            writeln!(f, "== {}", check.table)?;
            match &check.rows {
                Ok(rows) => writeln!(f, "  table exists ({rows} rows)")?,
                Err(e) => writeln!(f, "  error: {e}")?,
            }
        }

        writeln!(f, "== coverage")?;
        match &self.coverage {
            Ok(rows) => {
                if let Some(first) = rows.first() {
                    writeln!(f, "  total records: {}", first.total)?;
                }
                for row in rows {
                    writeln!(f, "  {row}")?;
                }
            }
            Err(e) => writeln!(f, "  error: {e}")?,
        }
        Ok(())
    }
}
