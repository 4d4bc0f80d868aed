use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use vdir_core::{slugify, table, title_from_slug, Category, City, Row};
use vdir_storage::{fetch_records, Query, RecordStore};

use crate::report::JobReport;

pub const JOB: &str = "populate-lookups";

/// Distinct `(city, country)` pairs in first-seen order. Records missing
/// either value are skipped.
pub fn collect_cities<'a>(pairs: impl IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>) -> Vec<City> {
    let mut cities: Vec<City> = Vec::new();
    for (city, country) in pairs {
        let (Some(city), Some(country)) = (city, country) else {
            continue;
        };
        if city.trim().is_empty() || country.trim().is_empty() {
            continue;
        }
        if cities.iter().any(|c| c.slug == city && c.country == country) {
            continue;
        }
        cities.push(City {
            name: title_from_slug(city),
            slug: city.to_string(),
            country: country.to_string(),
        });
    }
    cities
}

/// Distinct categories in first-seen order.
pub fn collect_categories<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for name in values.into_iter().flatten() {
        if name.trim().is_empty() || categories.iter().any(|c| c.name == name) {
            continue;
        }
        categories.push(Category {
            name: name.to_string(),
            slug: slugify(name),
        });
    }
    categories
}

/// Insert each lookup row; a unique violation means it already exists.
async fn insert_lookups<T: Serialize>(
    store: &dyn RecordStore,
    report: &mut JobReport,
    table: &str,
    rows: &[T],
    label: impl Fn(&T) -> String,
) -> Result<()> {
    for item in rows {
        let row: Row = match serde_json::to_value(item).context("serializing lookup row")? {
            serde_json::Value::Object(map) => map,
            _ => continue,
        };
        match store.insert(table, &row).await {
            Ok(_) => {
                info!(table, name = %label(item), "created");
                report.tally(&format!("{table}_created"));
            }
            Err(e) if e.is_unique_violation() => {
                info!(table, name = %label(item), "skipped (exists)");
                report.tally(&format!("{table}_skipped"));
            }
            Err(e) => {
                warn!(table, name = %label(item), error = %e, "insert failed");
                report.tally(&format!("{table}_failed"));
            }
        }
    }
    Ok(())
}

/// Derive the cities and categories lookup tables from the records.
/// Safe to re-run: existing slugs are skipped.
pub async fn populate_lookups(store: &dyn RecordStore) -> Result<JobReport> {
    let mut report = JobReport::start(JOB);
    let query = Query::new().select("city,country,category");
    let records = fetch_records(store, &query)
        .await
        .context("fetching records for lookup tables")?;
    info!(records = records.len(), "fetched records");

    let cities = collect_cities(
        records
            .iter()
            .map(|r| (r.city.as_deref(), r.country.as_deref())),
    );
    info!(unique = cities.len(), "processing cities");
    insert_lookups(store, &mut report, table::CITIES, &cities, |c| {
        format!("{}, {}", c.name, c.country)
    })
    .await?;

    let categories = collect_categories(records.iter().map(|r| r.category.as_deref()));
    info!(unique = categories.len(), "processing categories");
    insert_lookups(store, &mut report, table::CATEGORIES, &categories, |c| c.name.clone()).await?;

    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use serde_json::json;
    use vdir_storage::MemoryStore;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::directory();
        store
            .seed(
                "destinations",
                vec![
                    row(json!({"slug": "a", "city": "new-york", "country": "USA", "category": "Hotel"})),
                    row(json!({"slug": "b", "city": "new-york", "country": "USA", "category": "Bars & Pubs"})),
                    row(json!({"slug": "c", "city": "paris", "country": null, "category": "Hotel"})),
                    row(json!({"slug": "d", "city": "kyoto", "country": "Japan"})),
                ],
            )
            .await;
        store
    }

    #[test]
    fn cities_are_deduplicated_in_first_seen_order() {
        let cities = collect_cities([
            (Some("new-york"), Some("USA")),
            (Some("ho-chi-minh-city"), Some("Vietnam")),
            (Some("new-york"), Some("USA")),
            (None, Some("USA")),
            (Some("paris"), None),
        ]);
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].name, "New York");
        assert_eq!(cities[1].name, "Ho Chi Minh City");
        assert_eq!(cities[1].slug, "ho-chi-minh-city");
    }

    #[test]
    fn categories_get_slugified() {
        let categories = collect_categories([Some("Bars & Pubs"), None, Some("Bars & Pubs"), Some("")]);
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].slug, "bars-and-pubs");
    }

    #[tokio::test]
    async fn populate_creates_lookup_rows() {
        let store = seeded().await;
        let report = populate_lookups(&store).await.expect("populate");
        assert_eq!(report.count("cities_created"), 2);
        assert_eq!(report.count("categories_created"), 2);
        let cities = store.rows("cities").await;
        assert_eq!(cities[0], row(json!({"id": cities[0]["id"], "name": "New York", "slug": "new-york", "country": "USA"})));
    }

    #[tokio::test]
    async fn rerunning_populate_is_idempotent() {
        let store = seeded().await;
        populate_lookups(&store).await.expect("first run");
        let cities_once = store.rows("cities").await;
        let categories_once = store.rows("categories").await;

        let second = populate_lookups(&store).await.expect("second run");
        assert_eq!(second.count("cities_created"), 0);
        assert_eq!(second.count("cities_skipped"), 2);
        assert_eq!(second.count("categories_skipped"), 2);
        assert_eq!(second.count("cities_failed"), 0);
        assert_eq!(store.rows("cities").await, cities_once);
        assert_eq!(store.rows("categories").await, categories_once);
    }
}
