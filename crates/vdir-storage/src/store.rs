use async_trait::async_trait;
use serde_json::Value;
use vdir_core::{column, table, Record, Row};

use crate::{Filter, Query, StoreError};

/// Table-oriented store: select/insert/update/delete with filter
/// predicates, exact counts, and server-side functions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: &Row) -> Result<Row, StoreError>;

    /// Apply `patch` to every matching row; returns the number of rows changed.
    async fn update(&self, table: &str, filters: &[Filter], patch: &Row)
        -> Result<usize, StoreError>;

    /// Delete every matching row; returns the number of rows removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;

    /// Call a server-side function, used where the column type needs
    /// coercion the REST layer cannot do (vector columns).
    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, StoreError>;
}

/// Select destination rows and decode them as records.
pub async fn fetch_records(
    store: &dyn RecordStore,
    query: &Query,
) -> Result<Vec<Record>, StoreError> {
    store
        .select(table::DESTINATIONS, query)
        .await?
        .into_iter()
        .map(|row| Record::from_row(row).map_err(|e| StoreError::Decode(e.to_string())))
        .collect()
}

pub async fn find_by_slug(store: &dyn RecordStore, slug: &str) -> Result<Option<Record>, StoreError> {
    let query = Query::new().filter(Filter::eq(column::SLUG, slug)).limit(1);
    Ok(fetch_records(store, &query).await?.into_iter().next())
}
