use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use vdir_core::{column, table, Row};

use crate::query::compare_values;
use crate::{Filter, Query, RecordStore, StoreError};

const EMBEDDING_FUNCTION: &str = "update_destination_embedding";

/// In-process store with per-table unique columns and auto-assigned ids.
/// Mirrors the REST store's error classification so job code behaves the
/// same against both.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<Row>>,
    unique: BTreeMap<String, Vec<String>>,
    next_id: i64,
    rpc_disabled: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the directory schema's unique keys (`slug` on records,
    /// cities and categories).
    pub fn directory() -> Self {
        Self::new()
            .with_unique(table::DESTINATIONS, column::SLUG)
            .with_unique(table::CITIES, column::SLUG)
            .with_unique(table::CATEGORIES, column::SLUG)
    }

    pub fn with_unique(mut self, table: &str, column: &str) -> Self {
        self.state
            .get_mut()
            .unique
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
        self
    }

    /// Make every `rpc` call fail as if the function were not deployed.
    pub fn without_rpc(mut self) -> Self {
        self.state.get_mut().rpc_disabled = true;
        self
    }

    /// Bulk-load rows without constraint checks; ids are assigned when absent.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.state.lock().await;
        for mut row in rows {
            state.assign_id(&mut row);
            state.tables.entry(table.to_string()).or_default().push(row);
        }
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }
}

impl MemoryState {
    fn assign_id(&mut self, row: &mut Row) {
        match row.get(column::ID).and_then(Value::as_i64) {
            Some(id) => self.next_id = self.next_id.max(id),
            None => {
                self.next_id += 1;
                row.insert(column::ID.to_string(), Value::from(self.next_id));
            }
        }
    }

    /// First unique column of `table` on which `candidate` collides with a
    /// row other than the one at `skip`.
    fn unique_conflict(&self, table: &str, candidate: &Row, skip: Option<usize>) -> Option<String> {
        let columns = self.unique.get(table)?;
        let rows = self.tables.get(table)?;
        columns
            .iter()
            .find(|col| {
                let Some(value) = candidate.get(col.as_str()).filter(|v| !v.is_null()) else {
                    return false;
                };
                rows.iter()
                    .enumerate()
                    .any(|(i, row)| Some(i) != skip && row.get(col.as_str()) == Some(value))
            })
            .cloned()
    }

    fn matching(&self, table: &str, filters: &[Filter]) -> Vec<usize> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, row)| filters.iter().all(|f| f.matches(row)))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn unique_violation(table: &str, column: &str) -> StoreError {
    StoreError::UniqueViolation {
        message: format!("duplicate key value violates unique constraint \"{table}_{column}_key\""),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state
            .matching(table, &query.filters)
            .into_iter()
            .map(|i| state.tables[table][i].clone())
            .collect::<Vec<_>>();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| compare_values(a.get(order), b.get(order)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if let Some(columns) = query.column_names() {
            rows = rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect();
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Row, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(col) = state.unique_conflict(table, row, None) {
            return Err(unique_violation(table, &col));
        }
        let mut row = row.clone();
        state.assign_id(&mut row);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Row,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let targets = state.matching(table, filters);
        for &i in &targets {
            let mut updated = state.tables[table][i].clone();
            updated.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            if let Some(col) = state.unique_conflict(table, &updated, Some(i)) {
                return Err(unique_violation(table, &col));
            }
        }
        if let Some(rows) = state.tables.get_mut(table) {
            for &i in &targets {
                rows[i].extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Ok(targets.len())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let Some(rows) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok(before - rows.len())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        if !state.tables.contains_key(table) && !state.unique.contains_key(table) {
            return Err(StoreError::NotFound(format!("relation \"{table}\" does not exist")));
        }
        Ok(state.matching(table, filters).len())
    }

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, StoreError> {
        let mut state = self.state.lock().await;
        if state.rpc_disabled || function != EMBEDDING_FUNCTION {
            return Err(StoreError::NotFound(format!(
                "Could not find the function public.{function}"
            )));
        }
        let slug = args.get("p_slug").cloned().unwrap_or(Value::Null);
        let targets = state.matching(table::DESTINATIONS, &[Filter::Eq(column::SLUG.to_string(), slug)]);
        if let Some(rows) = state.tables.get_mut(table::DESTINATIONS) {
            for &i in &targets {
                rows[i].insert(
                    column::EMBEDDING.to_string(),
                    args.get("p_embedding").cloned().unwrap_or(Value::Null),
                );
                rows[i].insert(
                    column::SEARCH_TEXT.to_string(),
                    args.get("p_search_text").cloned().unwrap_or(Value::Null),
                );
            }
        }
        Ok(Value::Null)
    }
}
