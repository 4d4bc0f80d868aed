use std::cmp::Ordering;

use serde_json::Value;
use vdir_core::Row;

/// Row predicate understood by every store backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    pub fn not_null(column: &str) -> Self {
        Self::NotNull(column.to_string())
    }

    /// PostgREST query-string form, e.g. `("slug", "eq.the-mark")`.
    pub fn to_param(&self) -> (String, String) {
        match self {
            Self::Eq(column, value) => (column.clone(), format!("eq.{}", value_text(value))),
            Self::IsNull(column) => (column.clone(), "is.null".to_string()),
            Self::NotNull(column) => (column.clone(), "not.is.null".to_string()),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(column, value) => row.get(column).is_some_and(|v| loosely_equal(v, value)),
            Self::IsNull(column) => row.get(column).map_or(true, Value::is_null),
            Self::NotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Select request: column list, filters, ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order = Some(column.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested column names; `None` means every column.
    pub fn column_names(&self) -> Option<Vec<String>> {
        let columns = self.columns.as_deref()?;
        let names = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if names.is_empty() || names.iter().any(|c| c == "*") {
            None
        } else {
            Some(names)
        }
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.column_names()
                .map(|c| c.join(","))
                .unwrap_or_else(|| "*".to_string()),
        )];
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Ascending order used by the in-memory store: nulls last, numbers before
/// strings.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = |v: Option<&Value>| match v {
        None | Some(Value::Null) => 3,
        Some(Value::Number(_)) => 0,
        Some(Value::String(_)) => 1,
        Some(_) => 2,
    };
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_encodes_postgrest_params() {
        let query = Query::new()
            .select("slug, name , city")
            .filter(Filter::eq("city", "paris"))
            .filter(Filter::not_null("architect"))
            .filter(Filter::is_null("embedding"))
            .order_by("id")
            .limit(5);
        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "slug,name,city".to_string()),
                ("city".to_string(), "eq.paris".to_string()),
                ("architect".to_string(), "not.is.null".to_string()),
                ("embedding".to_string(), "is.null".to_string()),
                ("order".to_string(), "id".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn star_selects_every_column() {
        assert_eq!(Query::new().select("*").column_names(), None);
        assert_eq!(Query::new().to_params()[0].1, "*");
    }

    #[test]
    fn filters_match_rows() {
        let Value::Object(row) = json!({"id": 3, "slug": "a", "architect": null}) else {
            unreachable!()
        };
        assert!(Filter::eq("id", 3).matches(&row));
        assert!(Filter::eq("slug", "a").matches(&row));
        assert!(Filter::is_null("architect").matches(&row));
        assert!(Filter::is_null("brand").matches(&row));
        assert!(!Filter::not_null("architect").matches(&row));
    }
}
