//! Core domain model for the venue directory: records, lookup rows, patches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CRATE_NAME: &str = "vdir-core";

/// A raw table row as exchanged with the store.
pub type Row = serde_json::Map<String, Value>;

pub mod table {
    pub const DESTINATIONS: &str = "destinations";
    pub const CITIES: &str = "cities";
    pub const CATEGORIES: &str = "categories";
    pub const PROFILES: &str = "profiles";
    pub const LIST_DESTINATIONS: &str = "list_destinations";
}

pub mod column {
    pub const ID: &str = "id";
    pub const SLUG: &str = "slug";
    pub const NAME: &str = "name";
    pub const CITY: &str = "city";
    pub const COUNTRY: &str = "country";
    pub const CATEGORY: &str = "category";
    pub const DESCRIPTION: &str = "description";
    pub const CONTENT: &str = "content";
    pub const IMAGE: &str = "image";
    pub const MAIN_IMAGE: &str = "main_image";
    pub const GALLERY: &str = "gallery";
    pub const ARCHITECT: &str = "architect";
    pub const BRAND: &str = "brand";
    pub const YEAR_OPENED: &str = "year_opened";
    pub const MICHELIN_STARS: &str = "michelin_stars";
    pub const NEIGHBORHOOD: &str = "neighborhood";
    pub const CREATED_AT: &str = "created_at";
    pub const GOOGLE_PLACE_ID: &str = "google_place_id";
    pub const PRICE_LEVEL: &str = "price_level";
    pub const OPENING_HOURS_JSON: &str = "opening_hours_json";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const VIBE_TAGS: &str = "vibe_tags";
    pub const KEYWORDS: &str = "keywords";
    pub const SHORT_SUMMARY: &str = "short_summary";
    pub const SEARCH_KEYWORDS: &str = "search_keywords";
    pub const EDITORIAL_SUMMARY: &str = "editorial_summary";
    pub const AI_FIELDS_GENERATED_AT: &str = "ai_fields_generated_at";
    pub const EMBEDDING: &str = "embedding";
    pub const SEARCH_TEXT: &str = "search_text";
    pub const LAST_ENRICHED_AT: &str = "last_enriched_at";
}

/// Columns reconciled when two records for the same place are merged.
pub const DEFAULT_MERGE_COLUMNS: &[&str] = &[
    column::NAME,
    column::DESCRIPTION,
    column::CONTENT,
    column::IMAGE,
    column::GALLERY,
    column::ARCHITECT,
    column::BRAND,
    column::YEAR_OPENED,
    column::MICHELIN_STARS,
    column::NEIGHBORHOOD,
    column::CATEGORY,
    column::COUNTRY,
    column::CITY,
];

/// Venue/destination entity. `slug` is the stable unique key; every column
/// outside the typed core lives in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub attributes: Row,
}

impl Record {
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }

    /// Column value as JSON; absent columns read as `Null`.
    pub fn value(&self, column: &str) -> Value {
        fn opt(v: &Option<String>) -> Value {
            v.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
        }
        match column {
            column::ID => self.id.map_or(Value::Null, Value::from),
            column::SLUG => Value::String(self.slug.clone()),
            column::NAME => Value::String(self.name.clone()),
            column::CITY => opt(&self.city),
            column::COUNTRY => opt(&self.country),
            column::CATEGORY => opt(&self.category),
            other => self.attributes.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn has_value(&self, column: &str) -> bool {
        !is_empty_value(&self.value(column))
    }

    /// String attribute, if the column holds a non-empty string.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.value(column) {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    /// String-list attribute; missing or non-list columns read as empty.
    pub fn list(&self, column: &str) -> Vec<String> {
        match self.value(column) {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set(&mut self, column: &str, value: Value) {
        fn as_opt(value: Value) -> Option<String> {
            match value {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            }
        }
        match column {
            column::ID => self.id = value.as_i64(),
            column::SLUG => self.slug = as_opt(value).unwrap_or_default(),
            column::NAME => self.name = as_opt(value).unwrap_or_default(),
            column::CITY => self.city = as_opt(value),
            column::COUNTRY => self.country = as_opt(value),
            column::CATEGORY => self.category = as_opt(value),
            other => {
                self.attributes.insert(other.to_string(), value);
            }
        }
    }

    pub fn apply_patch(&mut self, patch: &Patch) {
        for (column, value) in patch.iter() {
            self.set(column, value.clone());
        }
    }
}

/// Null, empty string and empty list all count as "no value".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Column-to-value update payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Row);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn set_opt<T: Into<Value>>(&mut self, column: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(column, value);
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Patch) {
        self.0.extend(other.0);
    }

    pub fn as_row(&self) -> &Row {
        &self.0
    }

    pub fn into_row(self) -> Row {
        self.0
    }
}

impl From<Row> for Patch {
    fn from(row: Row) -> Self {
        Self(row)
    }
}

/// Lookup row derived from the distinct `(city, country)` pairs of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub slug: String,
    pub country: String,
}

/// Lookup row derived from the distinct categories of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
}

/// Explicit duplicate pair: `delete_slug` is folded into `keep_slug`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePair {
    pub name: String,
    pub keep_slug: String,
    pub delete_slug: String,
}

/// URL-friendly slug: lowercase, `&` spelled out, runs of anything else
/// collapsed to a single `-`.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Display name from a city slug: `new-york` becomes `New York`.
pub fn title_from_slug(slug: &str) -> String {
    slug.replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
