use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vdir_core::{column, slugify, Patch, Row};

use crate::{text_or_none, AdapterError};

const GALLERY_DELIMITER: char = ';';
const DEFAULT_CATEGORY: &str = "Others";
const UNKNOWN_COUNTRY: &str = "Unknown";

/// One row of the spaces spreadsheet export, keyed by its header names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceRow {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Slug", default)]
    pub slug: String,
    #[serde(rename = "City", default)]
    pub city: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Architect / Interior", default)]
    pub architect: String,
    #[serde(rename = "Brand", default)]
    pub brand: String,
    #[serde(rename = "Year of Opening", default)]
    pub year_opened: String,
    #[serde(rename = "Michelin Stars", default)]
    pub michelin_stars: String,
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Main Image", default)]
    pub main_image: String,
    #[serde(rename = "Gallery", default)]
    pub gallery: String,
}

impl SpaceRow {
    pub fn title(&self) -> Option<String> {
        text_or_none(&self.title)
    }

    pub fn slug(&self) -> Option<String> {
        text_or_none(&self.slug)
    }

    pub fn city(&self) -> Option<String> {
        text_or_none(&self.city)
    }

    pub fn year_opened(&self) -> Option<i64> {
        self.year_opened.trim().parse().ok()
    }

    pub fn michelin_stars(&self) -> Option<i64> {
        self.michelin_stars.trim().parse().ok()
    }

    /// Gallery URLs split on `;`, blanks dropped.
    pub fn gallery(&self) -> Vec<String> {
        self.gallery
            .split(GALLERY_DELIMITER)
            .filter_map(text_or_none)
            .collect()
    }

    /// Partial update carrying only the columns this row actually fills.
    /// Blank cells never produce a key, so existing values are not blanked.
    pub fn update_patch(&self) -> Patch {
        let mut patch = Patch::new();
        patch.set_opt(column::ARCHITECT, text_or_none(&self.architect));
        patch.set_opt(column::BRAND, text_or_none(&self.brand));
        patch.set_opt(column::YEAR_OPENED, self.year_opened());
        patch.set_opt(column::MICHELIN_STARS, self.michelin_stars());
        patch.set_opt(column::NEIGHBORHOOD, text_or_none(&self.location));
        let gallery = self.gallery();
        if !gallery.is_empty() {
            patch.set(column::GALLERY, gallery);
        }
        patch
    }

    /// Full row for a record that does not exist yet. Country is not part of
    /// the export and is left as `Unknown` for manual follow-up.
    pub fn new_record_row(&self) -> Row {
        let title = self.title().unwrap_or_default();
        let mut patch = Patch::new();
        patch.set(column::NAME, title.clone());
        patch.set(column::SLUG, self.slug().unwrap_or_else(|| slugify(&title)));
        patch.set(column::CITY, self.city().unwrap_or_default());
        patch.set(
            column::CATEGORY,
            text_or_none(&self.kind).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        );
        patch.set(column::COUNTRY, UNKNOWN_COUNTRY);
        patch.set(column::DESCRIPTION, Value::String(String::new()));
        patch.set(column::CONTENT, Value::String(String::new()));
        patch.extend(self.update_patch());
        patch.set_opt(column::IMAGE, text_or_none(&self.main_image));
        patch.into_row()
    }
}

pub fn parse_space_rows<R: Read>(reader: R) -> Result<Vec<SpaceRow>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    reader
        .deserialize::<SpaceRow>()
        .map(|row| row.map_err(AdapterError::from))
        .collect()
}

pub fn read_space_rows(path: impl AsRef<Path>) -> Result<Vec<SpaceRow>, AdapterError> {
    let file = File::open(path.as_ref())?;
    parse_space_rows(file)
}
