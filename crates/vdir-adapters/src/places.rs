use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use vdir_core::{column, Patch};
use vdir_storage::ApiHttp;

use crate::{AdapterError, PlaceLookup};

const API: &str = "places";
const BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const MAX_REVIEWS: usize = 5;

const DETAIL_FIELDS: &[&str] = &[
    "place_id",
    "name",
    "rating",
    "user_ratings_total",
    "price_level",
    "formatted_address",
    "formatted_phone_number",
    "international_phone_number",
    "website",
    "opening_hours",
    "geometry",
    "reviews",
    "types",
    "plus_code",
    "editorial_summary",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub location: Option<LatLng>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlusCode {
    #[serde(default)]
    pub global_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorialSummary {
    #[serde(default)]
    pub overview: Option<String>,
}

/// Detail fields returned for one place identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u64>,
    #[serde(default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub formatted_phone_number: Option<String>,
    #[serde(default)]
    pub international_phone_number: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub plus_code: Option<PlusCode>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Value>,
    #[serde(default)]
    pub editorial_summary: Option<EditorialSummary>,
}

impl PlaceDetails {
    /// Record columns filled from these details; absent details add nothing.
    pub fn to_patch(&self) -> Patch {
        let mut patch = Patch::new();
        patch.set_opt("rating", self.rating);
        patch.set_opt("user_ratings_total", self.user_ratings_total);
        patch.set_opt(column::PRICE_LEVEL, self.price_level);
        patch.set_opt("formatted_address", self.formatted_address.clone());
        patch.set_opt(column::PHONE_NUMBER, self.formatted_phone_number.clone());
        patch.set_opt("international_phone_number", self.international_phone_number.clone());
        patch.set_opt("website", self.website.clone());
        patch.set_opt(column::OPENING_HOURS_JSON, self.opening_hours.clone());
        if let Some(location) = self.geometry.as_ref().and_then(|g| g.location.as_ref()) {
            patch.set("latitude", location.lat);
            patch.set("longitude", location.lng);
        }
        patch.set_opt(
            "plus_code",
            self.plus_code.as_ref().and_then(|p| p.global_code.clone()),
        );
        if !self.types.is_empty() {
            patch.set("tags", self.types.clone());
        }
        if !self.reviews.is_empty() {
            patch.set(
                "reviews_json",
                Value::Array(self.reviews.iter().take(MAX_REVIEWS).cloned().collect()),
            );
        }
        patch.set_opt(
            "ai_summary",
            self.editorial_summary.as_ref().and_then(|e| e.overview.clone()),
        );
        patch
    }
}

/// Check the `status` field of a places response. `Ok(true)` means results
/// are present, `Ok(false)` an empty-but-valid answer.
pub fn check_status(body: &Value) -> Result<bool, AdapterError> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
    match status {
        "OK" => Ok(true),
        "ZERO_RESULTS" | "NOT_FOUND" => Ok(false),
        other => Err(AdapterError::Status {
            api: API,
            status: other.to_string(),
            message: body
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("no error message")
                .to_string(),
        }),
    }
}

pub struct PlacesClient {
    http: ApiHttp,
    api_key: String,
}

impl PlacesClient {
    pub fn new(http: ApiHttp, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl PlaceLookup for PlacesClient {
    async fn find_place_id(&self, text: &str) -> Result<Option<String>, AdapterError> {
        let url = format!("{BASE_URL}/findplacefromtext/json");
        let body = self
            .http
            .get_json(
                &url,
                &[
                    ("input", text),
                    ("inputtype", "textquery"),
                    ("fields", "place_id"),
                    ("key", self.api_key.as_str()),
                ],
            )
            .await?;
        if !check_status(&body)? {
            debug!(query = text, "no place candidates");
            return Ok(None);
        }
        Ok(body
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("place_id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn place_details(&self, place_id: &str) -> Result<Option<PlaceDetails>, AdapterError> {
        let url = format!("{BASE_URL}/details/json");
        let fields = DETAIL_FIELDS.join(",");
        let body = self
            .http
            .get_json(
                &url,
                &[("place_id", place_id), ("fields", fields.as_str()), ("key", self.api_key.as_str())],
            )
            .await?;
        if !check_status(&body)? {
            return Ok(None);
        }
        let Some(result) = body.get("result") else {
            debug!(place_id, "details response without result");
            return Ok(None);
        };
        serde_json::from_value(result.clone())
            .map(Some)
            .map_err(|e| AdapterError::Decode {
                api: API,
                message: e.to_string(),
            })
    }
}
