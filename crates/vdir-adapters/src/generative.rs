use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use vdir_core::{column, title_from_slug, Patch, Record};
use vdir_storage::ApiHttp;

use crate::{AdapterError, TagGenerator};

const API: &str = "generative";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-2.5-flash";
const DESCRIPTION_CHARS: usize = 200;
const CONTENT_CHARS: usize = 500;

/// Structured output requested from the generative model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiFields {
    #[serde(default)]
    pub vibe_tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub short_summary: String,
    #[serde(default)]
    pub search_keywords: Vec<String>,
}

impl AiFields {
    pub fn is_empty(&self) -> bool {
        self.vibe_tags.is_empty()
            && self.keywords.is_empty()
            && self.short_summary.trim().is_empty()
            && self.search_keywords.is_empty()
    }

    pub fn to_patch(&self, generated_at: DateTime<Utc>) -> Patch {
        let mut patch = Patch::new();
        patch.set(column::VIBE_TAGS, self.vibe_tags.clone());
        patch.set(column::KEYWORDS, self.keywords.clone());
        patch.set(column::SHORT_SUMMARY, self.short_summary.clone());
        patch.set(column::SEARCH_KEYWORDS, self.search_keywords.clone());
        patch.set(column::AI_FIELDS_GENERATED_AT, generated_at.to_rfc3339());
        patch
    }
}

fn response_schema() -> Value {
    let string_list = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    json!({
        "type": "OBJECT",
        "properties": {
            "vibe_tags": string_list,
            "keywords": string_list,
            "short_summary": {"type": "STRING"},
            "search_keywords": string_list,
        },
        "required": ["vibe_tags", "keywords", "short_summary", "search_keywords"],
    })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(record: &Record) -> String {
    let city = record.city.as_deref().map(title_from_slug).unwrap_or_default();
    let category = record.category.clone().unwrap_or_default();
    let stars = match record.value(column::MICHELIN_STARS) {
        Value::Number(n) => n.to_string(),
        _ => "None".to_string(),
    };
    let description = record
        .text(column::DESCRIPTION)
        .map(|d| truncate_chars(&d, DESCRIPTION_CHARS).to_string())
        .unwrap_or_else(|| "No description".to_string());

    let mut context = format!(
        "Destination Name: {}\nCity: {city}\nCategory: {category}\nMichelin Stars: {stars}\nDescription: {description}\n",
        record.name
    );
    if let Some(content) = record.text(column::CONTENT) {
        context.push_str(&format!("\nFull Content: {}", truncate_chars(&content, CONTENT_CHARS)));
    }

    format!(
        "You are a travel content expert. Analyze this destination and generate structured metadata.\n\n\
{context}\n\n\
Guidelines:\n\
- vibe_tags: 3-5 atmosphere words such as romantic, modern, cozy, upscale, casual, trendy, elegant, minimal, rustic, vibrant, intimate.\n\
- keywords: 5-8 search-friendly terms covering category, city, style and features.\n\
- short_summary: 2-3 sentences on what makes this place special, at most 200 characters.\n\
- search_keywords: 5-8 natural-language search phrases such as \"romantic restaurant tokyo\".\n"
    )
}

/// Parse model output into [`AiFields`], tolerating a fenced code block
/// around the JSON.
pub fn parse_ai_fields(text: &str) -> Result<AiFields, AdapterError> {
    let trimmed = text.trim();
    let body = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    serde_json::from_str(body.trim()).map_err(|e| AdapterError::Decode {
        api: API,
        message: e.to_string(),
    })
}

pub struct GeminiTagger {
    http: ApiHttp,
    api_key: String,
}

impl GeminiTagger {
    pub fn new(http: ApiHttp, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl TagGenerator for GeminiTagger {
    async fn generate(&self, record: &Record) -> Result<AiFields, AdapterError> {
        let url = format!("{BASE_URL}/models/{MODEL}:generateContent");
        debug!(slug = %record.slug, model = MODEL, "requesting AI fields");
        let request = json!({
            "contents": [{"parts": [{"text": build_prompt(record)}]}],
            "generationConfig": {
                "temperature": 0.3,
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });
        let body = self
            .http
            .post_json(&url, &[("key", self.api_key.as_str())], &request)
            .await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AdapterError::Decode {
                api: API,
                message: "missing candidate text".to_string(),
            })?;
        parse_ai_fields(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = r#"{"vibe_tags":["cozy"],"keywords":["cafe"],"short_summary":"Small.","search_keywords":["cozy cafe paris"]}"#;
        let fenced = format!("Here you go:\n```json\n{plain}\n```\n");
        assert_eq!(parse_ai_fields(plain).expect("plain"), parse_ai_fields(&fenced).expect("fenced"));
        assert_eq!(parse_ai_fields(plain).expect("plain").vibe_tags, vec!["cozy".to_string()]);
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let fields = parse_ai_fields(r#"{"short_summary":"Only this."}"#).expect("partial");
        assert!(fields.vibe_tags.is_empty());
        assert!(!fields.is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            parse_ai_fields("not json at all"),
            Err(AdapterError::Decode { .. })
        ));
    }

    #[test]
    fn prompt_truncates_long_text_on_char_boundaries() {
        let mut record = Record {
            slug: "cafe".into(),
            name: "Café Été".into(),
            city: Some("paris".into()),
            category: Some("Cafe".into()),
            ..Default::default()
        };
        record.set(column::DESCRIPTION, Value::String("é".repeat(400)));
        let prompt = build_prompt(&record);
        assert!(prompt.contains("City: Paris"));
        assert!(prompt.contains("Michelin Stars: None"));
        assert!(prompt.contains(&"é".repeat(200)));
        assert!(!prompt.contains(&"é".repeat(201)));
    }

    #[test]
    fn patch_stamps_generation_time() {
        let now = Utc::now();
        let patch = AiFields::default().to_patch(now);
        assert_eq!(patch.get("ai_fields_generated_at"), Some(&Value::String(now.to_rfc3339())));
    }
}
