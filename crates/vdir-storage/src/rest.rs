use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;
use vdir_core::Row;

use crate::error::{classify_reqwest_error, classify_response};
use crate::{Filter, Query, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
}

/// PostgREST-speaking store client (`/rest/v1/<table>`, `/rest/v1/rpc/<fn>`).
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()
            .context("building store http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, Option<String>, String), StoreError> {
        let resp = self
            .authorized(builder)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = resp.status();
        let range = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(classify_reqwest_error)?;
        if !status.is_success() {
            return Err(classify_response(status, &body));
        }
        Ok((status, range, body))
    }

    fn decode_rows(body: &str) -> Result<Vec<Row>, StoreError> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

/// Total from a `Content-Range` header such as `0-24/924` or `*/0`.
pub fn parse_content_range(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl RecordStore for RestStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        debug!(table, ?query, "store select");
        let builder = self.client.get(self.table_url(table)).query(&query.to_params());
        let (_, _, body) = self.send(builder).await?;
        Self::decode_rows(&body)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Row, StoreError> {
        let builder = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row);
        let (_, _, body) = self.send(builder).await?;
        Self::decode_rows(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {table} returned no row")))
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Row,
    ) -> Result<usize, StoreError> {
        let builder = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(patch);
        let (_, _, body) = self.send(builder).await?;
        Ok(Self::decode_rows(&body)?.len())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let builder = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        let (_, _, body) = self.send(builder).await?;
        Ok(Self::decode_rows(&body)?.len())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filters));
        let builder = self
            .client
            .head(self.table_url(table))
            .query(&params)
            .header("Prefer", "count=exact");
        let (_, range, _) = self.send(builder).await?;
        range
            .as_deref()
            .and_then(parse_content_range)
            .ok_or_else(|| StoreError::Decode(format!("missing Content-Range count for {table}")))
    }

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, StoreError> {
        let builder = self.client.post(self.rpc_url(function)).json(args);
        let (_, _, body) = self.send(builder).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_totals_parse() {
        assert_eq!(parse_content_range("0-24/924"), Some(924));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn urls_drop_trailing_slash() {
        let store = RestStore::new(StoreConfig {
            base_url: "https://example.supabase.co/".into(),
            service_key: "key".into(),
            timeout: Duration::from_secs(5),
        })
        .expect("store");
        assert_eq!(
            store.table_url("destinations"),
            "https://example.supabase.co/rest/v1/destinations"
        );
        assert_eq!(
            store.rpc_url("update_destination_embedding"),
            "https://example.supabase.co/rest/v1/rpc/update_destination_embedding"
        );
    }
}
