//! Remote data store client.
//!
//! All persistence lives in a hosted Supabase project; this module wraps its
//! PostgREST surface behind the `DataStore` trait so the ledger can run
//! against the real project in production and an in-memory double in tests.
//! Calls are plain request/response; the store exposes no transactions to
//! this client.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Default timeout for store requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Equality filter on one column (`col=eq.value` on the wire).
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Table-level operations of the remote store.
///
/// `fetch_order` is the one composite read: an order with its items and
/// payments in a single round trip, both children ordered by creation time.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError>;

    /// Insert rows and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError>;

    /// Patch matching rows and return the updated rows. An empty result
    /// means no row matched the filters.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;

    async fn fetch_order(&self, order_id: &str) -> Result<Option<Value>, StoreError>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError>;
}

// ---------------------------------------------------------------------------
// Row codecs
// ---------------------------------------------------------------------------

pub(crate) fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, StoreError> {
    serde_json::from_value(row).map_err(|e| StoreError::Decode(e.to_string()))
}

pub(crate) fn encode_row<T: Serialize>(entity: &T) -> Result<Value, StoreError> {
    serde_json::to_value(entity).map_err(|e| StoreError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> StoreError {
    if err.is_connect() {
        return StoreError::Network(format!("Cannot reach Supabase at {url}"));
    }
    if err.is_timeout() {
        return StoreError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return StoreError::Network(format!("Invalid Supabase URL: {url}"));
    }
    StoreError::Network(format!("Network error communicating with {url}: {err}"))
}

/// Pull the PostgREST error message out of a failure body, keeping details
/// for diagnostics.
fn status_detail(body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        if let Some(message) = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
        {
            if let Some(details) = json.get("details").and_then(Value::as_str) {
                return format!("{message}: {details}");
            }
            return message.to_string();
        }
    }
    let trimmed = body_text.trim();
    if trimmed.is_empty() {
        "no detail".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Supabase client
// ---------------------------------------------------------------------------

/// PostgREST client for the configured Supabase project.
pub struct SupabaseStore {
    config: StoreConfig,
    client: Client,
}

impl SupabaseStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        if config.project_url.trim().is_empty() {
            return Err(StoreError::NotConfigured("project URL"));
        }
        if config.anon_key.trim().is_empty() {
            return Err(StoreError::NotConfigured("anon key"));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn rest_url(&self, path: &str, params: &[(String, String)]) -> Result<Url, StoreError> {
        let base = self.config.project_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/rest/v1/{path}"))
            .map_err(|e| StoreError::Network(format!("Invalid Supabase URL: {e}")))?;
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in params {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", self.config.anon_key))
            .header("Content-Type", "application/json")
    }

    async fn read_rows(&self, resp: reqwest::Response) -> Result<Vec<Value>, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                code: status.as_u16(),
                detail: status_detail(&body),
            });
        }
        let body_text = resp.text().await.unwrap_or_default();
        if body_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: Value = serde_json::from_str(&body_text)
            .map_err(|e| StoreError::Decode(format!("response body: {e}")))?;
        match parsed {
            Value::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        }
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

#[async_trait]
impl DataStore for SupabaseStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filters));
        let url = self.rest_url(table, &params)?;
        debug!(table, "store select");
        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        self.read_rows(resp).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        let url = self.rest_url(table, &[])?;
        debug!(table, count = rows.len(), "store insert");
        let resp = self
            .authed(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        self.read_rows(resp).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let params = filter_params(filters);
        let url = self.rest_url(table, &params)?;
        debug!(table, "store update");
        let resp = self
            .authed(self.client.patch(url))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        self.read_rows(resp).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let params = filter_params(filters);
        let url = self.rest_url(table, &params)?;
        debug!(table, "store delete");
        let resp = self
            .authed(self.client.delete(url))
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                code: status.as_u16(),
                detail: status_detail(&body),
            });
        }
        Ok(())
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Option<Value>, StoreError> {
        let params = vec![
            (
                "select".to_string(),
                "*,order_items(*),payments(*)".to_string(),
            ),
            ("id".to_string(), format!("eq.{order_id}")),
            ("order_items.order".to_string(), "created_at.asc".to_string()),
            ("payments.order".to_string(), "created_at.asc".to_string()),
        ];
        let url = self.rest_url("orders", &params)?;
        debug!(order_id, "store fetch_order");
        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        let rows = self.read_rows(resp).await?;
        Ok(rows.into_iter().next())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
        let url = self.rest_url(&format!("rpc/{function}"), &[])?;
        debug!(function, "store rpc");
        let resp = self
            .authed(self.client.post(url))
            .json(&args)
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.project_url, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                code: status.as_u16(),
                detail: status_detail(&body),
            });
        }
        let body_text = resp.text().await.unwrap_or_default();
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| StoreError::Decode(format!("rpc body: {e}")))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
