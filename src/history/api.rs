//! Remote History Feed
//!
//! Optional HTTP feed of pre-aggregated reserve snapshots. Rows are returned
//! raw; `accounting::normalize` maps them onto `ReserveSnapshot`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Remote history errors
#[derive(Debug, Error)]
pub enum HistoryApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("history feed returned status {0}")]
    Status(u16),

    #[error("invalid history payload: {0}")]
    InvalidPayload(String),
}

/// Source of pre-aggregated history rows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteHistory: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<Value>, HistoryApiError>;
}

/// `GET {base}/history` client
#[derive(Debug, Clone)]
pub struct HistoryApiClient {
    client: Client,
    base_url: String,
}

impl HistoryApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Rows from either a bare array or an object wrapping one
fn extract_rows(body: Value) -> Result<Vec<Value>, HistoryApiError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => ["history", "data", "snapshots"]
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| HistoryApiError::InvalidPayload("no row array".to_string())),
        other => Err(HistoryApiError::InvalidPayload(format!(
            "expected array, got {}",
            other
        ))),
    }
}

#[async_trait]
impl RemoteHistory for HistoryApiClient {
    async fn fetch_rows(&self) -> Result<Vec<Value>, HistoryApiError> {
        let url = format!("{}/history", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(HistoryApiError::Status(resp.status().as_u16()));
        }

        let body: Value = resp.json().await?;
        extract_rows(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_rows() {
        assert_eq!(extract_rows(json!([{"time": 1}])).unwrap().len(), 1);
        assert_eq!(extract_rows(json!({"data": [1, 2]})).unwrap().len(), 2);
        assert!(matches!(
            extract_rows(json!({"rows": 3})),
            Err(HistoryApiError::InvalidPayload(_))
        ));
        assert!(extract_rows(json!("nope")).is_err());
    }

    #[test]
    fn test_client_urls() {
        let client = HistoryApiClient::new("https://stats.example/");
        assert_eq!(client.base_url(), "https://stats.example");
    }
}
