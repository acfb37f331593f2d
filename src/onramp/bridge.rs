//! Payment Bridge Client
//!
//! The fiat-to-asset provider is a black box with a quote/status contract:
//! a quote returns a payment link and an intent id, and the intent is then
//! polled until it reports `COMPLETED` or `FAILED`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::acquisition::OnrampStatus;

/// Payment bridge errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote rejected: {0}")]
    QuoteRejected(String),

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Purchase to be quoted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Fiat currency code, e.g. `USD`
    pub from_currency: String,
    /// Asset symbol delivered on the ledger
    pub to_asset: String,
    /// Recipient wallet
    pub to_address: String,
    /// Reserve base units
    #[serde(serialize_with = "as_decimal_string")]
    pub amount: u128,
}

fn as_decimal_string<S: serde::Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_string())
}

/// Provider quote
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub on_ramp_link: String,
    pub intent_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: OnrampStatus,
}

/// Fiat-to-asset purchase provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentBridge: Send + Sync {
    /// Quote a purchase; the link is shown to the user
    async fn quote(&self, request: QuoteRequest) -> Result<Quote, BridgeError>;

    /// Current status of a quoted purchase
    async fn status(&self, intent_id: &str) -> Result<OnrampStatus, BridgeError>;
}

/// Payment provider HTTP client
#[derive(Debug, Clone)]
pub struct HttpPaymentBridge {
    client: Client,
    base_url: String,
}

impl HttpPaymentBridge {
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

#[async_trait]
impl PaymentBridge for HttpPaymentBridge {
    async fn quote(&self, request: QuoteRequest) -> Result<Quote, BridgeError> {
        let url = format!("{}/quote", self.base_url);
        let resp = self.client.post(&url).json(&request).send().await?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::QuoteRejected(body));
        }
        if !status.is_success() {
            return Err(BridgeError::Unavailable(format!("quote returned {}", status)));
        }

        let quote: Quote = resp.json().await?;
        Ok(quote)
    }

    async fn status(&self, intent_id: &str) -> Result<OnrampStatus, BridgeError> {
        let url = format!("{}/status/{}", self.base_url, intent_id);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BridgeError::UnknownIntent(intent_id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(BridgeError::Unavailable(format!(
                "status returned {}",
                resp.status()
            )));
        }

        let body: StatusResponse = resp.json().await?;
        Ok(body.status)
    }
}
