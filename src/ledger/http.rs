//! HTTP Ledger Gateway Client
//!
//! Talks to a ledger gateway that exposes contract reads, event logs and
//! wallet-signed writes over REST. Amounts travel as decimal strings.
//!
//! Write endpoints report failures by status:
//! - 403: the wallet rejected the request
//! - 422: the call reverted (body is the reason)
//! - 404: unknown resource

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::client::{
    Asset, Block, LedgerClient, LedgerError, LedgerResult, RawLog, TxHash, TxReceipt,
};
use crate::common::config::validate_address;

/// Receipt polling defaults
const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(2);
const DEFAULT_RECEIPT_ATTEMPTS: u32 = 90;

/// Ledger gateway HTTP client
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    wallet: Option<String>,
    receipt_poll: Duration,
    receipt_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct HeadResponse {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    number: u64,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogResponse {
    block_number: u64,
    #[serde(default)]
    log_index: u32,
    signature: String,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct UnitsResponse {
    units: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MarkersResponse {
    markers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    from: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    block_number: u64,
    success: bool,
    #[serde(default)]
    revert_reason: Option<String>,
}

fn parse_amount(raw: &str) -> LedgerResult<u128> {
    raw.trim()
        .parse::<u128>()
        .map_err(|_| LedgerError::InvalidResponse(format!("not an amount: {}", raw)))
}

impl HttpLedgerClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            wallet: None,
            receipt_poll: DEFAULT_RECEIPT_POLL,
            receipt_attempts: DEFAULT_RECEIPT_ATTEMPTS,
        }
    }

    /// Bind the wallet that write calls are sent from
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    /// Override receipt polling
    pub fn with_receipt_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.receipt_poll = interval;
        self.receipt_attempts = attempts.max(1);
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn wallet(&self) -> LedgerResult<&str> {
        self.wallet
            .as_deref()
            .ok_or_else(|| LedgerError::InvalidAddress("no wallet bound".to_string()))
    }

    fn check_address(address: &str) -> LedgerResult<()> {
        validate_address("address", address)
            .map_err(|_| LedgerError::InvalidAddress(address.to_string()))
    }

    async fn check_status(resp: Response, what: &str) -> LedgerResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::FORBIDDEN => LedgerError::UserRejected,
            StatusCode::UNPROCESSABLE_ENTITY => LedgerError::Reverted(body),
            StatusCode::NOT_FOUND => LedgerError::NotFound(what.to_string()),
            _ => LedgerError::Unavailable(format!("{} returned {}: {}", what, status, body)),
        })
    }

    async fn get_amount(&self, url: String) -> LedgerResult<u128> {
        let resp = self.client.get(&url).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let body: AmountResponse = resp.json().await?;
        parse_amount(&body.amount)
    }

    async fn send_tx(&self, kind: &str, to: Option<&str>, amount: u128) -> LedgerResult<TxHash> {
        let url = format!("{}/tx/{}", self.base_url, kind);
        let request = TxRequest {
            from: self.wallet()?,
            to,
            amount: amount.to_string(),
        };

        let resp = self.client.post(&url).json(&request).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let body: TxResponse = resp.json().await?;

        debug!(target: "reserve::ledger", kind, tx = %body.tx_hash, "Transaction submitted");
        Ok(TxHash(body.tx_hash))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn balance_of(&self, asset: Asset, owner: &str) -> LedgerResult<u128> {
        Self::check_address(owner)?;
        self.get_amount(format!("{}/balances/{}/{}", self.base_url, asset, owner))
            .await
    }

    async fn allowance(&self, owner: &str, spender: &str) -> LedgerResult<u128> {
        Self::check_address(owner)?;
        Self::check_address(spender)?;
        self.get_amount(format!("{}/allowances/{}/{}", self.base_url, owner, spender))
            .await
    }

    async fn approve(&self, spender: &str, amount: u128) -> LedgerResult<TxHash> {
        Self::check_address(spender)?;
        self.send_tx("approve", Some(spender), amount).await
    }

    async fn mint(&self, to: &str, amount: u128) -> LedgerResult<TxHash> {
        Self::check_address(to)?;
        self.send_tx("mint", Some(to), amount).await
    }

    async fn redeem(&self, amount: u128) -> LedgerResult<TxHash> {
        self.send_tx("redeem", None, amount).await
    }

    async fn get_events(
        &self,
        signatures: &[&str],
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<RawLog>> {
        let url = format!("{}/events", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("from", from_block.to_string()),
            ("to", to_block.to_string()),
        ];
        query.extend(signatures.iter().map(|sig| ("sig", sig.to_string())));

        let resp = self.client.get(&url).query(&query).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let logs: Vec<LogResponse> = resp.json().await?;

        logs.into_iter()
            .map(|log| {
                let args = log
                    .args
                    .iter()
                    .map(|a| parse_amount(a))
                    .collect::<LedgerResult<Vec<_>>>()?;
                Ok(RawLog {
                    block_number: log.block_number,
                    log_index: log.log_index,
                    signature: log.signature,
                    args,
                })
            })
            .collect()
    }

    async fn get_block(&self, number: u64) -> LedgerResult<Block> {
        let url = format!("{}/blocks/{}", self.base_url, number);
        let resp = self.client.get(&url).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let block: BlockResponse = resp.json().await?;

        Ok(Block {
            number: block.number,
            timestamp: block.timestamp,
        })
    }

    async fn head_block(&self) -> LedgerResult<u64> {
        let url = format!("{}/head", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let head: HeadResponse = resp.json().await?;
        Ok(head.number)
    }

    async fn total_supply(&self) -> LedgerResult<u128> {
        self.get_amount(format!("{}/supply", self.base_url)).await
    }

    async fn get_owned_units(&self, owner: &str) -> LedgerResult<Vec<String>> {
        Self::check_address(owner)?;
        let url = format!("{}/units/{}", self.base_url, owner);
        let resp = self.client.get(&url).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let body: UnitsResponse = resp.json().await?;
        Ok(body.units)
    }

    async fn get_unit_markers(&self, unit_id: &str) -> LedgerResult<Vec<String>> {
        let url = format!("{}/units/{}/markers", self.base_url, unit_id);
        let resp = self.client.get(&url).send().await?;
        let resp = Self::check_status(resp, &url).await?;
        let body: MarkersResponse = resp.json().await?;
        Ok(body.markers)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> LedgerResult<TxReceipt> {
        let url = format!("{}/tx/{}/receipt", self.base_url, tx_hash);

        for _ in 0..self.receipt_attempts {
            let resp = self.client.get(&url).send().await?;
            if resp.status() == StatusCode::NOT_FOUND {
                // Not mined yet
                tokio::time::sleep(self.receipt_poll).await;
                continue;
            }

            let resp = Self::check_status(resp, &url).await?;
            let receipt: ReceiptResponse = resp.json().await?;
            return Ok(TxReceipt {
                tx_hash: tx_hash.clone(),
                block_number: receipt.block_number,
                success: receipt.success,
                revert_reason: receipt.revert_reason,
            });
        }

        Err(LedgerError::Unavailable(format!(
            "no receipt for {} after {} attempts",
            tx_hash, self.receipt_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_urls() {
        let client = HttpLedgerClient::new("http://localhost:8545/");
        assert_eq!(client.base_url(), "http://localhost:8545");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(
            parse_amount("1000000000000000000000").unwrap(),
            1_000_000_000_000_000_000_000
        );
        assert!(matches!(
            parse_amount("-1"),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_need_a_wallet() {
        let client = HttpLedgerClient::new("http://localhost:1");
        let err = client.redeem(1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_invalid_owner_rejected_before_request() {
        let client = HttpLedgerClient::new("http://localhost:1");
        let err = client.balance_of(Asset::Token, "not-an-address").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
    }
}
