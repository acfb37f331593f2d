//! Ledger Client Interface
//!
//! Read/write access to the token and reserve-asset contracts. The client is
//! bound to one wallet; write calls are sent from it.

use async_trait::async_trait;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by the wallet")]
    UserRejected,

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Errors that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Http(_) | LedgerError::Unavailable(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Fungible assets the client tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// Stable-value reserve asset (6 decimals)
    Reserve,
    /// Reserve-backed token (18 decimals)
    Token,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Reserve => "reserve",
            Asset::Token => "token",
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded-but-untyped event log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u32,
    /// Canonical event signature, e.g. `TokensBurned(uint256)`
    pub signature: String,
    /// Event arguments in base units
    pub args: Vec<u128>,
}

/// Block header fields the client needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    /// Seconds since the epoch
    pub timestamp: u64,
}

/// Transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub revert_reason: Option<String>,
}

impl TxReceipt {
    /// Turn a failed receipt into `LedgerError::Reverted`
    pub fn into_result(self) -> LedgerResult<TxReceipt> {
        if self.success {
            Ok(self)
        } else {
            let reason = self
                .revert_reason
                .clone()
                .unwrap_or_else(|| format!("transaction {} failed", self.tx_hash));
            Err(LedgerError::Reverted(reason))
        }
    }
}

/// Access to the token and reserve-asset contracts
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance of `owner` in base units
    async fn balance_of(&self, asset: Asset, owner: &str) -> LedgerResult<u128>;

    /// Reserve-asset allowance granted by `owner` to `spender`
    async fn allowance(&self, owner: &str, spender: &str) -> LedgerResult<u128>;

    /// Approve `spender` to pull `amount` reserve base units from the wallet
    async fn approve(&self, spender: &str, amount: u128) -> LedgerResult<TxHash>;

    /// Mint `amount` token base units to `to`, paid from the wallet's reserve
    async fn mint(&self, to: &str, amount: u128) -> LedgerResult<TxHash>;

    /// Burn `amount` token base units from the wallet for reserve
    async fn redeem(&self, amount: u128) -> LedgerResult<TxHash>;

    /// Logs matching any of `signatures` in `from_block..=to_block`
    async fn get_events(
        &self,
        signatures: &[&str],
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<RawLog>>;

    async fn get_block(&self, number: u64) -> LedgerResult<Block>;

    async fn head_block(&self) -> LedgerResult<u64>;

    /// Token total supply in base units
    async fn total_supply(&self) -> LedgerResult<u128>;

    /// Identifiers of the whole units held by `owner`, oldest first
    async fn get_owned_units(&self, owner: &str) -> LedgerResult<Vec<String>>;

    /// Markers attached to a unit; forfeited when the unit is redeemed
    async fn get_unit_markers(&self, unit_id: &str) -> LedgerResult<Vec<String>>;

    /// Wait until `tx_hash` is mined
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> LedgerResult<TxReceipt>;
}
