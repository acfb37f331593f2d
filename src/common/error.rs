//! Common Error Types for the Reserve Client
//!
//! `FlowError` is the user-facing taxonomy surfaced by the acquisition and
//! redemption flows. `ClientError` is the root error for everything else.

use thiserror::Error;

use crate::history::api::HistoryApiError;
use crate::ledger::LedgerError;
use crate::onramp::{BridgeError, ChunkError};
use crate::storage::StorageError;

/// Classified failure of a transaction flow
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("the request was rejected in the wallet")]
    UserRejected,

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("insufficient allowance: required {required}, approved {approved}")]
    InsufficientAllowance { required: u128, approved: u128 },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("payment provider could not quote: {0}")]
    ProviderQuoteFailed(String),

    #[error("payment provider reported failure: {0}")]
    ProviderPaymentFailed(String),

    #[error("contract reverted: {0}")]
    ContractRevert(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("{} unit(s) carry markers that are forfeited on redemption", .0.len())]
    DioWarning(Vec<String>),
}

impl FlowError {
    /// Short title for display
    pub fn title(&self) -> &'static str {
        match self {
            FlowError::UserRejected => "Transaction rejected",
            FlowError::InsufficientBalance { .. } => "Insufficient balance",
            FlowError::InsufficientAllowance { .. } => "Approval required",
            FlowError::ConfigurationError(_) => "Configuration problem",
            FlowError::ProviderQuoteFailed(_) => "Quote unavailable",
            FlowError::ProviderPaymentFailed(_) => "Payment failed",
            FlowError::ContractRevert(_) => "Transaction reverted",
            FlowError::NetworkError(_) => "Network error",
            FlowError::DioWarning(_) => "Markers will be forfeited",
        }
    }

    /// Human-readable message for display
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            FlowError::UserRejected => "USER_REJECTED",
            FlowError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FlowError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            FlowError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            FlowError::ProviderQuoteFailed(_) => "PROVIDER_QUOTE_FAILED",
            FlowError::ProviderPaymentFailed(_) => "PROVIDER_PAYMENT_FAILED",
            FlowError::ContractRevert(_) => "CONTRACT_REVERT",
            FlowError::NetworkError(_) => "NETWORK_ERROR",
            FlowError::DioWarning(_) => "DIO_WARNING",
        }
    }

    /// Warnings gate a flow behind confirmation instead of failing it
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FlowError::DioWarning(_))
    }
}

impl From<LedgerError> for FlowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserRejected => FlowError::UserRejected,
            LedgerError::Reverted(reason) => FlowError::ContractRevert(reason),
            LedgerError::InvalidAddress(addr) => {
                FlowError::ConfigurationError(format!("invalid address: {}", addr))
            }
            other => FlowError::NetworkError(other.to_string()),
        }
    }
}

impl From<ChunkError> for FlowError {
    fn from(err: ChunkError) -> Self {
        FlowError::ConfigurationError(err.to_string())
    }
}

impl From<BridgeError> for FlowError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::QuoteRejected(reason) => FlowError::ProviderQuoteFailed(reason),
            other => FlowError::NetworkError(other.to_string()),
        }
    }
}

/// Root error type for the reserve client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Ledger errors
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Remote history feed errors
    #[error("history API error: {0}")]
    HistoryApi(#[from] HistoryApiError),

    /// Payment bridge errors
    #[error("payment bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Flow errors
    #[error("{}: {}", .0.title(), .0)]
    Flow(#[from] FlowError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Ledger(e) => e.is_transient(),
            ClientError::HistoryApi(_) | ClientError::Bridge(_) | ClientError::Io(_) => true,
            ClientError::Flow(FlowError::NetworkError(_)) => true,
            _ => false,
        }
    }

    /// Get error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::Config(_) => "CONFIG_ERROR",
            ClientError::Logging(_) => "LOGGING_ERROR",
            ClientError::Storage(_) => "STORAGE_ERROR",
            ClientError::Ledger(_) => "LEDGER_ERROR",
            ClientError::HistoryApi(_) => "HISTORY_API_ERROR",
            ClientError::Bridge(_) => "BRIDGE_ERROR",
            ClientError::Flow(e) => e.error_code(),
            ClientError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;
