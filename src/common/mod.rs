//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the reserve client.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, Network, ReserveConfig, BURN_ADDRESS};
pub use error::{ClientError, FlowError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_flow_event, log_onramp_event,
    log_scan_event, EventCategory, LogEvent, LogLevel, LoggingError,
};
