//! Structured Logging for the Reserve Client
//!
//! Provides structured logging with:
//! - JSON output for log aggregation on mainnet
//! - Correlation IDs tying together the steps of one flow
//! - Scan, flow and onramp event helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use reserve_client::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, false)?;
//! tracing::info!(target: "reserve::scanner", cursor = 42, "history refreshed");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Event-log scanning and history merges
    Scan,
    /// Acquisition flow transitions
    Acquisition,
    /// Redemption flow transitions
    Redemption,
    /// Payment bridge quotes and status polling
    Onramp,
    /// Persistent cache reads and writes
    Cache,
    /// Startup and shutdown
    System,
    /// Error events
    Error,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for flow tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Render this event as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Domain Event Logging
// ============================================================================

/// Log the outcome of one history refresh
pub fn log_scan_event(
    from_block: u64,
    cursor: Option<u64>,
    snapshots: usize,
    complete: bool,
    duration_ms: u64,
) {
    let level = if complete { LogLevel::Info } else { LogLevel::Warn };
    let event = LogEvent::new(level, EventCategory::Scan, "history refresh")
        .with_duration(duration_ms)
        .with_data(serde_json::json!({
            "from_block": from_block,
            "cursor": cursor,
            "snapshots": snapshots,
            "complete": complete
        }));

    if complete {
        tracing::info!(target: "reserve::scanner", "{}", event.to_json());
    } else {
        tracing::warn!(target: "reserve::scanner", "{}", event.to_json());
    }
}

/// Log a state transition of an acquisition or redemption flow
pub fn log_flow_event(
    category: EventCategory,
    flow_id: &str,
    from: &str,
    to: &str,
    error: Option<(&str, &str)>,
) {
    let level = if error.is_some() { LogLevel::Error } else { LogLevel::Info };
    let mut event = LogEvent::new(level, category, format!("{} -> {}", from, to))
        .with_correlation_id(flow_id)
        .with_data(serde_json::json!({
            "from": from,
            "to": to
        }));

    if let Some((code, message)) = error {
        event = event.with_error(code, message);
    }

    let target = match category {
        EventCategory::Redemption => "reserve::redemption",
        _ => "reserve::acquisition",
    };

    if level == LogLevel::Error {
        tracing::error!(target: "reserve::flow", flow = target, "{}", event.to_json());
    } else {
        tracing::info!(target: "reserve::flow", flow = target, "{}", event.to_json());
    }
}

/// Log an onramp chunk status change
pub fn log_onramp_event(
    flow_id: &str,
    intent_id: &str,
    chunk_index: usize,
    amount: u128,
    status: &str,
) {
    let failed = status.eq_ignore_ascii_case("failed");
    let level = if failed { LogLevel::Error } else { LogLevel::Info };
    let event = LogEvent::new(level, EventCategory::Onramp, format!("chunk {}", status))
        .with_correlation_id(flow_id)
        .with_data(serde_json::json!({
            "intent_id": intent_id,
            "chunk_index": chunk_index,
            "amount": amount.to_string(),
            "status": status
        }));

    if failed {
        tracing::error!(target: "reserve::onramp", "{}", event.to_json());
    } else {
        tracing::info!(target: "reserve::onramp", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (used on mainnet)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let level_name = format!("{:?}", level).to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "reserve={},reserve_client={},reqwest={}",
            level_name, level_name, level_name
        ))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from ReserveConfig
pub fn init_from_config(config: &super::config::ReserveConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == super::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for a flow
pub fn generate_correlation_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("flow-{}", &id[..12])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Scan, "Test event")
            .with_correlation_id("flow-123")
            .with_data(serde_json::json!({"cursor": "42"}))
            .with_duration(17);

        let json = event.to_json();
        assert!(json.contains("Test event"));
        assert!(json.contains("flow-123"));
        assert!(json.contains("\"scan\""));
        assert!(json.contains("17"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert!(id1.starts_with("flow-"));
        assert_ne!(id1, id2);
    }
}
