use serde::{Deserialize, Serialize};

/// Severity of a buffered log record.
///
/// This is distinct from the tracing levels used by the crate's own
/// diagnostics; `LogLevel` is part of the uploaded protocol and its
/// serialized names are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// A single buffered log line, created at each log call and owned by the
/// batcher until handed off to the upload queue as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 timestamp captured when the record was written.
    pub timestamp: String,
    pub level: LogLevel,
    /// Log text, already truncated to the configured maximum length.
    pub text: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            text: text.into(),
        }
    }
}
