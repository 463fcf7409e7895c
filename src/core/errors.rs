// src/core/errors.rs

use std::time::Duration;
use thiserror::Error;

/// Error type shared by the validator, the analyzers, the orchestrator and the
/// persistence layer.
///
/// Analyzer-level variants (`Http`, `Dns`, `Tls`, `Timeout`) never escape a scan:
/// the orchestrator turns them into an empty finding list plus a diagnostic.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("DNS query for {name} ({record_type}) failed: {reason}")]
    Dns {
        name: String,
        record_type: String,
        reason: String,
    },

    #[error("TLS inspection of {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scan deadline exceeded")]
    DeadlineExceeded,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn http(url: impl ToString, source: reqwest::Error) -> Self {
        ScanError::Http { url: url.to_string(), source }
    }

    pub fn dns(name: &str, record_type: &str, reason: impl ToString) -> Self {
        ScanError::Dns {
            name: name.to_string(),
            record_type: record_type.to_string(),
            reason: reason.to_string(),
        }
    }
}
