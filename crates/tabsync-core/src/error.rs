//! Centralized error types for tabsync.

use thiserror::Error;

/// Main error type for tabsync operations.
///
/// Only construction and configuration loading return these. Steady-state
/// failures (dropped connections, bad payloads, broken storage) are turned
/// into state transitions or log lines instead.
#[derive(Error, Debug)]
pub enum TabSyncError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing identity: {0}")]
    MissingIdentity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for tabsync operations.
pub type TabSyncResult<T> = Result<T, TabSyncError>;

impl TabSyncError {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a missing identity error.
    pub fn missing_identity(msg: impl Into<String>) -> Self {
        Self::MissingIdentity(msg.into())
    }
}

/// Failures of the shared, cross-tab key/value store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable")]
    Unavailable,

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by a push transport factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not supported in this environment")]
    Unsupported,

    #[error("Connection failed: {0}")]
    Connect(String),
}

/// Failures of the same-browser pub/sub channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Channel backend error: {0}")]
    Backend(String),
}

/// Reasons an incoming issue event payload is discarded.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Malformed event payload: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Event payload has no issue id")]
    MissingIssueId,
}
