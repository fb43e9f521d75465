//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌──────────────────┐  ┌───────────────────────┐  │
//! │  │  Configuration  │  │     Remote       │  │     Payload           │  │
//! │  │                 │  │                  │  │                       │  │
//! │  │  InvalidConfig  │  │  Network         │  │  Serialization        │  │
//! │  │  ConfigLoad/    │  │  Offline         │  │  MalformedEntry       │  │
//! │  │  Save           │  │  RemoteStatus    │  │  MissingCategory      │  │
//! │  └─────────────────┘  │  Subscribe…      │  └───────────────────────┘  │
//! │                       └──────────────────┘                             │
//! │  ┌─────────────────┐  ┌──────────────────┐                             │
//! │  │    Storage      │  │    Internal      │                             │
//! │  │  (hkd-store)    │  │  Channel         │                             │
//! │  └─────────────────┘  └──────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Network`/`Offline` are the dominant recovery path, not exceptional:
//! writes fall back to local persistence plus an outbox entry, reads fall
//! back to the last-known local snapshot.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering remote, payload, and engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Remote store unreachable (transport-level failure).
    #[error("Network error: {0}")]
    Network(String),

    /// Remote store is known to be offline; no request was attempted.
    #[error("Remote store is offline")]
    Offline,

    /// Remote store answered with a non-success status.
    #[error("Remote returned status {status} for '{path}'")]
    RemoteStatus { status: u16, path: String },

    /// The remote store has no realtime change feed. The periodic sync
    /// engine remains the correctness path.
    #[error("Realtime subscription not supported by this remote store")]
    SubscribeUnsupported,

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Failed to serialize or deserialize a payload.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// An outbox entry is missing a field required for path resolution.
    #[error("Malformed outbox entry: {0}")]
    MalformedEntry(String),

    /// A product write has no resolvable category path (nested layout).
    /// Fails the single outbox entry, never the whole sync pass.
    #[error("Product {product_id} has no category for nested path resolution")]
    MissingCategory { product_id: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local durable store failure.
    #[error("Local store error: {0}")]
    Storage(#[from] hkd_store::StoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed (component shut down).
    #[error("Channel error: {0}")]
    Channel(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(format!("invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation can succeed on a later attempt.
    ///
    /// Retryable failures keep their outbox entry in `error` state with a
    /// backoff; non-retryable ones go straight to the dead letter.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Offline => true,
            SyncError::RemoteStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
