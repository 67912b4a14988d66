//! Error types for ZoneKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ZoneKvError
pub type Result<T> = std::result::Result<T, ZoneKvError>;

/// Unified error type for ZoneKV operations
#[derive(Debug, Error)]
pub enum ZoneKvError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Footer, zone metadata or record bytes failed to decode
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    /// A bounded resource stayed saturated past the configured wait
    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Store is shutting down")]
    ShuttingDown,

    // -------------------------------------------------------------------------
    // Invariant Errors
    // -------------------------------------------------------------------------
    #[error("Write buffer is sealed")]
    BufferSealed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Status error: {0}")]
    Status(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ZoneKvError {
    /// Device failures and on-disk corruption both surface as I/O class errors
    pub fn is_io(&self) -> bool {
        matches!(self, ZoneKvError::Io(_) | ZoneKvError::Corruption(_))
    }

    /// True when the caller may retry later
    pub fn is_busy(&self) -> bool {
        matches!(self, ZoneKvError::Busy(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ZoneKvError::NotFound)
    }
}
