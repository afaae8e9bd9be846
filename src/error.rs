//! Error types for scrollkv
//!
//! Provides a unified error type for all operations.
//!
//! Host allocation failure is not represented here: the arena routes it to
//! `std::alloc::handle_alloc_error`, which aborts.

use thiserror::Error;

/// Result type alias using ScrollError
pub type Result<T> = std::result::Result<T, ScrollError>;

/// Unified error type for scrollkv operations
#[derive(Debug, Error)]
pub enum ScrollError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Append, flush or sync on a log sink failed. The write is not durable.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    /// Damaged log records, batches or internal keys found while reading.
    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScrollError {
    /// Shorthand for building a `Corruption` error
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        ScrollError::Corruption(msg.into())
    }

    /// Returns true for errors that indicate damaged data
    pub fn is_corruption(&self) -> bool {
        matches!(self, ScrollError::Corruption(_))
    }
}
