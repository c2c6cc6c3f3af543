//! Error types for VellumDB

use thiserror::Error;

/// Result type alias for VellumDB operations
pub type Result<T> = std::result::Result<T, VellumError>;

/// VellumDB error types
#[derive(Error, Debug)]
pub enum VellumError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate key on a unique index
    #[error("Unique index violation on {index}: key {key}")]
    UniqueViolation { index: String, key: String },

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Query evaluation error
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata lookup for a missing database or collection
    #[error("Not found: {0}")]
    NotFound(String),
}

impl VellumError {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VellumError::Corruption(_) | VellumError::ChecksumMismatch { .. }
        )
    }
}
