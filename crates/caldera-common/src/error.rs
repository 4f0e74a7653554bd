//! Error types shared across Caldera crates.

use thiserror::Error;

/// World and chunk errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Chunk serialization failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Chunk deserialization failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Invalid magic bytes or malformed payload
    #[error("Invalid chunk format")]
    InvalidFormat,

    /// Schema version mismatch
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },

    /// Compression or decompression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// IO errors from persistence
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
