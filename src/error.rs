//! Error types for the channel cache.

use thiserror::Error;

/// Main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: f64, end: f64 },

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Cache directory is locked by another process")]
    Locked,

    #[error("Cache directory not initialized")]
    NotInitialized,

    #[error("Invalid host message: {0}")]
    InvalidMessage(String),

    #[error("Engine is not running")]
    Disconnected,
}

impl CacheError {
    /// True for failures of the persistent store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CacheError::Io(_)
                | CacheError::Storage(_)
                | CacheError::Serialization(_)
                | CacheError::Deserialization(_)
                | CacheError::InvalidFormat(_)
                | CacheError::Corruption(_)
                | CacheError::ChecksumMismatch { .. }
                | CacheError::Locked
                | CacheError::NotInitialized
        )
    }

    /// True for failures reported by the pub/sub transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Transport(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CacheError::Deserialization(e.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
