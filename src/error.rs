//! Error types for tiermap

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by maps, tiers and adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Key absent from the tier that was queried
    #[error("Key not found: {map}:{key}")]
    NotFound { map: String, key: String },

    /// Bad argument, rejected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal in the current state of the map
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A stored or supplied value has the wrong shape for the operation
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Value exceeds the durable tier's item size bound
    #[error("Value of {size} bytes exceeds the limit of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    // =========================================================================
    // Tier Errors
    // =========================================================================
    /// Durable store cannot be reached or the table is missing
    #[error("Durable store unavailable: {0}")]
    DurableUnavailable(String),

    /// Volatile cache backend failure (never escapes the cache tier)
    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    /// Stampede wait loop hit its safety cap
    #[error("Gave up waiting for {key} after {attempts} stampede waits")]
    StampedeRetriesExhausted { key: String, attempts: u32 },

    // =========================================================================
    // Encoding / IO
    // =========================================================================
    /// Key could not be canonicalised or decoded
    #[error("Key encoding error: {0}")]
    Encoding(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a `NotFound` for a map/key pair.
    pub fn not_found(map: impl Into<String>, key: impl Into<String>) -> Self {
        Error::NotFound {
            map: map.into(),
            key: key.into(),
        }
    }

    /// True for the expected, non-exceptional absence case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
