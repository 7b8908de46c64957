//! Error types for the embedding store builder.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for build operations.
pub type Result<T> = std::result::Result<T, EmstoreError>;

/// Errors that can occur while building an embedding store.
#[derive(Error, Debug)]
pub enum EmstoreError {
    /// The header or sample line could not be used to infer a format.
    #[error("unrecognized embedding format: {0}")]
    Format(String),

    /// Vector size inference needs to rewind the source.
    #[error("unable to infer vector size without read loss, specify the vector size")]
    UnseekableSource,

    /// A single data line could not be parsed.
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A vector did not have the configured number of components.
    #[error("vector size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A vector component was NaN or infinite.
    #[error("vector component {index} is not a finite number")]
    NonFiniteComponent { index: usize },

    /// The store could not be opened.
    #[error("failed to open store at {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// A batch commit failed.
    #[error("write failed: {0}")]
    Write(String),

    /// A lookup in the store failed.
    #[error("read failed: {0}")]
    Read(String),

    /// The archive could not be used as an embedding source.
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Zip container error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// TOML configuration could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmstoreError {
    /// Whether the error is confined to a single record and the stream can go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}
