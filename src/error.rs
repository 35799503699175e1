//! Error types for layer-freeze

use thiserror::Error;

/// Result type alias for layer-freeze operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for layer-freeze
#[derive(Error, Debug)]
pub enum Error {
    /// Layer is not backed by the SQL provider; fatal, no retry
    #[error("layer provider must be '{expected}', got '{actual}'")]
    ProviderMismatch { expected: String, actual: String },

    /// Requested end of window is beyond available data; recoverable via override
    #[error("{0}")]
    FutureData(String),

    /// Non-2xx response from a remote API
    #[error("remote request failed with status {status}: {body}")]
    RemoteRequest { status: u16, body: String },

    /// A located clause could not be found verbatim for substitution;
    /// indicates a tokenizer/canonicalization bug
    #[error("located clause not present in statement: {0}")]
    ClauseRewriteMismatch(String),

    /// Comparison across mismatched resource kinds
    #[error("integrity error: {0}")]
    Integrity(String),

    /// SQL tokenization errors
    #[error("SQL error: {0}")]
    Sql(String),

    /// Timestamp parsing or normalization errors
    #[error("timestamp error: {0}")]
    Timestamp(String),

    /// Malformed or incomplete catalog resource
    #[error("resource error: {0}")]
    Resource(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP transport errors
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<chrono::ParseError> for Error {
    fn from(e: chrono::ParseError) -> Self {
        Error::Timestamp(e.to_string())
    }
}
