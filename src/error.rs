//! Error types for resty

use thiserror::Error;

/// Result type alias for resty operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in resty operations
///
/// Transport failures never appear here; they are folded into
/// [`RestResponse`](crate::RestResponse) values with a server-error status.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Value not representable: {0}")]
    Encoding(String),

    #[error("Payload could not be decoded: {0}")]
    Decoding(String),

    #[error("Unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),
}
