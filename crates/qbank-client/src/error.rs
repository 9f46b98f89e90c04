//! Error types for question-bank client operations

use thiserror::Error;

use crate::streaming::StreamError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, QbankClientError>;

/// Errors that can occur during client operations
#[derive(Error, Debug)]
pub enum QbankClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server returned a non-2xx response
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The envelope came back with a status other than `success`
    #[error("Request rejected: {0}")]
    Api(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Opening or reading a streaming response failed
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

impl QbankClientError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }
}
