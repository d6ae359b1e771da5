//! Error types for accio-client.

use accio_core::FailureNotice;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// HTTP status of the response that caused this error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Notice shown in place of `what` when loading it failed.
    pub fn notice(&self, what: &str) -> FailureNotice {
        FailureNotice::new(self.status(), FailureNotice::title(what))
    }
}

impl From<&ClientError> for FailureNotice {
    fn from(err: &ClientError) -> Self {
        FailureNotice::new(err.status(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
