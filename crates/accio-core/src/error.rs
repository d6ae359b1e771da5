//! Error types for accio-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccioError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Run {run} violates its lifecycle: {reason}")]
    InvalidRunState { run: String, reason: String },

    #[error("Node {node} went backwards from {from} to {to}")]
    NodeRegressed {
        node: String,
        from: String,
        to: String,
    },
}

pub type Result<T> = std::result::Result<T, AccioError>;
