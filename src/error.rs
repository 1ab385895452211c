//! Error taxonomy for a single poll cycle.
//!
//! Every variant is fatal to the cycle that raised it and to nothing else;
//! the poller logs it and moves on to the next interval.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("missing configuration: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream returned {status}: {context}")]
    Http { status: u16, context: String },

    #[error("malformed response body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl CycleError {
    /// Builds an [`CycleError::Http`] from a non-success response status.
    pub fn http(status: reqwest::StatusCode, context: impl Into<String>) -> Self {
        Self::Http {
            status: status.as_u16(),
            context: context.into(),
        }
    }
}
