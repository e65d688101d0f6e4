use octoargosync_core::retry::Retryable;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the sync-controller API.
#[derive(Debug, Error)]
pub enum ArgoError {
    #[error("sync controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sync controller returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ArgoError {
    pub fn api(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl Retryable for ArgoError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
