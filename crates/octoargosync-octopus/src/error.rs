//! Error type for release-server operations.

use octoargosync_core::retry::Retryable;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the release-server gateway.
///
/// The default stance is retryable: outages, non-success statuses, and
/// mangled payloads all deserve another attempt. Only
/// configuration-shaped failures ([`OctopusError::NotFound`],
/// [`OctopusError::Config`]) are terminal, because no amount of retrying
/// fixes a project that points at a channel or environment that does not
/// exist.
#[derive(Debug, Error)]
pub enum OctopusError {
    /// Transport-level failure reaching the release server.
    #[error("release server request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The release server answered with a non-success status.
    #[error("release server returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// A response (or cached) payload failed to decode.
    #[error("failed to decode release server payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A lookup that must resolve to exactly one resource did not.
    #[error("{0}")]
    NotFound(String),

    /// Project configuration that can never produce a deployment.
    #[error("configuration error: {0}")]
    Config(String),
}

impl OctopusError {
    pub fn api(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl Retryable for OctopusError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::Config(_))
    }
}
