//! Sync-controller gateway.
//!
//! The bridge only needs one thing from the sync controller: the set of
//! container images an application is currently running, used to enrich
//! update notifications that arrive without image information.
//! [`ArgoClient`] implements [`ImageLookup`] against the REST API.

pub mod client;
pub mod error;

pub use client::ArgoClient;
pub use error::ArgoError;

use async_trait::async_trait;

/// Looks up the images a deployed application is running.
#[async_trait]
pub trait ImageLookup: Send + Sync {
    async fn images(&self, application: &str, namespace: &str) -> Result<Vec<String>, ArgoError>;
}
