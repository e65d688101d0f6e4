//! Live sync-controller client.

use crate::error::ArgoError;
use crate::ImageLookup;
use async_trait::async_trait;
use octoargosync_core::retry::{retry, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResourceTree {
    nodes: Vec<ResourceNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResourceNode {
    images: Vec<String>,
}

/// Images of every node in the tree, first sighting wins, order kept.
fn collect_images(tree: ResourceTree) -> Vec<String> {
    let mut images = Vec::new();
    for node in tree.nodes {
        for image in node.images {
            if !images.contains(&image) {
                images.push(image);
            }
        }
    }
    images
}

/// Sync-controller gateway backed by the REST API.
pub struct ArgoClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl ArgoClient {
    /// Builds a client for `server`, a URL or a bare `host:port` which
    /// defaults to https. The controller usually sits behind its own
    /// self-signed certificate, hence the `insecure` switch.
    pub fn new(server: &str, token: &SecretString, insecure: bool) -> Result<Self, ArgoError> {
        let server = server.trim().trim_end_matches('/');
        if server.is_empty() {
            return Err(ArgoError::config("the sync controller address is empty"));
        }
        let base_url = if server.contains("://") {
            server.to_string()
        } else {
            format!("https://{server}")
        };

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| {
                ArgoError::config("the token contains characters that cannot travel in a header")
            })?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            http,
            base_url,
            policy: RetryPolicy::api(),
        })
    }

    /// Replaces the per-call retry schedule.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn resource_tree(
        &self,
        application: &str,
        namespace: &str,
    ) -> Result<ResourceTree, ArgoError> {
        retry(&self.policy, || {
            self.resource_tree_once(application, namespace)
        })
        .await
    }

    async fn resource_tree_once(
        &self,
        application: &str,
        namespace: &str,
    ) -> Result<ResourceTree, ArgoError> {
        let url = format!(
            "{}/api/v1/applications/{application}/resource-tree",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .query(&[("appNamespace", namespace)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArgoError::api(status, body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ImageLookup for ArgoClient {
    async fn images(&self, application: &str, namespace: &str) -> Result<Vec<String>, ArgoError> {
        let tree = self.resource_tree(application, namespace).await?;
        let images = collect_images(tree);
        debug!(
            application,
            namespace,
            count = images.len(),
            "collected running images"
        );
        Ok(images)
    }
}
