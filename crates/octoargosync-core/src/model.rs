//! Shared domain model.
//!
//! The release-server resource types mirror the Octopus REST wire shapes
//! (PascalCase fields), because the gateway caches them as raw JSON and the
//! same structs travel through the orchestrator. Unknown fields are ignored
//! and missing fields default, matching how lenient the upstream payloads
//! are in practice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification posted by the sync controller when an application reaches a
/// new state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApplicationUpdate {
    pub application: String,
    pub namespace: String,
    pub state: String,
    pub target_url: String,
    pub target_revision: String,
    pub commit_sha: String,
    /// Container images currently running for the application. May arrive
    /// empty and be filled from the sync controller during reconciliation.
    pub images: Vec<String>,
    pub project: String,
}

/// A release-server project, trimmed to the fields the bridge acts on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OctopusProject {
    pub id: String,
    pub name: String,
    pub lifecycle_id: String,
    pub deployment_process_id: String,
}

/// A release channel. `lifecycle_id` may be empty, meaning the channel
/// inherits the project's lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub lifecycle_id: String,
    pub is_default: bool,
    pub rules: Vec<ChannelRule>,
}

/// Version rule attached to a channel; constrains which package versions a
/// release on that channel may select.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChannelRule {
    pub tag: String,
    pub version_range: String,
    pub action_packages: Vec<ActionPackage>,
}

/// Identifies one deployment-action package a channel rule governs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ActionPackage {
    pub deployment_action: String,
    pub package_reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Lifecycle {
    pub id: String,
    pub name: String,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Phase {
    pub name: String,
    pub automatic_deployment_targets: Vec<String>,
    pub optional_deployment_targets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Environment {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Release {
    pub id: String,
    pub version: String,
    pub project_id: String,
    pub channel_id: String,
    /// Server-side assembly time; drives the deployment supersession check.
    pub assembled: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Deployment {
    pub id: String,
    pub release_id: String,
    pub environment_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VariableSet {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// The environments a release has progressed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Progression {
    pub environments: Vec<Environment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Feed {
    pub id: String,
    pub name: String,
}

/// One package slot of a deployment-process template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReleaseTemplatePackage {
    pub action_name: String,
    pub package_reference_name: String,
    pub package_id: String,
    pub feed_id: String,
    pub is_resolvable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploymentProcessTemplate {
    pub packages: Vec<ReleaseTemplatePackage>,
}

/// Package version pinned onto a release at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SelectedPackage {
    pub action_name: String,
    pub package_reference_name: String,
    pub version: String,
}

/// Ties a container image repository to a deployment-action package whose
/// version should follow that image's tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePackageBinding {
    pub image: String,
    pub package_reference: String,
}

/// A project subscribed to an application, as declared through the variable
/// naming convention. `environment_name` is always non-empty; the matcher
/// refuses to produce a binding without it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBinding {
    pub project: OctopusProject,
    pub environment_name: String,
    pub channel_name: Option<String>,
    pub release_version_image: Option<String>,
    pub package_bindings: Vec<ImagePackageBinding>,
}

/// A binding with its environment, channel, and lifecycle resolved against
/// the release server.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedProjectBinding {
    pub binding: ProjectBinding,
    pub environment: Environment,
    pub channel: Channel,
    pub lifecycle: Lifecycle,
}

impl ExpandedProjectBinding {
    pub fn project(&self) -> &OctopusProject {
        &self.binding.project
    }
}

/// A release version string selected by a versioner strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseVersion(pub String);

impl ReleaseVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ReleaseVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ReleaseVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Splits a container image reference into `(repository, tag)`.
///
/// The split happens at the last `:` so registry ports stay with the
/// repository; a reference without a tag yields `None`.
pub fn split_image(image: &str) -> Option<(&str, &str)> {
    let (repository, tag) = image.rsplit_once(':')?;
    if tag.contains('/') {
        // The colon belonged to a registry port, not a tag.
        return None;
    }
    Some((repository, tag))
}
