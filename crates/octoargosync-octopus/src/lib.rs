//! Release-server gateway.
//!
//! Everything the bridge needs from the release server sits behind
//! [`OctopusGateway`]: discovering the projects bound to an application,
//! inspecting existing releases and deployments, and creating new ones.
//! [`LiveOctopusClient`] implements the trait against the REST API;
//! tests substitute their own implementations.

pub mod client;
pub mod error;
pub mod packages;

pub use client::{validate_lifecycle, LiveOctopusClient};
pub use error::OctopusError;

use async_trait::async_trait;
use octoargosync_core::model::{
    ApplicationUpdate, Deployment, Environment, ExpandedProjectBinding, OctopusProject, Release,
    ReleaseVersion,
};

/// What a successful [`OctopusGateway::create_and_deploy`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    /// The release was new and its lifecycle deploys new releases into the
    /// target environment automatically, so no deployment was created.
    AutoDeployed { release: Release },
    /// A deployment was created for the release.
    Deployed {
        release: Release,
        deployment: Deployment,
        reused_release: bool,
    },
}

impl DeployOutcome {
    pub fn release(&self) -> &Release {
        match self {
            Self::AutoDeployed { release } => release,
            Self::Deployed { release, .. } => release,
        }
    }
}

/// Release-server operations used by the reconciliation flow.
#[async_trait]
pub trait OctopusGateway: Send + Sync {
    /// Projects whose variables bind them to the given application,
    /// expanded with their environment, channel and lifecycle.
    async fn matching_projects(
        &self,
        update: &ApplicationUpdate,
    ) -> Result<Vec<ExpandedProjectBinding>, OctopusError>;

    /// Versions of every release of the project.
    async fn release_versions(
        &self,
        project: &OctopusProject,
    ) -> Result<Vec<ReleaseVersion>, OctopusError>;

    /// Whether a release with this version was ever deployed into the
    /// environment.
    async fn is_deployed(
        &self,
        project: &OctopusProject,
        version: &ReleaseVersion,
        environment: &Environment,
    ) -> Result<bool, OctopusError>;

    /// The most recently assembled release whose progression reached the
    /// environment.
    async fn latest_deployment_release(
        &self,
        project: &OctopusProject,
        environment: &Environment,
    ) -> Result<Option<Release>, OctopusError>;

    /// Creates the release (or reuses an existing one with the same
    /// version) and deploys it into the bound environment.
    async fn create_and_deploy(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
        version: &ReleaseVersion,
    ) -> Result<DeployOutcome, OctopusError>;
}
