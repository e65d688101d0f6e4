//! Mock gateways for handler and ingress tests.

#![allow(dead_code)] // Each test binary uses a subset of the harness

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use octoargosync_argocd::{ArgoError, ImageLookup};
use octoargosync_core::model::{
    ApplicationUpdate, Channel, Deployment, Environment, ExpandedProjectBinding, Lifecycle,
    OctopusProject, Phase, ProjectBinding, Release, ReleaseVersion,
};
use octoargosync_octopus::{DeployOutcome, OctopusError, OctopusGateway};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded `create_and_deploy` call.
#[derive(Debug, Clone)]
pub struct CapturedCreate {
    pub project_id: String,
    pub version: String,
    pub images: Vec<String>,
}

/// Release-server gateway returning canned data and capturing writes.
#[derive(Default)]
pub struct MockGateway {
    bindings: Vec<ExpandedProjectBinding>,
    release_versions: Vec<ReleaseVersion>,
    deployed_versions: Vec<ReleaseVersion>,
    latest_deployment: Option<Release>,
    fail_creates: AtomicBool,
    created: Mutex<Vec<CapturedCreate>>,
    created_count: AtomicU64,
    failed_count: AtomicU64,
}

impl MockGateway {
    pub fn new(bindings: Vec<ExpandedProjectBinding>) -> Self {
        Self {
            bindings,
            ..Self::default()
        }
    }

    pub fn with_release_versions(mut self, versions: &[&str]) -> Self {
        self.release_versions = versions.iter().map(|v| ReleaseVersion::from(*v)).collect();
        self
    }

    pub fn with_deployed_versions(mut self, versions: &[&str]) -> Self {
        self.deployed_versions = versions.iter().map(|v| ReleaseVersion::from(*v)).collect();
        self
    }

    pub fn with_latest_deployment(mut self, release: Release) -> Self {
        self.latest_deployment = Some(release);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> u64 {
        self.created_count.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::SeqCst)
    }

    pub async fn created(&self) -> Vec<CapturedCreate> {
        self.created.lock().await.clone()
    }

    pub async fn wait_for_created(&self, count: u64, timeout: Duration) -> bool {
        wait_until(|| self.created_count() >= count, timeout).await
    }

    pub async fn wait_for_failed(&self, count: u64, timeout: Duration) -> bool {
        wait_until(|| self.failed_count() >= count, timeout).await
    }
}

#[async_trait]
impl OctopusGateway for MockGateway {
    async fn matching_projects(
        &self,
        _update: &ApplicationUpdate,
    ) -> Result<Vec<ExpandedProjectBinding>, OctopusError> {
        Ok(self.bindings.clone())
    }

    async fn release_versions(
        &self,
        _project: &OctopusProject,
    ) -> Result<Vec<ReleaseVersion>, OctopusError> {
        Ok(self.release_versions.clone())
    }

    async fn is_deployed(
        &self,
        _project: &OctopusProject,
        version: &ReleaseVersion,
        _environment: &Environment,
    ) -> Result<bool, OctopusError> {
        Ok(self.deployed_versions.contains(version))
    }

    async fn latest_deployment_release(
        &self,
        _project: &OctopusProject,
        _environment: &Environment,
    ) -> Result<Option<Release>, OctopusError> {
        Ok(self.latest_deployment.clone())
    }

    async fn create_and_deploy(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
        version: &ReleaseVersion,
    ) -> Result<DeployOutcome, OctopusError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            self.failed_count.fetch_add(1, Ordering::SeqCst);
            return Err(OctopusError::api(
                StatusCode::SERVICE_UNAVAILABLE,
                "stubbed outage",
            ));
        }

        self.created.lock().await.push(CapturedCreate {
            project_id: expanded.project().id.clone(),
            version: version.as_str().to_string(),
            images: update.images.clone(),
        });
        self.created_count.fetch_add(1, Ordering::SeqCst);

        let release = Release {
            id: "Releases-900".into(),
            version: version.as_str().to_string(),
            project_id: expanded.project().id.clone(),
            channel_id: expanded.channel.id.clone(),
            assembled: Utc::now(),
        };
        let deployment = Deployment {
            id: "Deployments-900".into(),
            release_id: release.id.clone(),
            environment_id: expanded.environment.id.clone(),
        };
        Ok(DeployOutcome::Deployed {
            release,
            deployment,
            reused_release: false,
        })
    }
}

/// Image lookup returning a fixed list, or failing outright.
pub struct MockImages {
    images: Vec<String>,
    fail: bool,
}

impl MockImages {
    pub fn returning(images: &[&str]) -> Self {
        Self {
            images: images.iter().map(|image| image.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            images: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ImageLookup for MockImages {
    async fn images(&self, _application: &str, _namespace: &str) -> Result<Vec<String>, ArgoError> {
        if self.fail {
            return Err(ArgoError::config("stubbed sync controller outage"));
        }
        Ok(self.images.clone())
    }
}

/// Fully expanded binding into the Development environment.
pub fn binding(project_id: &str) -> ExpandedProjectBinding {
    ExpandedProjectBinding {
        binding: ProjectBinding {
            project: OctopusProject {
                id: project_id.to_string(),
                name: format!("{project_id}-name"),
                lifecycle_id: "Lifecycles-1".into(),
                deployment_process_id: format!("deploymentprocess-{project_id}"),
            },
            environment_name: "Development".into(),
            channel_name: None,
            release_version_image: None,
            package_bindings: Vec::new(),
        },
        environment: Environment {
            id: "Environments-1".into(),
            name: "Development".into(),
        },
        channel: Channel {
            id: "Channels-1".into(),
            name: "Default".into(),
            project_id: project_id.to_string(),
            lifecycle_id: "Lifecycles-1".into(),
            is_default: true,
            rules: Vec::new(),
        },
        lifecycle: Lifecycle {
            id: "Lifecycles-1".into(),
            name: "Default Lifecycle".into(),
            phases: vec![Phase {
                name: "Development".into(),
                automatic_deployment_targets: Vec::new(),
                optional_deployment_targets: vec!["Environments-1".into()],
            }],
        },
    }
}

/// Same binding, with a release-version image configured.
pub fn binding_with_release_image(project_id: &str, image: &str) -> ExpandedProjectBinding {
    let mut expanded = binding(project_id);
    expanded.binding.release_version_image = Some(image.to_string());
    expanded
}

pub fn update(application: &str, namespace: &str, target_revision: &str) -> ApplicationUpdate {
    ApplicationUpdate {
        application: application.to_string(),
        namespace: namespace.to_string(),
        state: "success".into(),
        target_revision: target_revision.to_string(),
        commit_sha: "abcdefghijklmnop".into(),
        ..ApplicationUpdate::default()
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
