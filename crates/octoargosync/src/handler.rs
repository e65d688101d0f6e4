//! Reconciliation orchestrator.
//!
//! One inbound update fans out into one asynchronous attempt per bound
//! project. Each attempt runs the long retry schedule and checks twice
//! whether it has been superseded: against the in-process registry of
//! attempt timestamps, and against the assembled-at time of the latest
//! release the server already deployed to the environment. Supersession
//! exits the attempt as a success with no action.
//!
//! Reconciliation never reports failure to the caller; everything after
//! the notification is accepted is log-only.

use crate::versioner::ReleaseVersioner;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use octoargosync_argocd::ImageLookup;
use octoargosync_core::matcher::{application_key, required_variable_name};
use octoargosync_core::model::{ApplicationUpdate, ExpandedProjectBinding};
use octoargosync_core::retry::{retry, RetryPolicy};
use octoargosync_octopus::{DeployOutcome, OctopusError, OctopusGateway};
use std::sync::Arc;
use tracing::{debug, error, info};

enum AttemptOutcome {
    Superseded,
    Completed(DeployOutcome),
}

/// Drives reconciliation of inbound application updates.
#[derive(Clone)]
pub struct ReleaseHandler {
    octo: Arc<dyn OctopusGateway>,
    argo: Arc<dyn ImageLookup>,
    versioner: Arc<dyn ReleaseVersioner>,
    pending: Arc<DashMap<String, DateTime<Utc>>>,
    policy: RetryPolicy,
}

impl ReleaseHandler {
    pub fn new(
        octo: Arc<dyn OctopusGateway>,
        argo: Arc<dyn ImageLookup>,
        versioner: Arc<dyn ReleaseVersioner>,
    ) -> Self {
        Self {
            octo,
            argo,
            versioner,
            pending: Arc::new(DashMap::new()),
            policy: RetryPolicy::reconcile(),
        }
    }

    /// Replaces the long retry schedule.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Accepts one update: enriches it with running images, finds the
    /// bound projects and launches one release attempt per project.
    /// Returns once the attempts are dispatched.
    pub async fn reconcile(&self, mut update: ApplicationUpdate) {
        match self.argo.images(&update.application, &update.namespace).await {
            Ok(images) => update.images = images,
            Err(cause) => {
                update.images = Vec::new();
                error!(
                    event = "octoargosync-init-argoappimages",
                    %cause,
                    "failed to get the list of images from the sync controller; verify the \
                     ARGOCD_SERVER and ARGOCD_TOKEN environment variables are valid, the \
                     release version will not use any image version"
                );
            }
        }

        info!(
            application = %update.application,
            namespace = %update.namespace,
            commit = %update.commit_sha,
            revision = %update.target_revision,
            images = ?update.images,
            "received application update"
        );

        let expanded = match self.octo.matching_projects(&update).await {
            Ok(expanded) => expanded,
            Err(cause) => {
                error!(
                    event = "octoargosync-init-octocreatereleaseerror",
                    application = %update.application,
                    namespace = %update.namespace,
                    %cause,
                    "failed to find the projects configured for the application"
                );
                return;
            }
        };

        if expanded.is_empty() {
            let app_key = application_key(&update.namespace, &update.application);
            info!(application = %app_key, "no projects are configured for the application");
            info!(
                "to create releases for this application, add the {} variable to a project \
                 with a value matching the environment name, like \"Development\"",
                required_variable_name(&app_key)
            );
            return;
        }

        let update = Arc::new(update);
        for binding in expanded {
            let attempted_at = Utc::now();
            self.record_attempt(&binding.project().id, attempted_at);

            let handler = self.clone();
            let update = Arc::clone(&update);
            tokio::spawn(async move {
                handler.run_attempt(binding, update, attempted_at).await;
            });
        }
    }

    async fn run_attempt(
        &self,
        binding: ExpandedProjectBinding,
        update: Arc<ApplicationUpdate>,
        attempted_at: DateTime<Utc>,
    ) {
        let project = binding.project().name.clone();
        let result = retry(&self.policy, || {
            self.attempt(&binding, &update, attempted_at)
        })
        .await;

        match result {
            Ok(AttemptOutcome::Superseded) => {
                info!(project = %project, "attempt superseded by a newer notification, nothing to do");
            }
            Ok(AttemptOutcome::Completed(outcome)) => {
                debug!(
                    project = %project,
                    version = %outcome.release().version,
                    "attempt completed"
                );
            }
            Err(cause) => {
                error!(
                    event = "octoargosync-release-failed",
                    project = %project,
                    %cause,
                    "failed to create a release"
                );
            }
        }
    }

    async fn attempt(
        &self,
        binding: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
        attempted_at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, OctopusError> {
        let project = binding.project();
        if self.newer_attempt_exists(&project.id, attempted_at) {
            return Ok(AttemptOutcome::Superseded);
        }

        // Another replica may have handled a newer notification already;
        // a release assembled after this attempt was scheduled means ours
        // is stale.
        if let Some(latest) = self
            .octo
            .latest_deployment_release(project, &binding.environment)
            .await?
        {
            if latest.assembled > attempted_at {
                return Ok(AttemptOutcome::Superseded);
            }
        }

        let version = self.versioner.generate(binding, update).await?;
        let outcome = self.octo.create_and_deploy(binding, update, &version).await?;
        Ok(AttemptOutcome::Completed(outcome))
    }

    fn record_attempt(&self, project_id: &str, attempted_at: DateTime<Utc>) {
        // Timestamps only move forward, so a stale write can never make
        // a newer attempt look superseded.
        self.pending
            .entry(project_id.to_string())
            .and_modify(|existing| {
                if attempted_at > *existing {
                    *existing = attempted_at;
                }
            })
            .or_insert(attempted_at);
    }

    fn newer_attempt_exists(&self, project_id: &str, attempted_at: DateTime<Utc>) -> bool {
        self.pending
            .get(project_id)
            .map(|entry| *entry.value() > attempted_at)
            .unwrap_or(false)
    }
}
