//! Release version selection strategies.
//!
//! Both strategies derive a candidate the same way: a semver-shaped
//! target revision wins, then the highest tag of the configured
//! release-version image, then a wall-clock timestamp. They differ in
//! how redeployments are treated: [`RedeploymentVersioner`] happily
//! reissues an existing version so the release is redeployed, while
//! [`UniqueVersioner`] appends `+deployment<n>` build metadata until the
//! version is unused.

use async_trait::async_trait;
use chrono::Utc;
use octoargosync_core::model::{split_image, ApplicationUpdate, ExpandedProjectBinding, ReleaseVersion};
use octoargosync_core::version::{compact_timestamp, dotted_timestamp, parse_relaxed, sort_tags_descending};
use octoargosync_octopus::{OctopusError, OctopusGateway};
use std::sync::Arc;

/// Strategy computing the version for the next release of a project.
#[async_trait]
pub trait ReleaseVersioner: Send + Sync {
    async fn generate(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
    ) -> Result<ReleaseVersion, OctopusError>;
}

/// Candidate from the notification alone: the target revision when it is
/// semver-shaped, otherwise the highest matching image tag.
fn base_candidate(
    expanded: &ExpandedProjectBinding,
    update: &ApplicationUpdate,
) -> Option<ReleaseVersion> {
    if parse_relaxed(&update.target_revision).is_some() {
        return Some(ReleaseVersion::from(update.target_revision.clone()));
    }

    let image = expanded.binding.release_version_image.as_deref()?;
    let mut tags: Vec<String> = update
        .images
        .iter()
        .filter_map(|candidate| split_image(candidate))
        .filter(|(repo, _)| *repo == image)
        .map(|(_, tag)| tag.to_string())
        .collect();
    sort_tags_descending(&mut tags);
    tags.into_iter().next().map(ReleaseVersion::from)
}

/// Reissues the same version for the same revision, so a sync-controller
/// redeployment becomes a release-server redeployment.
#[derive(Debug, Default)]
pub struct RedeploymentVersioner;

#[async_trait]
impl ReleaseVersioner for RedeploymentVersioner {
    async fn generate(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
    ) -> Result<ReleaseVersion, OctopusError> {
        Ok(base_candidate(expanded, update)
            .unwrap_or_else(|| ReleaseVersion::from(dotted_timestamp(Utc::now()))))
    }
}

/// Seeks a version no release carries yet, treating every notification
/// as a distinct release.
pub struct UniqueVersioner {
    octo: Arc<dyn OctopusGateway>,
}

impl UniqueVersioner {
    pub fn new(octo: Arc<dyn OctopusGateway>) -> Self {
        Self { octo }
    }
}

#[async_trait]
impl ReleaseVersioner for UniqueVersioner {
    async fn generate(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
    ) -> Result<ReleaseVersion, OctopusError> {
        let Some(candidate) = base_candidate(expanded, update) else {
            return Ok(ReleaseVersion::from(dotted_timestamp(Utc::now())));
        };

        let project = expanded.project();
        if !self
            .octo
            .is_deployed(project, &candidate, &expanded.environment)
            .await?
        {
            return Ok(candidate);
        }

        let taken = self.octo.release_versions(project).await?;
        for count in 2..1000 {
            let probe = ReleaseVersion::from(format!("{candidate}+deployment{count}"));
            if !taken.contains(&probe) {
                return Ok(probe);
            }
        }

        Ok(ReleaseVersion::from(compact_timestamp(Utc::now())))
    }
}
