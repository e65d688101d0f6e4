//! Live release-server client.
//!
//! Thin typed layer over the release-server REST API. Every read funnels
//! through the shared [`ByteCache`] as raw JSON, every HTTP call is
//! wrapped in the short retry schedule, and the first sighting of an
//! application bypasses the project-list cache once so a freshly-created
//! project is discovered without waiting out the TTL.

use crate::error::OctopusError;
use crate::packages::{merge_selections, override_selections, version_query, PackageVersionQuery};
use crate::{DeployOutcome, OctopusGateway};
use async_trait::async_trait;
use dashmap::DashSet;
use octoargosync_core::cache::ByteCache;
use octoargosync_core::matcher::{application_key, match_project};
use octoargosync_core::model::{
    ApplicationUpdate, Channel, Deployment, DeploymentProcessTemplate, Environment,
    ExpandedProjectBinding, Feed, Lifecycle, OctopusProject, Progression, ProjectBinding, Release,
    ReleaseVersion, SelectedPackage, VariableSet,
};
use octoargosync_core::retry::{retry, Retryable, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-Octopus-ApiKey";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The server pages everything; asking for the lot keeps each listing a
/// single round trip.
const MAX_TAKE: i32 = i32::MAX;
const DEPLOYMENT_TAKE: i32 = 10_000;

const CACHE_KEY_ALL_PROJECTS: &str = "AllProjects";
const CACHE_KEY_ALL_CHANNELS: &str = "AllChannels";

/// Environment ids on the wire carry this prefix; a configured value that
/// already looks like an id skips the name lookup.
const ENVIRONMENT_ID_PREFIX: &str = "Environments-";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PagedResult<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PackageVersionResult {
    version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateReleaseRequest {
    project_id: String,
    channel_id: String,
    version: String,
    selected_packages: Vec<SelectedPackage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateDeploymentRequest {
    release_id: String,
    environment_id: String,
}

/// Release-server gateway backed by the REST API.
pub struct LiveOctopusClient {
    http: reqwest::Client,
    base_url: String,
    space_segment: String,
    cache: ByteCache,
    seen_applications: DashSet<String>,
    policy: RetryPolicy,
}

impl LiveOctopusClient {
    /// Builds a client for `server_url`, authenticating every request with
    /// `api_key`. A `space_id` scopes all paths into that space; `None`
    /// uses the server's default space.
    pub fn new(
        server_url: &Url,
        api_key: &SecretString,
        space_id: Option<&str>,
    ) -> Result<Self, OctopusError> {
        let mut api_key_value = HeaderValue::from_str(api_key.expose_secret()).map_err(|_| {
            OctopusError::config("the API key contains characters that cannot travel in a header")
        })?;
        api_key_value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key_value);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: server_url.as_str().trim_end_matches('/').to_string(),
            space_segment: space_id
                .filter(|space| !space.is_empty())
                .map(|space| format!("/{space}"))
                .unwrap_or_default(),
            cache: ByteCache::new(),
            seen_applications: DashSet::new(),
            policy: RetryPolicy::api(),
        })
    }

    /// Replaces the cache, mainly so tests can shrink the TTL.
    pub fn with_cache(mut self, cache: ByteCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the per-call retry schedule.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}{}", self.base_url, self.space_segment, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, OctopusError> {
        retry(&self.policy, || self.get_json_once(url, params)).await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, OctopusError> {
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OctopusError::api(status, body));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, OctopusError> {
        retry(&self.policy, || self.post_json_once(url, body)).await
    }

    async fn post_json_once<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, OctopusError> {
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OctopusError::api(status, body));
        }
        Ok(response.json().await?)
    }

    /// Read-through cache: a hit that decodes is returned, anything else
    /// refetches and overwrites the entry. Re-serialization failures only
    /// cost the cache write, never the value.
    async fn cached<T, F, Fut>(&self, key: &str, bypass: bool, fetch: F) -> Result<T, OctopusError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, OctopusError>>,
    {
        if !bypass {
            if let Some(bytes) = self.cache.get(key) {
                match serde_json::from_slice(&bytes) {
                    Ok(value) => return Ok(value),
                    Err(cause) => {
                        debug!(key, %cause, "discarding undecodable cache entry");
                    }
                }
            }
        }

        let value = fetch().await?;
        match serde_json::to_vec(&value) {
            Ok(bytes) => self.cache.set(key, bytes),
            Err(cause) => debug!(key, %cause, "value could not be cached"),
        }
        Ok(value)
    }

    async fn all_projects(&self, bypass: bool) -> Result<Vec<OctopusProject>, OctopusError> {
        self.cached(CACHE_KEY_ALL_PROJECTS, bypass, || async {
            let url = self.api_url("/projects");
            let page: PagedResult<OctopusProject> =
                self.get_json(&url, &[("take", MAX_TAKE.to_string())]).await?;
            Ok(page.items)
        })
        .await
    }

    async fn project_variables(&self, project: &OctopusProject) -> Result<VariableSet, OctopusError> {
        let key = format!("{}-Variables", project.id);
        self.cached(&key, false, || async {
            let url = self.api_url(&format!("/variables/variableset-{}", project.id));
            self.get_json(&url, &[]).await
        })
        .await
    }

    async fn all_channels(&self) -> Result<Vec<Channel>, OctopusError> {
        self.cached(CACHE_KEY_ALL_CHANNELS, false, || async {
            let url = self.api_url("/channels");
            let page: PagedResult<Channel> =
                self.get_json(&url, &[("take", MAX_TAKE.to_string())]).await?;
            Ok(page.items)
        })
        .await
    }

    async fn channel_by_name(
        &self,
        project: &OctopusProject,
        name: &str,
    ) -> Result<Channel, OctopusError> {
        let channels: Vec<Channel> = self
            .all_channels()
            .await?
            .into_iter()
            .filter(|channel| channel.name == name && channel.project_id == project.id)
            .collect();
        exactly_one(channels, |found| {
            format!(
                "expected exactly one channel named {name} on project {}, found {found}",
                project.name
            )
        })
    }

    async fn default_channel(&self, project: &OctopusProject) -> Result<Channel, OctopusError> {
        let key = format!("{}-DefaultChannel", project.id);
        self.cached(&key, false, || async {
            let channels: Vec<Channel> = self
                .all_channels()
                .await?
                .into_iter()
                .filter(|channel| channel.is_default && channel.project_id == project.id)
                .collect();
            exactly_one(channels, |found| {
                format!(
                    "expected exactly one default channel on project {}, found {found}",
                    project.name
                )
            })
        })
        .await
    }

    async fn lifecycle(&self, lifecycle_id: &str) -> Result<Lifecycle, OctopusError> {
        self.cached(lifecycle_id, false, || async {
            let url = self.api_url("/lifecycles");
            let page: PagedResult<Lifecycle> = self
                .get_json(
                    &url,
                    &[("ids", lifecycle_id.to_string()), ("take", "1".to_string())],
                )
                .await?;
            exactly_one(page.items, |found| {
                format!("expected exactly one lifecycle with id {lifecycle_id}, found {found}")
            })
        })
        .await
    }

    async fn environment(&self, name: &str) -> Result<Environment, OctopusError> {
        if name.starts_with(ENVIRONMENT_ID_PREFIX) {
            return Ok(Environment {
                id: name.to_string(),
                name: name.to_string(),
            });
        }

        let key = format!("{ENVIRONMENT_ID_PREFIX}{name}");
        self.cached(&key, false, || async {
            let url = self.api_url("/environments");
            let page: PagedResult<Environment> =
                self.get_json(&url, &[("name", name.to_string())]).await?;
            // The server matches names partially; keep exact matches only.
            let environments: Vec<Environment> = page
                .items
                .into_iter()
                .filter(|environment| environment.name == name)
                .collect();
            exactly_one(environments, |found| {
                format!("expected exactly one environment named {name}, found {found}")
            })
        })
        .await
    }

    async fn releases(&self, project: &OctopusProject) -> Result<Vec<Release>, OctopusError> {
        let url = self.api_url(&format!("/projects/{}/releases", project.id));
        let page: PagedResult<Release> =
            self.get_json(&url, &[("take", MAX_TAKE.to_string())]).await?;
        Ok(page.items)
    }

    async fn progression(&self, release: &Release) -> Result<Progression, OctopusError> {
        let url = self.api_url(&format!("/releases/{}/progression", release.id));
        self.get_json(&url, &[]).await
    }

    async fn deployments_of(&self, release: &Release) -> Result<Vec<Deployment>, OctopusError> {
        let url = self.api_url(&format!("/releases/{}/deployments", release.id));
        let page: PagedResult<Deployment> = self
            .get_json(&url, &[("take", DEPLOYMENT_TAKE.to_string())])
            .await?;
        Ok(page.items)
    }

    async fn deployment_process_template(
        &self,
        project: &OctopusProject,
        channel: &Channel,
    ) -> Result<DeploymentProcessTemplate, OctopusError> {
        let url = self.api_url(&format!(
            "/deploymentprocesses/{}/template",
            project.deployment_process_id
        ));
        self.get_json(&url, &[("channel", channel.id.clone())]).await
    }

    async fn feeds(&self, ids: &[String]) -> Result<Vec<Feed>, OctopusError> {
        let url = self.api_url("/feeds");
        let page: PagedResult<Feed> = self
            .get_json(
                &url,
                &[("ids", ids.join(",")), ("take", MAX_TAKE.to_string())],
            )
            .await?;
        Ok(page.items)
    }

    async fn search_package_versions(
        &self,
        feed: &Feed,
        query: &PackageVersionQuery,
    ) -> Result<Vec<PackageVersionResult>, OctopusError> {
        let url = self.api_url(&format!("/feeds/{}/packages/versions", feed.id));
        let mut params = vec![
            ("packageId", query.package_id.clone()),
            ("take", query.take.to_string()),
        ];
        if let Some(tag) = &query.pre_release_tag {
            params.push(("preReleaseTag", tag.clone()));
        }
        if let Some(range) = &query.version_range {
            params.push(("versionRange", range.clone()));
        }
        let page: PagedResult<PackageVersionResult> = self.get_json(&url, &params).await?;
        Ok(page.items)
    }

    /// Baseline version per template package: grouped by feed, constrained
    /// by channel rules, queried take-1 with per-call memoization.
    /// Unresolvable packages keep their slot with an empty version.
    async fn package_baseline(
        &self,
        project: &OctopusProject,
        channel: &Channel,
    ) -> Result<Vec<SelectedPackage>, OctopusError> {
        let template = self.deployment_process_template(project, channel).await?;
        if template.packages.is_empty() {
            return Ok(Vec::new());
        }

        let mut grouped: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, package) in template.packages.iter().enumerate() {
            grouped.entry(package.feed_id.as_str()).or_default().push(index);
        }
        let feed_ids: Vec<String> = grouped
            .keys()
            .filter(|feed_id| {
                grouped[*feed_id]
                    .iter()
                    .any(|index| template.packages[*index].is_resolvable)
            })
            .map(|feed_id| feed_id.to_string())
            .collect();
        let feeds = if feed_ids.is_empty() {
            Vec::new()
        } else {
            self.feeds(&feed_ids).await?
        };
        let feeds_by_id: HashMap<&str, &Feed> =
            feeds.iter().map(|feed| (feed.id.as_str(), feed)).collect();

        let mut memo: HashMap<PackageVersionQuery, String> = HashMap::new();
        let mut selections = Vec::with_capacity(template.packages.len());

        for (feed_id, indexes) in &grouped {
            for index in indexes {
                let package = &template.packages[*index];
                if !package.is_resolvable {
                    selections.push(SelectedPackage {
                        action_name: package.action_name.clone(),
                        package_reference_name: package.package_reference_name.clone(),
                        version: String::new(),
                    });
                    continue;
                }

                let feed = feeds_by_id.get(feed_id).ok_or_else(|| {
                    OctopusError::not_found(format!(
                        "feed {feed_id} referenced by the deployment process of {} was not found",
                        project.name
                    ))
                })?;

                let query = version_query(package, channel);
                let version = match memo.get(&query) {
                    Some(version) => version.clone(),
                    None => {
                        let results = self.search_package_versions(feed, &query).await?;
                        let version = match results.len() {
                            0 => {
                                warn!(
                                    package = %package.package_id,
                                    feed = %feed.name,
                                    "no version found for package, selecting an empty version"
                                );
                                String::new()
                            }
                            1 => results[0].version.clone(),
                            found => {
                                return Err(OctopusError::config(format!(
                                    "version query for package {} returned {found} results, expected at most one",
                                    package.package_id
                                )))
                            }
                        };
                        memo.insert(query.clone(), version.clone());
                        version
                    }
                };

                selections.push(SelectedPackage {
                    action_name: package.action_name.clone(),
                    package_reference_name: package.package_reference_name.clone(),
                    version,
                });
            }
        }

        Ok(selections)
    }

    async fn selected_packages(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
    ) -> Result<Vec<SelectedPackage>, OctopusError> {
        let baseline = self
            .package_baseline(expanded.project(), &expanded.channel)
            .await?;
        let overrides = override_selections(&expanded.binding.package_bindings, &update.images);
        Ok(merge_selections(baseline, &overrides))
    }

    async fn create_release(
        &self,
        expanded: &ExpandedProjectBinding,
        version: &ReleaseVersion,
        selected_packages: Vec<SelectedPackage>,
    ) -> Result<Release, OctopusError> {
        let url = self.api_url("/releases");
        let request = CreateReleaseRequest {
            project_id: expanded.project().id.clone(),
            channel_id: expanded.channel.id.clone(),
            version: version.as_str().to_string(),
            selected_packages,
        };
        self.post_json(&url, &request).await
    }

    async fn create_deployment(
        &self,
        release: &Release,
        environment: &Environment,
    ) -> Result<Deployment, OctopusError> {
        let url = self.api_url("/deployments");
        let request = CreateDeploymentRequest {
            release_id: release.id.clone(),
            environment_id: environment.id.clone(),
        };
        self.post_json(&url, &request).await
    }

    async fn expand(&self, binding: ProjectBinding) -> Result<ExpandedProjectBinding, OctopusError> {
        let environment = self.environment(&binding.environment_name).await?;
        let channel = match &binding.channel_name {
            Some(name) => self.channel_by_name(&binding.project, name).await?,
            None => self.default_channel(&binding.project).await?,
        };
        // A channel without its own lifecycle inherits the project's.
        let lifecycle_id = if channel.lifecycle_id.is_empty() {
            &binding.project.lifecycle_id
        } else {
            &channel.lifecycle_id
        };
        let lifecycle = self.lifecycle(lifecycle_id).await?;
        Ok(ExpandedProjectBinding {
            binding,
            environment,
            channel,
            lifecycle,
        })
    }
}

#[async_trait]
impl OctopusGateway for LiveOctopusClient {
    async fn matching_projects(
        &self,
        update: &ApplicationUpdate,
    ) -> Result<Vec<ExpandedProjectBinding>, OctopusError> {
        let app_key = application_key(&update.namespace, &update.application);
        // First sighting of an application skips the project-list cache
        // once, so a freshly-created project is picked up without waiting
        // out the TTL.
        let bypass = self.seen_applications.insert(app_key.clone());
        if bypass {
            debug!(application = %app_key, "first sighting, bypassing project cache");
        }

        let projects = self.all_projects(bypass).await?;
        let mut expanded = Vec::new();
        for project in &projects {
            let variables = self.project_variables(project).await?;
            let Some(binding) = match_project(project, &variables, &app_key) else {
                continue;
            };
            match self.expand(binding).await {
                Ok(binding) => expanded.push(binding),
                // Unusable project configuration only disqualifies this
                // project; the rest of the fan-out proceeds.
                Err(cause) if !cause.is_retryable() => {
                    error!(
                        project = %project.name,
                        %cause,
                        "skipping project with unusable configuration"
                    );
                }
                Err(cause) => return Err(cause),
            }
        }
        Ok(expanded)
    }

    async fn release_versions(
        &self,
        project: &OctopusProject,
    ) -> Result<Vec<ReleaseVersion>, OctopusError> {
        let releases = self.releases(project).await?;
        Ok(releases
            .into_iter()
            .map(|release| ReleaseVersion(release.version))
            .collect())
    }

    async fn is_deployed(
        &self,
        project: &OctopusProject,
        version: &ReleaseVersion,
        environment: &Environment,
    ) -> Result<bool, OctopusError> {
        let releases = self.releases(project).await?;
        for release in releases
            .iter()
            .filter(|release| release.version == version.as_str())
        {
            let deployments = self.deployments_of(release).await?;
            if deployments
                .iter()
                .any(|deployment| deployment.environment_id == environment.id)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn latest_deployment_release(
        &self,
        project: &OctopusProject,
        environment: &Environment,
    ) -> Result<Option<Release>, OctopusError> {
        let mut releases = self.releases(project).await?;
        releases.sort_by(|a, b| b.assembled.cmp(&a.assembled));
        for release in releases {
            let progression = self.progression(&release).await?;
            if progression
                .environments
                .iter()
                .any(|reached| reached.id == environment.id)
            {
                return Ok(Some(release));
            }
        }
        Ok(None)
    }

    async fn create_and_deploy(
        &self,
        expanded: &ExpandedProjectBinding,
        update: &ApplicationUpdate,
        version: &ReleaseVersion,
    ) -> Result<DeployOutcome, OctopusError> {
        validate_lifecycle(&expanded.lifecycle, &expanded.environment)?;
        let project = expanded.project();

        let existing = self
            .releases(project)
            .await?
            .into_iter()
            .find(|release| release.version == version.as_str());
        let (release, new_release) = match existing {
            Some(release) => {
                info!(
                    project = %project.name,
                    version = %version,
                    "release already exists, reusing it"
                );
                (release, false)
            }
            None => {
                let selected_packages = self.selected_packages(expanded, update).await?;
                let release = self.create_release(expanded, version, selected_packages).await?;
                info!(
                    project = %project.name,
                    version = %version,
                    channel = %expanded.channel.name,
                    "created release"
                );
                (release, true)
            }
        };

        let first_phase = &expanded.lifecycle.phases[0];
        if new_release
            && first_phase
                .automatic_deployment_targets
                .iter()
                .any(|target| target == &expanded.environment.id)
        {
            info!(
                project = %project.name,
                environment = %expanded.environment.name,
                "environment deploys new releases automatically, skipping deployment creation"
            );
            return Ok(DeployOutcome::AutoDeployed { release });
        }

        let deployment = self.create_deployment(&release, &expanded.environment).await?;
        info!(
            project = %project.name,
            version = %version,
            environment = %expanded.environment.name,
            deployment = %deployment.id,
            "created deployment"
        );
        Ok(DeployOutcome::Deployed {
            release,
            deployment,
            reused_release: !new_release,
        })
    }
}

/// The first lifecycle phase must list the target environment in its
/// automatic or optional deployment targets, otherwise no deployment of
/// this project can ever reach the environment.
pub fn validate_lifecycle(
    lifecycle: &Lifecycle,
    environment: &Environment,
) -> Result<(), OctopusError> {
    let Some(first_phase) = lifecycle.phases.first() else {
        return Err(OctopusError::config(format!(
            "lifecycle {} has no phases",
            lifecycle.name
        )));
    };

    let reachable = first_phase
        .automatic_deployment_targets
        .iter()
        .chain(first_phase.optional_deployment_targets.iter())
        .any(|target| target == &environment.id);
    if !reachable {
        return Err(OctopusError::config(format!(
            "the first phase of lifecycle {} does not list environment {} in its automatic or optional deployment targets",
            lifecycle.name, environment.name
        )));
    }
    Ok(())
}

fn exactly_one<T>(
    mut items: Vec<T>,
    describe: impl FnOnce(usize) -> String,
) -> Result<T, OctopusError> {
    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Err(OctopusError::not_found(describe(items.len())))
    }
}
