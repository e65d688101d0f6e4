//! Core building blocks for the octoargosync bridge.
//!
//! Everything in this crate is pure logic: the domain model shared by the
//! gateways and the orchestrator, the variable-convention project matcher,
//! version ordering, the TTL'd byte cache, and the retry schedules. No
//! networking happens here.

pub mod cache;
pub mod matcher;
pub mod model;
pub mod retry;
pub mod version;

pub use cache::ByteCache;
pub use matcher::{application_key, match_project};
pub use model::{
    ApplicationUpdate, Channel, Deployment, Environment, ExpandedProjectBinding,
    ImagePackageBinding, Lifecycle, OctopusProject, ProjectBinding, Release, ReleaseVersion,
    SelectedPackage, Variable, VariableSet,
};
pub use retry::{retry, Retryable, RetryPolicy};
