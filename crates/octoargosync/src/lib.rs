//! Bridges a GitOps sync controller into a release-orchestration server.
//!
//! The sync controller notifies this service whenever an application
//! changes; the service finds the release-server projects bound to that
//! application through a project-variable naming convention, picks a
//! release version, resolves package versions, and creates the release
//! and deployment. The whole pipeline is stateless: everything is
//! re-derived from the two servers on every notification.

pub mod config;
pub mod handler;
pub mod server;
pub mod telemetry;
pub mod versioner;

pub use config::{AppEnv, Config};
pub use handler::ReleaseHandler;
pub use server::Server;
