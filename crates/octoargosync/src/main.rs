use anyhow::{Context, Result};
use octoargosync::config::{AppEnv, Config};
use octoargosync::handler::ReleaseHandler;
use octoargosync::server::Server;
use octoargosync::telemetry;
use octoargosync::versioner::RedeploymentVersioner;
use octoargosync_argocd::ArgoClient;
use octoargosync_octopus::LiveOctopusClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(AppEnv::from_env());

    let config = Config::from_env()?;

    let octo = LiveOctopusClient::new(
        &config.octopus_server,
        &config.octopus_api_key,
        config.octopus_space_id.as_deref(),
    )
    .context(
        "octoargosync-init-octoclienterror - failed to create the release server client; check \
         that the OCTOPUS_SERVER, OCTOPUS_API_KEY, and OCTOPUS_SPACE_ID environment variables \
         are valid",
    )?;
    let argo = ArgoClient::new(&config.argocd_server, &config.argocd_token, config.argocd_insecure)?;

    let handler = ReleaseHandler::new(
        Arc::new(octo),
        Arc::new(argo),
        Arc::new(RedeploymentVersioner),
    );
    let server = Server::new(handler);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tokio::select! {
        result = server.run(addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    }
}
