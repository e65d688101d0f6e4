//! HTTP ingress.
//!
//! One endpoint receives update notifications from the sync controller's
//! webhook. The body is decoded by hand so a malformed payload can be
//! answered with the webhook-friendly `{"status":"Error"}` body instead
//! of a framework rejection. Reconciliation outcomes never surface here;
//! a decoded notification is always accepted with 202.

use crate::handler::ReleaseHandler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use octoargosync_core::model::ApplicationUpdate;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "OK",
            message: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "Error",
            message: Some(message),
        }
    }
}

/// The bridge's web server.
pub struct Server {
    handler: ReleaseHandler,
}

impl Server {
    pub fn new(handler: ReleaseHandler) -> Self {
        Self { handler }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/octopusrelease", post(octopus_release))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .with_state(self.handler.clone())
    }

    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let router = self.router();
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

async fn octopus_release(
    State(handler): State<ReleaseHandler>,
    body: Bytes,
) -> (StatusCode, Json<StatusResponse>) {
    let update: ApplicationUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(cause) => {
            error!(
                event = "octoargosync-init-requestbodyerror",
                %cause,
                "failed to decode the application update body"
            );
            return (StatusCode::OK, Json(StatusResponse::error(cause.to_string())));
        }
    };

    handler.reconcile(update).await;
    (StatusCode::ACCEPTED, Json(StatusResponse::ok()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
