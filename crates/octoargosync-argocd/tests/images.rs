//! Exercises [`ArgoClient`] against a stub sync-controller API.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use octoargosync_argocd::{ArgoClient, ArgoError, ImageLookup};
use octoargosync_core::retry::RetryPolicy;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct ArgoStub {
    fail: bool,
    requests: Mutex<Vec<(String, String, String)>>,
}

async fn resource_tree(
    State(stub): State<Arc<ArgoStub>>,
    Path(application): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let namespace = params.get("appNamespace").cloned().unwrap_or_default();
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    stub.requests
        .lock()
        .await
        .push((application, namespace, authorization));

    if stub.fail {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "nodes": [
            { "kind": "Deployment", "images": ["registry/web:1.2.3"] },
            { "kind": "ReplicaSet", "images": ["registry/web:1.2.3", "registry/sidecar:0.9"] },
            { "kind": "Service" }
        ]
    })))
}

async fn start(stub: Arc<ArgoStub>) -> ArgoClient {
    let router = Router::new()
        .route("/api/v1/applications/:name/resource-tree", get(resource_tree))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    ArgoClient::new(
        &format!("http://{addr}"),
        &SecretString::from("argo-token".to_string()),
        true,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::fixed(1, Duration::ZERO))
}

#[tokio::test]
async fn collects_images_across_the_resource_tree() {
    let stub = Arc::new(ArgoStub::default());
    let client = start(stub.clone()).await;

    let images = client.images("web", "default").await.unwrap();

    assert_eq!(
        images,
        vec!["registry/web:1.2.3".to_string(), "registry/sidecar:0.9".to_string()]
    );
    let requests = stub.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let (application, namespace, authorization) = &requests[0];
    assert_eq!(application, "web");
    assert_eq!(namespace, "default");
    assert_eq!(authorization, "Bearer argo-token");
}

#[tokio::test]
async fn server_errors_surface_as_api_errors() {
    let stub = Arc::new(ArgoStub {
        fail: true,
        ..ArgoStub::default()
    });
    let client = start(stub).await;

    let result = client.images("web", "default").await;

    assert!(matches!(result, Err(ArgoError::Api { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR));
}
