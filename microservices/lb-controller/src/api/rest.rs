//! REST handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use edgelb_core::{EdgelbError, LoadBalancerConfig, LoadBalancerListing, WorkflowStatusEvent};

use super::{websocket, ApiError, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/loadbalancers",
            post(register_load_balancer).get(list_load_balancers),
        )
        .route(
            "/loadbalancers/{name}",
            get(get_load_balancer).delete(delete_load_balancer),
        )
        .route("/loadbalancers/{name}/deploy", post(deploy_load_balancer))
        .route("/workflows/{id}", get(workflow_status))
        .route("/observe", get(websocket::observe_handler))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "lb-controller",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ready": true,
        "dependencies": [
            { "name": "durable-store", "available": true },
            { "name": "edge-platform-credentials", "available": state.platform_configured },
        ],
    }))
}

/// Register or replace a load balancer: upsert in the registry, then push
/// the same config into its actor (which prunes health and arms the timer).
async fn register_load_balancer(
    State(state): State<AppState>,
    Json(config): Json<LoadBalancerConfig>,
) -> Result<Json<LoadBalancerConfig>, ApiError> {
    state.registry.register(config.clone()).await?;
    state.directory.get(&config.name).set_config(config.clone()).await?;
    Ok(Json(config))
}

async fn list_load_balancers(
    State(state): State<AppState>,
) -> Result<Json<Vec<LoadBalancerListing>>, ApiError> {
    Ok(Json(state.registry.list().await?))
}

async fn get_load_balancer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<LoadBalancerListing>, ApiError> {
    let listing = state
        .registry
        .get(&name)
        .await?
        .ok_or_else(|| EdgelbError::NotFound(format!("load balancer '{}' is not registered", name)))?;
    Ok(Json(listing))
}

async fn delete_load_balancer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deploy_load_balancer(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let workflow_id = state.launcher.spawn_deploy(&name).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "workflowId": workflow_id })),
    ))
}

async fn workflow_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatusEvent>, ApiError> {
    let status = state
        .launcher
        .status(&id)
        .ok_or_else(|| EdgelbError::NotFound(format!("workflow '{}' is unknown", id)))?;
    Ok(Json(status))
}
