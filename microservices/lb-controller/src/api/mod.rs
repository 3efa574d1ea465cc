//! HTTP API: REST surface plus the observer WebSocket

pub mod rest;
pub mod websocket;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use edgelb_core::EdgelbError;

use crate::actors::{ActorDirectory, RegistryHandle};
use crate::workflows::WorkflowLauncher;

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub directory: Arc<ActorDirectory>,
    pub launcher: WorkflowLauncher,
    pub platform_configured: bool,
    pub started_at: Instant,
}

/// JSON error rendering for the REST surface.
pub struct ApiError(pub EdgelbError);

impl From<EdgelbError> for ApiError {
    fn from(err: EdgelbError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        }));
        (status, body).into_response()
    }
}
