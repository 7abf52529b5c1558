//! HTTP execution service over a session registry.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use codecell_session::{SessionError, SessionRegistry};
use tower_http::trace::TraceLayer;

use crate::protocol::{
    EXECUTE_PATH, ErrorResponse, ExecuteRequest, ExecuteResponse, SHUTDOWN_PATH, ShutdownRequest,
    ShutdownResponse,
};

/// Handler state.
#[derive(Clone)]
pub struct ServiceState {
    pub registry: Arc<SessionRegistry>,
}

/// Build the service router.
///
/// Mount it under any prefix; clients point their base URL at that prefix.
pub fn create_router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route(EXECUTE_PATH, post(execute_handler))
        .route(SHUTDOWN_PATH, post(shutdown_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ServiceState { registry })
}

/// Error surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] SessionError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_construction() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn execute_handler(
    State(state): State<ServiceState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let handle = state.registry.resolve_or_create(&req.convid).await?;
    let outcome = handle.execute(&req.code).await.inspect_err(|e| {
        tracing::error!(conversation_id = %req.convid, "Execution failed: {e}");
    })?;
    Ok(Json(ExecuteResponse {
        result: outcome.into_raw_text(),
        new_kernel_created: handle.is_fresh(),
    }))
}

async fn shutdown_handler(
    State(state): State<ServiceState>,
    Json(req): Json<ShutdownRequest>,
) -> Result<Json<ShutdownResponse>, ApiError> {
    let shutdown = state.registry.shutdown(&req.convid).await?;
    tracing::info!(conversation_id = %req.convid, shutdown, "Shutdown requested");
    Ok(Json(ShutdownResponse { shutdown }))
}
