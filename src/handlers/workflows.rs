// src/handlers/workflows.rs
//! Workflow endpoints - create, inspect, advance, and gate decisions

use crate::errors::OrchestratorError;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateWorkflowRequest {
    pub topic: String,
    pub tone: Option<String>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub feedback: String,
}

#[derive(Deserialize)]
pub struct ReviseRequest {
    pub instructions: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/workflows - Create a workflow and start it in Idle
pub async fn create_workflow(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateWorkflowRequest>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .create(request.topic, request.tone)
        .await
    {
        Ok(id) => match state.orchestrator.get(id).await {
            Ok(workflow) => (StatusCode::CREATED, Json(workflow)).into_response(),
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

/// GET /api/workflows - List all workflows, newest first
pub async fn list_workflows(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match state.orchestrator.list().await {
        Ok(workflows) => (StatusCode::OK, Json(workflows)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/workflows/:id - Fetch one workflow
pub async fn get_workflow(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.orchestrator.get(id).await {
        Ok(workflow) => (StatusCode::OK, Json(workflow)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/workflows/:id/advance - Run one pipeline stage
pub async fn advance_workflow(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.orchestrator.advance(id).await {
        Ok(_) => workflow_snapshot(&state, id).await,
        Err(e) => error_response(e),
    }
}

/// POST /api/workflows/:id/approve-outline - Approve the outline, resume drafting
pub async fn approve_outline(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ApproveRequest>,
) -> impl IntoResponse {
    match state.orchestrator.approve(id, request.notes).await {
        Ok(true) => workflow_snapshot(&state, id).await,
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Workflow is not awaiting outline approval" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/workflows/:id/reject-outline - Reject the outline with feedback
pub async fn reject_outline(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RejectRequest>,
) -> impl IntoResponse {
    match state.orchestrator.reject(id, request.feedback).await {
        Ok(true) => workflow_snapshot(&state, id).await,
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Workflow is not awaiting outline approval" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/workflows/:id/revise - Request a content revision
pub async fn revise_workflow(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ReviseRequest>,
) -> impl IntoResponse {
    match state.orchestrator.revise(id, request.instructions).await {
        Ok(_) => workflow_snapshot(&state, id).await,
        Err(e) => error_response(e),
    }
}

/// POST /api/workflows/:id/chat - Chat about this workflow
pub async fn chat_workflow(
    Path(id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    match state.orchestrator.chat(id, request.message).await {
        Ok(reply) => (StatusCode::OK, Json(json!({ "reply": reply }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn workflow_snapshot(state: &AppState, id: Uuid) -> Response {
    match state.orchestrator.get(id).await {
        Ok(workflow) => (StatusCode::OK, Json(workflow)).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: OrchestratorError) -> Response {
    let status = match &e {
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Validation { .. } | OrchestratorError::InvalidTransition { .. } => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::MissingStageInput { .. } => StatusCode::CONFLICT,
        OrchestratorError::Generation { .. } | OrchestratorError::ChatFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        OrchestratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Workflow request failed: {}", e);
    } else {
        tracing::warn!("Workflow request rejected: {}", e);
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// Routes for workflow management
pub fn workflow_routes() -> Router {
    Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/:id", get(get_workflow))
        .route("/api/workflows/:id/advance", post(advance_workflow))
        .route("/api/workflows/:id/approve-outline", post(approve_outline))
        .route("/api/workflows/:id/reject-outline", post(reject_outline))
        .route("/api/workflows/:id/revise", post(revise_workflow))
        .route("/api/workflows/:id/chat", post(chat_workflow))
}
