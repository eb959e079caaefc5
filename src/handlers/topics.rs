// src/handlers/topics.rs
//! Topic suggestion endpoint

use crate::topics::suggest_topics;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTopicsRequest {
    pub keywords: String,
    pub tone: String,
    pub target_word_count: Option<u32>,
}

/// POST /api/topics/generate - Suggest blog topics for keywords + tone
pub async fn generate_topics(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<GenerateTopicsRequest>,
) -> impl IntoResponse {
    if request.keywords.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "keywords must not be empty" })),
        )
            .into_response();
    }
    if request.tone.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tone must not be empty" })),
        )
            .into_response();
    }

    match suggest_topics(
        state.provider.as_ref(),
        &request.keywords,
        &request.tone,
        request.target_word_count,
        state.generation_timeout,
    )
    .await
    {
        Ok(suggestions) => (StatusCode::OK, Json(json!({ "topics": suggestions }))).into_response(),
        Err(e) => {
            tracing::error!("Topic generation failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Routes for topic suggestions
pub fn topic_routes() -> Router {
    Router::new().route("/api/topics/generate", post(generate_topics))
}
