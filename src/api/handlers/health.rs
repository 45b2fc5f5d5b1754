use crate::AppState;
use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const INDEX_MESSAGE: &str = "Whisper Transcription API is running.";

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
    pub transcriber: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Liveness message", body = String, content_type = "text/plain")
    ),
    tag = "system"
)]
pub async fn index() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.to_string())],
        INDEX_MESSAGE,
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let transcriber_status = if state.transcriber_ready {
        "available"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.transcriber.model().to_string(),
        device: state.options.device.to_string(),
        transcriber: transcriber_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
