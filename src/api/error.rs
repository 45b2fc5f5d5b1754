use crate::services::staging::StorageError;
use crate::services::transcriber::TranscriptionError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(_) | AppError::Transcription(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(e) => {
                tracing::info!(code = e.code(), "Upload rejected: {}", e);
                e.to_string()
            }
            AppError::BadRequest(msg) => msg,
            AppError::PayloadTooLarge(msg) => msg,
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Failed to store the uploaded file.".to_string()
            }
            // Internal tool: the model's own message goes back to the caller
            AppError::Transcription(e) => {
                tracing::error!("Error during transcription: {}", e);
                e.to_string()
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(ValidationError::NoFilePart).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PayloadTooLarge("too big".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::from(StorageError::Read(io::Error::other("reset"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(TranscriptionError::Failed("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_transcription_message_is_raw() {
        use http_body_util::BodyExt;

        let response =
            AppError::from(TranscriptionError::Failed("Failed to load audio".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({ "error": "Failed to load audio" }));
    }

    #[tokio::test]
    async fn test_storage_details_are_not_leaked() {
        use http_body_util::BodyExt;

        let err = StorageError::Write {
            path: "/srv/uploads/secret.wav".into(),
            source: io::Error::other("disk full"),
        };
        let body = AppError::from(err)
            .into_response()
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Failed to store the uploaded file.");
    }
}
