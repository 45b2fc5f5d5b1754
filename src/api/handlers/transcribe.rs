use crate::AppState;
use crate::api::error::AppError;
use crate::services::audio;
use crate::services::staging::{StagedFile, StorageError};
use crate::utils::validation::{AcceptedUpload, ValidationError, validate_upload};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[utoipa::path(
    post,
    path = "/transcribe",
    request_body(content = Multipart, description = "Audio file in the `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcription completed", body = TranscriptionResponse),
        (status = 400, description = "Missing file, empty filename or disallowed extension", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Storage or transcription failure", body = ErrorResponse)
    ),
    tag = "transcription"
)]
pub async fn transcribe_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<TranscriptionResponse>, AppError> {
    // Anything that is not a multipart form simply has no file part
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected non-multipart request: {}", e);
        ValidationError::NoFilePart
    })?;

    let (upload, staged) = match receive_upload(&state, &mut multipart).await {
        Ok(received) => received,
        Err(e) => {
            // Consume the rest of the body so the client sees our response
            // instead of a connection reset
            tracing::warn!("Upload rejected: {}. Consuming remaining stream...", e);
            drain(&mut multipart).await;
            return Err(e);
        }
    };
    drain(&mut multipart).await;

    let probe = audio::probe(staged.path()).await;
    tracing::info!(
        file = %upload.display_name,
        key = %staged.key(),
        bytes = staged.size(),
        duration_secs = probe.duration.map(|d| d.as_secs_f64()),
        sample_rate = probe.sample_rate,
        channels = probe.channels,
        "Transcribing file"
    );

    let outcome = state
        .transcriber
        .transcribe(staged.path(), &state.options)
        .await;

    // Cleanup runs on every branch, before the response leaves
    let staged_path = staged.path().to_path_buf();
    if let Err(e) = state.staging.unstage(staged).await {
        tracing::warn!("Failed to remove staged file {}: {}", staged_path.display(), e);
    }

    let transcription = outcome?;
    let text = transcription.text.trim().to_string();
    tracing::info!(
        file = %upload.display_name,
        elapsed_ms = transcription.elapsed.as_millis() as u64,
        chars = text.chars().count(),
        "Transcription completed"
    );

    Ok(Json(TranscriptionResponse {
        transcription: text,
    }))
}

/// Walks the form until the `file` field, validates it and stages its bytes.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<(AcceptedUpload, StagedFile), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        // A `file` field without a filename is a plain form value, not a file part
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            tracing::debug!("Skipping `file` form value without a filename");
            continue;
        };
        let upload = validate_upload(Some(&filename))?;

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let staged = state
            .staging
            .stage(upload.extension, reader)
            .await
            .map_err(staging_error)?;

        return Ok((upload, staged));
    }

    Err(ValidationError::NoFilePart.into())
}

async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Body read failures are the client's; everything else is ours.
fn staging_error(e: StorageError) -> AppError {
    match e {
        StorageError::Read(io) => match io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
        {
            Some(multipart) if multipart.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            }
            Some(multipart) => AppError::BadRequest(multipart.body_text()),
            None => AppError::BadRequest(format!("Failed to read upload: {}", io)),
        },
        other => AppError::Storage(other),
    }
}
