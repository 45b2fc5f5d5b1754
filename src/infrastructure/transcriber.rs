use crate::config::AppConfig;
use crate::services::transcriber::{
    ModelPreset, TranscribeOptions, Transcriber, WhisperCliTranscriber,
};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

pub struct TranscriberSetup {
    pub transcriber: Arc<dyn Transcriber>,
    pub options: TranscribeOptions,
    /// Outcome of the startup launch check, served by `/health`
    pub ready: bool,
}

/// Builds the process-wide transcriber and resolves its device options once.
pub async fn setup_transcriber(config: &AppConfig) -> Result<TranscriberSetup> {
    let model: ModelPreset = config.model.parse().map_err(|e: String| anyhow!(e))?;
    let options = TranscribeOptions::resolve(&config.device).await;

    info!("Loading Whisper model...");
    let transcriber =
        WhisperCliTranscriber::new(&config.whisper_bin, model, config.model_dir.clone());

    // Warm up: make sure the program can actually be launched
    let ready = transcriber.health_check().await;
    if ready {
        info!("🎙️  Whisper model '{}' ready on {}.", model, options.device);
    } else {
        tracing::warn!(
            "⚠️  Whisper program '{}' is not runnable! Transcriptions will fail until it is installed.",
            config.whisper_bin
        );
    }

    Ok(TranscriberSetup {
        transcriber: Arc::new(transcriber),
        options,
        ready,
    })
}
