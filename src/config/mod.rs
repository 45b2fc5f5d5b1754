use std::env;
use std::path::PathBuf;

/// Runtime configuration for the transcription service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen host (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 5000)
    pub port: u16,

    /// Directory holding uploads while they are transcribed (default: "uploads")
    pub upload_folder: PathBuf,

    /// Whisper model preset: tiny, base, small, medium or large (default: "base")
    pub model: String,

    /// Whisper command-line program (default: "whisper")
    pub whisper_bin: String,

    /// Where the whisper program caches model weights
    pub model_dir: Option<PathBuf>,

    /// Compute device: "auto", "cpu" or "cuda" (default: "auto")
    pub device: String,

    /// Maximum request body size in bytes (default: 512 MB)
    pub max_file_size: usize,

    /// Allowed CORS origins (comma separated). Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_folder: PathBuf::from("uploads"),
            model: "base".to_string(),
            whisper_bin: "whisper".to_string(),
            model_dir: None,
            device: "auto".to_string(),
            max_file_size: 512 * 1024 * 1024, // 512 MB
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(default.host),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_folder: env::var("UPLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(default.upload_folder),

            model: env::var("WHISPER_MODEL").unwrap_or(default.model),

            whisper_bin: env::var("WHISPER_BIN").unwrap_or(default.whisper_bin),

            model_dir: env::var("WHISPER_MODEL_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            device: env::var("WHISPER_DEVICE")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(default.device),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (CPU only, small model, local staging folder)
    pub fn development() -> Self {
        Self {
            model: "tiny".to_string(),
            device: "cpu".to_string(),
            max_file_size: 64 * 1024 * 1024,
            ..Self::default()
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
