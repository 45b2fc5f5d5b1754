use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Errors raised by a transcription backend.
///
/// `Display` is the raw underlying message; it is returned to clients as-is.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The model program could not be started at all.
    #[error("{0}")]
    Unavailable(String),

    /// The model ran and reported a failure (corrupt audio, unsupported codec, OOM).
    #[error("{0}")]
    Failed(String),

    /// The model finished but produced no readable transcript.
    #[error("{0}")]
    MissingOutput(String),
}

/// Whisper checkpoints, trading accuracy for speed and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelPreset {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 5] = [
        ModelPreset::Tiny,
        ModelPreset::Base,
        ModelPreset::Small,
        ModelPreset::Medium,
        ModelPreset::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelPreset::Tiny => "tiny",
            ModelPreset::Base => "base",
            ModelPreset::Small => "small",
            ModelPreset::Medium => "medium",
            ModelPreset::Large => "large",
        }
    }
}

impl fmt::Display for ModelPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ModelPreset::ALL
            .into_iter()
            .find(|preset| preset.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = ModelPreset::ALL.iter().map(|p| p.as_str()).collect();
                format!(
                    "Unknown Whisper model '{}'. Options: {}",
                    s,
                    names.join(", ")
                )
            })
    }
}

/// Compute device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Hardware accelerator (GPU)
    Cuda,
    /// General-purpose fallback
    Cpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    pub fn is_accelerated(self) -> bool {
        matches!(self, Device::Cuda)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric precision used for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Fp16,
    Fp32,
}

impl Precision {
    /// Half precision only pays off (and is only supported) on an accelerator.
    pub fn for_device(device: Device) -> Self {
        if device.is_accelerated() {
            Precision::Fp16
        } else {
            Precision::Fp32
        }
    }
}

/// Per-process inference options, fixed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscribeOptions {
    pub device: Device,
    pub precision: Precision,
}

impl TranscribeOptions {
    pub fn for_device(device: Device) -> Self {
        Self {
            device,
            precision: Precision::for_device(device),
        }
    }

    pub fn cpu() -> Self {
        Self::for_device(Device::Cpu)
    }

    /// Resolves the device from a preference of "auto", "cpu" or "cuda".
    ///
    /// "auto" (and anything unrecognized) probes for an accelerator.
    pub async fn resolve(preference: &str) -> Self {
        let device = match preference {
            "cpu" => Device::Cpu,
            "cuda" | "gpu" => Device::Cuda,
            other => {
                if other != "auto" {
                    tracing::warn!("Unknown device preference '{}', detecting instead", other);
                }
                if accelerator_available().await {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            }
        };
        Self::for_device(device)
    }
}

/// Reports whether an NVIDIA GPU is visible to this process.
pub async fn accelerator_available() -> bool {
    match Command::new("nvidia-smi")
        .arg("-L")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output.status.success() && !output.stdout.trim_ascii().is_empty(),
        Err(_) => false,
    }
}

/// Text returned by the model for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Whitespace-trimmed transcript
    pub text: String,
    /// Wall-clock time spent inside the model
    pub elapsed: Duration,
}

/// Boundary around the external speech-to-text model.
///
/// Implementations are built once and shared read-only across requests.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes the audio file at `path`. No timeout, no retries.
    async fn transcribe(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscriptionError>;

    /// Check if the backend can be invoked
    async fn health_check(&self) -> bool;

    fn model(&self) -> ModelPreset;
}

/// Drives the `whisper` command-line program as a subprocess.
///
/// The program writes `<output_dir>/<audio stem>.txt`; a fresh temporary
/// output directory is used per call.
pub struct WhisperCliTranscriber {
    program: PathBuf,
    model: ModelPreset,
    model_dir: Option<PathBuf>,
}

impl WhisperCliTranscriber {
    pub fn new(program: impl Into<PathBuf>, model: ModelPreset, model_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            model,
            model_dir,
        }
    }

    fn command(&self, audio: &Path, output_dir: &Path, options: &TranscribeOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(audio)
            .args(["--model", self.model.as_str()])
            .args(["--device", options.device.as_str()])
            .args([
                "--fp16",
                match options.precision {
                    Precision::Fp16 => "True",
                    Precision::Fp32 => "False",
                },
            ])
            .args(["--task", "transcribe"])
            .args(["--output_format", "txt"])
            .arg("--output_dir")
            .arg(output_dir)
            .args(["--verbose", "False"]);

        if let Some(dir) = &self.model_dir {
            cmd.arg("--model_dir").arg(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscriptionError> {
        let started = Instant::now();
        let output_dir = tempfile::Builder::new()
            .prefix("whisper-out-")
            .tempdir()
            .map_err(|e| {
                TranscriptionError::Unavailable(format!("Failed to create output directory: {}", e))
            })?;

        let output = self
            .command(path, output_dir.path(), options)
            .output()
            .await
            .map_err(|e| {
                TranscriptionError::Unavailable(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(TranscriptionError::Failed(failure_message(
                &stdout,
                &stderr,
                &format!("whisper exited with {}", output.status),
            )));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let transcript_path = output_dir.path().join(format!("{}.txt", stem));

        let raw = match tokio::fs::read_to_string(&transcript_path).await {
            Ok(raw) => raw,
            // The CLI reports per-file failures on stdout and still exits 0
            Err(e) => {
                return Err(TranscriptionError::MissingOutput(failure_message(
                    &stdout,
                    &stderr,
                    &format!("No transcript produced: {}", e),
                )));
            }
        };

        Ok(Transcription {
            text: join_transcript_lines(&raw),
            elapsed: started.elapsed(),
        })
    }

    async fn health_check(&self) -> bool {
        match Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!("Whisper health check failed: {}", e);
                false
            }
        }
    }

    fn model(&self) -> ModelPreset {
        self.model
    }
}

/// One segment per line in the txt output; the transcript is their concatenation.
fn join_transcript_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Picks the most specific failure message the CLI left behind.
fn failure_message(stdout: &str, stderr: &str, fallback: &str) -> String {
    if let Some(reason) = stdout
        .lines()
        .rev()
        .filter(|line| line.starts_with("Skipping "))
        .find_map(|line| line.split_once(" due to ").map(|(_, reason)| reason.trim()))
    {
        return reason.to_string();
    }

    // Progress bars use carriage returns, so split on both
    stderr
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_preset_parsing() {
        assert_eq!("base".parse::<ModelPreset>().unwrap(), ModelPreset::Base);
        assert_eq!(" Large ".parse::<ModelPreset>().unwrap(), ModelPreset::Large);
        assert_eq!(ModelPreset::default(), ModelPreset::Base);

        let err = "huge".parse::<ModelPreset>().unwrap_err();
        assert!(err.contains("tiny, base, small, medium, large"));
    }

    #[test]
    fn test_precision_follows_device() {
        assert_eq!(
            TranscribeOptions::for_device(Device::Cuda).precision,
            Precision::Fp16
        );
        assert_eq!(TranscribeOptions::cpu().precision, Precision::Fp32);
    }

    #[tokio::test]
    async fn test_explicit_device_preference_skips_detection() {
        assert_eq!(TranscribeOptions::resolve("cpu").await.device, Device::Cpu);
        assert_eq!(TranscribeOptions::resolve("cuda").await.device, Device::Cuda);
    }

    #[test]
    fn test_join_transcript_lines() {
        assert_eq!(join_transcript_lines(" hello\n world \n\n"), "hello world");
        assert_eq!(join_transcript_lines("\n  \n"), "");
    }

    #[test]
    fn test_failure_message_prefers_skip_notice() {
        let stdout = "Skipping uploads/x.mp3 due to RuntimeError: Failed to load audio\n";
        let stderr = "Traceback (most recent call last):\n  ...\nRuntimeError: Failed to load audio\n";
        assert_eq!(
            failure_message(stdout, stderr, "fallback"),
            "RuntimeError: Failed to load audio"
        );
    }

    #[test]
    fn test_failure_message_uses_last_stderr_line() {
        let stderr = "100%|####| 3/3\r\nTraceback:\n  File \"x\"\nRuntimeError: CUDA out of memory\n\n";
        assert_eq!(
            failure_message("", stderr, "fallback"),
            "RuntimeError: CUDA out of memory"
        );
        assert_eq!(failure_message("", "  \n", "fallback"), "fallback");
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let transcriber =
            WhisperCliTranscriber::new("/nonexistent/whisper", ModelPreset::Tiny, None);
        assert!(!transcriber.health_check().await);

        let err = transcriber
            .transcribe(Path::new("/nonexistent/a.wav"), &TranscribeOptions::cpu())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptionError::Unavailable(_)));
    }

    #[cfg(unix)]
    mod cli {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable shell script standing in for the whisper CLI.
        fn fake_whisper(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("whisper");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        const WRITES_TRANSCRIPT: &str = r#"
echo "$@" > "$(dirname "$0")/args.txt"
audio="$1"; shift
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
stem=$(basename "$audio"); stem="${stem%.*}"
printf ' hello\n world \n' > "$out/$stem.txt"
"#;

        #[tokio::test]
        async fn test_reads_transcript_from_output_dir() {
            let tmp = tempfile::tempdir().unwrap();
            let program = fake_whisper(tmp.path(), WRITES_TRANSCRIPT);
            let audio = tmp.path().join("0b7c.wav");
            std::fs::write(&audio, b"RIFF").unwrap();

            let transcriber = WhisperCliTranscriber::new(
                &program,
                ModelPreset::Small,
                Some(tmp.path().join("models")),
            );
            let result = transcriber
                .transcribe(&audio, &TranscribeOptions::for_device(Device::Cuda))
                .await
                .unwrap();
            assert_eq!(result.text, "hello world");

            let args = std::fs::read_to_string(tmp.path().join("args.txt")).unwrap();
            assert!(args.contains("--model small"));
            assert!(args.contains("--device cuda"));
            assert!(args.contains("--fp16 True"));
            assert!(args.contains("--output_format txt"));
            assert!(args.contains("--model_dir"));
        }

        #[tokio::test]
        async fn test_nonzero_exit_surfaces_error_line() {
            let tmp = tempfile::tempdir().unwrap();
            let program = fake_whisper(
                tmp.path(),
                "echo 'Traceback (most recent call last):' >&2\n\
                 echo 'RuntimeError: Failed to load audio: corrupt header' >&2\n\
                 exit 1",
            );

            let transcriber = WhisperCliTranscriber::new(&program, ModelPreset::Base, None);
            let err = transcriber
                .transcribe(&tmp.path().join("corrupt.mp3"), &TranscribeOptions::cpu())
                .await
                .unwrap_err();
            assert!(matches!(err, TranscriptionError::Failed(_)));
            assert_eq!(
                err.to_string(),
                "RuntimeError: Failed to load audio: corrupt header"
            );
        }

        #[tokio::test]
        async fn test_skipped_file_without_output_is_an_error() {
            let tmp = tempfile::tempdir().unwrap();
            let program = fake_whisper(
                tmp.path(),
                "echo \"Skipping $1 due to RuntimeError: unsupported codec\"",
            );

            let transcriber = WhisperCliTranscriber::new(&program, ModelPreset::Base, None);
            let err = transcriber
                .transcribe(&tmp.path().join("clip.webm"), &TranscribeOptions::cpu())
                .await
                .unwrap_err();
            assert!(matches!(err, TranscriptionError::MissingOutput(_)));
            assert_eq!(err.to_string(), "RuntimeError: unsupported codec");
        }

        #[tokio::test]
        async fn test_health_check_runs_program() {
            let tmp = tempfile::tempdir().unwrap();
            let program = fake_whisper(tmp.path(), "exit 0");
            let transcriber = WhisperCliTranscriber::new(&program, ModelPreset::Tiny, None);
            assert!(transcriber.health_check().await);
            assert_eq!(transcriber.model(), ModelPreset::Tiny);
        }
    }
}
