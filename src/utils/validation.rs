use std::path::Path;
use thiserror::Error;

/// Audio container extensions accepted for transcription, in display order.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["m4a", "mp3", "wav", "aac", "flac", "webm"];

/// Reasons an upload is turned away before anything touches the disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file part in the request.")]
    NoFilePart,

    #[error("No file selected for uploading.")]
    NoFileSelected,

    #[error("Allowed file types are {}.", ALLOWED_EXTENSIONS.join(", "))]
    DisallowedExtension,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NoFilePart => "NO_FILE_PART",
            ValidationError::NoFileSelected => "NO_FILE_SELECTED",
            ValidationError::DisallowedExtension => "DISALLOWED_EXTENSION",
        }
    }
}

/// An upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    /// Client filename, sanitized for logging
    pub display_name: String,
    /// Lowercased extension from the allow-list
    pub extension: &'static str,
}

/// Returns the allow-listed extension of `filename`, if any.
///
/// Only the suffix after the last `.` counts, compared case-insensitively.
pub fn allowed_extension(filename: &str) -> Option<&'static str> {
    let (_, suffix) = filename.rsplit_once('.')?;
    let suffix = suffix.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == suffix)
}

/// Decides whether a multipart `file` field is acceptable.
///
/// `filename` is `None` when the request had no file part at all.
pub fn validate_upload(filename: Option<&str>) -> Result<AcceptedUpload, ValidationError> {
    let filename = filename.ok_or(ValidationError::NoFilePart)?;

    if filename.is_empty() {
        return Err(ValidationError::NoFileSelected);
    }

    let extension = allowed_extension(filename).ok_or(ValidationError::DisallowedExtension)?;

    Ok(AcceptedUpload {
        display_name: sanitize_filename(filename),
        extension,
    })
}

/// Sanitizes filename to prevent path traversal and log injection.
/// Falls back to "unnamed" when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> String {
    // Treat both separators as path boundaries regardless of platform
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {:?}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.trim().is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_part() {
        assert_eq!(validate_upload(None), Err(ValidationError::NoFilePart));
        assert_eq!(
            ValidationError::NoFilePart.to_string(),
            "No file part in the request."
        );
    }

    #[test]
    fn test_empty_filename() {
        assert_eq!(validate_upload(Some("")), Err(ValidationError::NoFileSelected));
        assert_eq!(
            ValidationError::NoFileSelected.to_string(),
            "No file selected for uploading."
        );
    }

    #[test]
    fn test_disallowed_extension_message() {
        assert_eq!(
            ValidationError::DisallowedExtension.to_string(),
            "Allowed file types are m4a, mp3, wav, aac, flac, webm."
        );
    }

    #[test]
    fn test_rejects_unlisted_or_missing_extensions() {
        for name in [
            "notes.txt",
            "README",
            "archive.tar.gz",
            "song.mp3.exe",
            "wav",
            "trailing.",
            "clip.ogg",
        ] {
            assert_eq!(
                validate_upload(Some(name)),
                Err(ValidationError::DisallowedExtension),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_accepts_allowed_extensions_case_insensitively() {
        for (name, ext) in [
            ("sample.wav", "wav"),
            ("VOICE.MP3", "mp3"),
            ("memo.M4a", "m4a"),
            ("take.2.flac", "flac"),
            ("call.aac", "aac"),
            ("browser.webm", "webm"),
            (".wav", "wav"),
        ] {
            let accepted = validate_upload(Some(name)).unwrap();
            assert_eq!(accepted.extension, ext);
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ValidationError::NoFilePart.code(), "NO_FILE_PART");
        assert_eq!(ValidationError::NoFileSelected.code(), "NO_FILE_SELECTED");
        assert_eq!(
            ValidationError::DisallowedExtension.code(),
            "DISALLOWED_EXTENSION"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("sample.wav"), "sample.wav");
        assert_eq!(sanitize_filename("my memo.m4a"), "my memo.m4a");
        assert_eq!(sanitize_filename("take<1>.mp3"), "take_1_.mp3");
        assert_eq!(sanitize_filename("録音.flac"), "録音.flac");

        // Path traversal
        assert_eq!(sanitize_filename("../../../etc/passwd.wav"), "passwd.wav");
        assert_eq!(sanitize_filename("..\\..\\windows\\clip.mp3"), "clip.mp3");

        // Hidden files and degenerate names
        assert_eq!(sanitize_filename(".hidden.wav"), "hidden.wav");
        assert_eq!(sanitize_filename("../"), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn test_sanitize_filename_limits_length() {
        let long = format!("{}.wav", "é".repeat(200));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.is_char_boundary(sanitized.len()));
    }
}
