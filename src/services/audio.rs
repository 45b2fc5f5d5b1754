use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Basic properties of a staged audio file, as far as the container reveals them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioProbe {
    pub duration: Option<Duration>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// Reads container properties without decoding audio.
///
/// Never fails: unknown or corrupt containers yield an empty probe, and the
/// decision about whether the audio is usable is left to the model.
pub async fn probe(path: &Path) -> AudioProbe {
    let path: PathBuf = path.to_path_buf();
    match tokio::task::spawn_blocking(move || probe_blocking(&path)).await {
        Ok(probe) => probe,
        Err(e) => {
            tracing::warn!("Audio probe task failed: {}", e);
            AudioProbe::default()
        }
    }
}

fn probe_blocking(path: &Path) -> AudioProbe {
    let tagged_file = match Probe::open(path)
        .and_then(|p| p.guess_file_type().map_err(Into::into))
        .and_then(|p| p.read())
    {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!("No audio properties for {}: {}", path.display(), e);
            return AudioProbe::default();
        }
    };

    let properties = tagged_file.properties();
    let duration = properties.duration();

    AudioProbe {
        duration: (!duration.is_zero()).then_some(duration),
        sample_rate: properties.sample_rate(),
        channels: properties.channels(),
    }
}
