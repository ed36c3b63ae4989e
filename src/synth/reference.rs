//! Reference clips for the cloned-voice engine.

use std::path::{Path, PathBuf};

use crate::audio::{read_wav, WavClip, Waveform};
use crate::error::{PodcastError, Result};

pub const MIN_REFERENCE_SECS: f32 = 5.0;
pub const MAX_REFERENCE_SECS: f32 = 30.0;

/// Stereo clips whose channels differ by more than this (relative RMS) are
/// treated as more than one speaker.
const MAX_CHANNEL_DIVERGENCE: f32 = 0.25;

/// A reference clip that passed validation, downmixed to mono.
#[derive(Debug, Clone)]
pub struct ReferenceAudio {
    path: PathBuf,
    clip: Waveform,
}

impl ReferenceAudio {
    /// Read and validate a WAV clip.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PodcastError::reference(path, "file not found"));
        }
        let clip = read_wav(path)
            .map_err(|e| PodcastError::reference(path, format!("unreadable: {e:#}")))?;
        Self::from_clip(path, clip)
    }

    /// Validate an already-decoded clip.
    ///
    /// The channel check is best-effort: identical (or nearly identical)
    /// stereo channels are accepted as one recording, clearly different ones
    /// are not.
    pub fn from_clip(path: &Path, clip: WavClip) -> Result<Self> {
        let channels = clip.channels.len();
        if channels > 2 {
            return Err(PodcastError::reference(
                path,
                format!("{channels} channels; expected a mono or stereo recording"),
            ));
        }
        if !clip.is_aligned() {
            return Err(PodcastError::reference(path, "channels have different lengths"));
        }
        if channels == 2 && clip.channel_divergence() > MAX_CHANNEL_DIVERGENCE {
            return Err(PodcastError::reference(
                path,
                "stereo channels carry different signals; expected a single speaker",
            ));
        }

        let secs = clip.duration_secs();
        if !(MIN_REFERENCE_SECS..=MAX_REFERENCE_SECS).contains(&secs) {
            return Err(PodcastError::reference(
                path,
                format!(
                    "clip is {secs:.1}s; must be between {MIN_REFERENCE_SECS:.0}s and {MAX_REFERENCE_SECS:.0}s"
                ),
            ));
        }

        let clip = clip.downmix();
        if clip.rms() == 0.0 {
            return Err(PodcastError::reference(path, "clip is silent"));
        }

        tracing::info!(path = %path.display(), secs, "reference audio accepted");
        Ok(Self { path: path.to_path_buf(), clip })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn waveform(&self) -> &Waveform {
        &self.clip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(secs: f32) -> WavClip {
        let n = (secs * 16_000.0) as usize;
        WavClip {
            sample_rate: 16_000,
            channels: vec![(0..n).map(|i| (i as f32 * 0.01).sin() * 0.3).collect()],
        }
    }

    fn reason(err: PodcastError) -> String {
        match err {
            PodcastError::InvalidReferenceAudio { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duration_bounds() {
        let p = Path::new("ref.wav");
        assert!(ReferenceAudio::from_clip(p, mono(5.0)).is_ok());
        assert!(ReferenceAudio::from_clip(p, mono(30.0)).is_ok());
        assert!(reason(ReferenceAudio::from_clip(p, mono(4.9)).unwrap_err()).contains("4.9s"));
        assert!(ReferenceAudio::from_clip(p, mono(31.0)).is_err());
    }

    #[test]
    fn test_identical_stereo_is_downmixed() {
        let left = mono(6.0).channels.remove(0);
        let clip = WavClip { sample_rate: 16_000, channels: vec![left.clone(), left.clone()] };
        let r = ReferenceAudio::from_clip(Path::new("ref.wav"), clip).unwrap();
        assert_eq!(r.waveform().samples(), left.as_slice());
    }

    #[test]
    fn test_divergent_stereo_rejected() {
        let left = mono(6.0).channels.remove(0);
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let clip = WavClip { sample_rate: 16_000, channels: vec![left, right] };
        let err = ReferenceAudio::from_clip(Path::new("ref.wav"), clip).unwrap_err();
        assert!(reason(err).contains("single speaker"));
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let left = mono(6.0).channels.remove(0);
        let right = left[..left.len() / 2].to_vec();
        let clip = WavClip { sample_rate: 16_000, channels: vec![left, right] };
        let err = ReferenceAudio::from_clip(Path::new("ref.wav"), clip).unwrap_err();
        assert!(reason(err).contains("different lengths"));
    }

    #[test]
    fn test_silent_rejected() {
        let clip = WavClip { sample_rate: 16_000, channels: vec![vec![0.0; 16_000 * 6]] };
        assert!(ReferenceAudio::from_clip(Path::new("ref.wav"), clip).is_err());
    }

    #[test]
    fn test_missing_and_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.wav");
        assert!(reason(ReferenceAudio::load(&missing).unwrap_err()).contains("not found"));

        let junk = dir.path().join("junk.wav");
        std::fs::write(&junk, b"definitely not RIFF").unwrap();
        assert!(reason(ReferenceAudio::load(&junk).unwrap_err()).starts_with("unreadable"));
    }
}
