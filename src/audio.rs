//! Mono PCM waveforms, silence and stitching, WAV I/O.
//!
//! Samples are `f32` in `[-1.0, 1.0]`.  Files are written as 16-bit PCM:
//! IEEE-float WAV is not decoded reliably by every player.

use std::path::Path;

use anyhow::{bail, Context, Result};
use thiserror::Error;

/// Two waveforms with different sample rates were joined.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot join {got} Hz audio onto {expected} Hz audio")]
pub struct SampleRateMismatch {
    pub expected: u32,
    pub got: u32,
}

/// A mono waveform at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// `duration_secs` of zero-valued samples.
    pub fn silence(duration_secs: f32, sample_rate: u32) -> Self {
        Self::new(vec![0.0; pause_samples(duration_secs, sample_rate)], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square level.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    /// Concatenate `parts` in order with `pause_secs` of silence between
    /// neighbours.  Nothing is inserted before the first or after the last
    /// part, so a single part comes back unchanged.
    pub fn join_with_pause(
        parts: &[Waveform],
        pause_secs: f32,
    ) -> std::result::Result<Waveform, SampleRateMismatch> {
        let Some(first) = parts.first() else {
            return Ok(Waveform::new(Vec::new(), 0));
        };
        let sample_rate = first.sample_rate;
        if let Some(bad) = parts.iter().find(|p| p.sample_rate != sample_rate) {
            return Err(SampleRateMismatch { expected: sample_rate, got: bad.sample_rate });
        }

        let gap = pause_samples(pause_secs, sample_rate);
        let total: usize =
            parts.iter().map(Waveform::len).sum::<usize>() + gap * (parts.len() - 1);

        let mut samples = Vec::with_capacity(total);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                samples.resize(samples.len() + gap, 0.0);
            }
            samples.extend_from_slice(&part.samples);
        }
        Ok(Waveform::new(samples, sample_rate))
    }

    /// Linear-interpolation resample.  Good enough for conditioning clips;
    /// not meant for output audio.
    pub fn resample(&self, target_rate: u32) -> Waveform {
        if self.sample_rate == target_rate || self.samples.is_empty() || self.sample_rate == 0 {
            return Waveform::new(self.samples.clone(), target_rate);
        }
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).round().max(1.0) as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
            })
            .collect();
        Waveform::new(samples, target_rate)
    }

    // ── WAV writer ────────────────────────────────────────────────────────────

    /// Write a 16-bit PCM mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Cannot create WAV: {}", path.display()))?;
        for &s in &self.samples {
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(s16).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
        tracing::debug!(
            samples = self.samples.len(),
            secs = self.duration_secs(),
            path = %path.display(),
            "wrote wav"
        );
        Ok(())
    }
}

/// Number of samples covering `secs` at `sample_rate`.
pub fn pause_samples(secs: f32, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f32).round() as usize
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

// ─────────────────────────────────────────────────────────────────────────────
// WAV reader
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded WAV file with its channels de-interleaved.
#[derive(Debug, Clone)]
pub struct WavClip {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl WavClip {
    pub fn duration_secs(&self) -> f32 {
        let frames = self.channels.first().map_or(0, Vec::len);
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f32 / self.sample_rate as f32
    }

    /// Whether every channel holds the same number of frames.
    pub fn is_aligned(&self) -> bool {
        self.channels.windows(2).all(|w| w[0].len() == w[1].len())
    }

    /// Average all channels into one, truncated to the shortest channel.
    pub fn downmix(&self) -> Waveform {
        let n = self.channels.len().max(1) as f32;
        let frames = self.channels.iter().map(Vec::len).min().unwrap_or(0);
        let samples = (0..frames)
            .map(|i| self.channels.iter().filter_map(|c| c.get(i)).sum::<f32>() / n)
            .collect();
        Waveform::new(samples, self.sample_rate)
    }

    /// RMS of the difference between the first two channels, relative to the
    /// louder channel.  0 for mono or identical channels.
    pub fn channel_divergence(&self) -> f32 {
        let (Some(a), Some(b)) = (self.channels.first(), self.channels.get(1)) else {
            return 0.0;
        };
        let level = rms(a).max(rms(b));
        if level == 0.0 {
            return 0.0;
        }
        let diff: Vec<f32> = a.iter().zip(b).map(|(x, y)| x - y).collect();
        rms(&diff) / level
    }
}

/// Read any integer or float PCM WAV hound understands.
pub fn read_wav(path: &Path) -> Result<WavClip> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Cannot open WAV: {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV has no channels: {}", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("WAV read error")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("WAV read error")?
        }
    };

    let n = spec.channels as usize;
    let mut channels = vec![Vec::with_capacity(interleaved.len() / n); n];
    for frame in interleaved.chunks_exact(n) {
        for (c, &s) in frame.iter().enumerate() {
            channels[c].push(s);
        }
    }
    Ok(WavClip { sample_rate: spec.sample_rate, channels })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
