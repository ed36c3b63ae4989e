//! Fixed-voice engine: fast narration with a voice bundled in the model.

use super::{SynthesisBackend, VoiceConfig};
use crate::audio::Waveform;
use crate::error::SynthesisError;
use crate::text::clean_for_speech;

pub const SAMPLE_RATE: u32 = 24_000;
pub const PAUSE_SECS: f32 = 0.2;

/// A model that speaks text with one of its built-in voices at
/// [`SAMPLE_RATE`].
pub trait NarrationModel {
    fn narrate(&mut self, text: &str, voice: &str) -> anyhow::Result<Vec<f32>>;
}

pub struct DefaultVoiceEngine<M> {
    model: M,
    default_voice: String,
}

impl<M: NarrationModel> DefaultVoiceEngine<M> {
    /// `default_voice` is used whenever the run does not name a voice, which
    /// includes runs that carry a reference clip.
    pub fn new(model: M, default_voice: impl Into<String>) -> Self {
        Self { model, default_voice: default_voice.into() }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: NarrationModel> SynthesisBackend for DefaultVoiceEngine<M> {
    fn name(&self) -> &'static str {
        "default-voice"
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn pause_duration(&self) -> f32 {
        PAUSE_SECS
    }

    fn synthesize(&mut self, text: &str, voice: &VoiceConfig) -> Result<Waveform, SynthesisError> {
        let text = clean_for_speech(text);
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let voice = match voice {
            VoiceConfig::Builtin(name) if !name.trim().is_empty() => name.as_str(),
            _ => self.default_voice.as_str(),
        };

        let samples = self.model.narrate(&text, voice).map_err(SynthesisError::Model)?;
        Ok(Waveform::new(samples, SAMPLE_RATE))
    }
}
