//! KittenTTS ONNX model behind the default-voice engine.
//!
//! | Input       | Shape          | dtype   |
//! |-------------|----------------|---------|
//! | `input_ids` | `[1, seq_len]` | int64   |
//! | `style`     | `[1, style_d]` | float32 |
//! | `speed`     | `[1]`          | float32 |
//!
//! Output 0 is the waveform at 24 kHz.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use ort::{session::Session, value::Tensor};
use serde::Deserialize;

use super::default_voice::NarrationModel;
use crate::hub::ModelSource;
use crate::phonemize::phonemize;
use crate::text::split_into_phases;
use crate::tokenize::ipa_to_ids;
use crate::voices::VoiceBank;

/// Samples cut from the end of every chunk; the model pads with noise there.
const TAIL_TRIM: usize = 5_000;

/// Longest text sent through the model in one pass.
const CHUNK_MAX_CHARS: usize = 400;

/// `config.json` of a KittenTTS repository.
#[derive(Debug, Clone, Deserialize)]
pub struct KittenConfig {
    #[serde(rename = "type")]
    pub model_type: String,
    pub model_file: String,
    pub voices: String,
    #[serde(default)]
    pub speed_priors: HashMap<String, f32>,
    #[serde(default)]
    pub voice_aliases: HashMap<String, String>,
}

impl KittenConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.model_type.as_str(), "ONNX1" | "ONNX2") {
            bail!("Unsupported model type '{}'; expected ONNX1 or ONNX2", self.model_type);
        }
        Ok(())
    }

    /// NPZ key for a friendly voice name.
    pub fn resolve_voice<'a>(&'a self, voice: &'a str) -> &'a str {
        self.voice_aliases.get(voice).map(String::as_str).unwrap_or(voice)
    }

    pub fn effective_speed(&self, voice_key: &str, speed: f32) -> f32 {
        speed * self.speed_priors.get(voice_key).copied().unwrap_or(1.0)
    }
}

pub struct KittenModel {
    session: Session,
    voices: VoiceBank,
    config: KittenConfig,
    speed: f32,
}

impl KittenModel {
    /// Fetch `config.json`, the model and the voice bank, then open an ONNX
    /// Runtime session on the CPU.
    pub fn open(source: &ModelSource, speed: f32) -> Result<Self> {
        let config: KittenConfig = source.config()?;
        config.validate()?;

        let model_path = source.fetch(&config.model_file)?;
        let voices_path = source.fetch(&config.voices)?;

        let session = Session::builder()
            .context("Failed to create ORT session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Cannot load ONNX model: {}", model_path.display()))?;
        let voices = VoiceBank::open(&voices_path)
            .with_context(|| format!("Cannot load voices: {}", voices_path.display()))?;

        tracing::info!(model = %model_path.display(), voices = voices.names().count(), "default-voice model loaded");
        Ok(Self { session, voices, config, speed })
    }

    pub fn voice_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.voice_aliases.keys().cloned().collect();
        names.extend(self.voices.names().map(String::from));
        names.sort();
        names.dedup();
        names
    }

    fn infer(&mut self, text: &str, voice_key: &str, speed: f32) -> Result<Vec<f32>> {
        let ipa = phonemize(text).with_context(|| format!("Phonemisation failed for {:?}", text))?;
        let ids = ipa_to_ids(&ipa);
        let seq_len = ids.len();

        let style = self
            .voices
            .get(voice_key)
            .with_context(|| format!("Voice '{}' not found", voice_key))?
            .row_for(text.len())
            .to_vec();
        let style_dim = style.len();

        let t_ids = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .context("Failed to build input_ids tensor")?;
        let t_style = Tensor::<f32>::from_array(([1usize, style_dim], style))
            .context("Failed to build style tensor")?;
        let t_speed = Tensor::<f32>::from_array(([1usize], vec![speed]))
            .context("Failed to build speed tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![t_ids, t_style, t_speed])
            .context("ONNX inference failed")?;
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;

        let keep = audio.len().saturating_sub(TAIL_TRIM);
        Ok(audio[..keep].to_vec())
    }
}

impl NarrationModel for KittenModel {
    fn narrate(&mut self, text: &str, voice: &str) -> Result<Vec<f32>> {
        let voice_key = self.config.resolve_voice(voice).to_string();
        if self.voices.get(&voice_key).is_none() {
            bail!("Unknown voice '{}'. Available: {:?}", voice, self.voice_names());
        }
        let speed = self.config.effective_speed(&voice_key, self.speed);

        let mut audio = Vec::new();
        for chunk in split_into_phases(text, CHUNK_MAX_CHARS) {
            audio.extend(self.infer(&chunk, &voice_key, speed)?);
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KittenConfig {
        serde_json::from_str(
            r#"{
                "type": "ONNX2",
                "model_file": "kitten_tts_mini.onnx",
                "voices": "voices.npz",
                "speed_priors": {"expr-voice-2-m": 0.8},
                "voice_aliases": {"Jasper": "expr-voice-2-m"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_config_parsing() {
        let c = config();
        assert!(c.validate().is_ok());
        assert_eq!(c.resolve_voice("Jasper"), "expr-voice-2-m");
        assert_eq!(c.resolve_voice("expr-voice-3-f"), "expr-voice-3-f");
    }

    #[test]
    fn test_speed_priors() {
        let c = config();
        assert!((c.effective_speed("expr-voice-2-m", 1.0) - 0.8).abs() < 1e-6);
        assert_eq!(c.effective_speed("expr-voice-3-f", 1.2), 1.2);
    }

    #[test]
    fn test_rejects_unknown_model_type() {
        let mut c = config();
        c.model_type = "TORCH".into();
        assert!(c.validate().is_err());
    }
}
