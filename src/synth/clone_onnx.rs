//! ONNX voice-cloning model: a speaker encoder plus a conditioned decoder.
//!
//! `config.json` of a cloning model:
//!
//! ```json
//! { "type": "CLONE1", "encoder_file": "speaker_encoder.onnx",
//!   "decoder_file": "decoder.onnx", "sample_rate": 22050 }
//! ```
//!
//! The encoder maps a `[1, n]` float waveform to a speaker embedding; the
//! decoder maps `input_ids` `[1, seq_len]` and that embedding to audio.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider},
    session::Session,
    value::Tensor,
};
use serde::Deserialize;

use super::cloned_voice::{CloningModel, CloningModelLoader, SAMPLE_RATE};
use crate::audio::Waveform;
use crate::device::ComputeDevice;
use crate::hub::ModelSource;
use crate::phonemize::phonemize;
use crate::tokenize::ipa_to_ids;

#[derive(Debug, Clone, Deserialize)]
pub struct CloneConfig {
    #[serde(rename = "type")]
    pub model_type: String,
    pub encoder_file: String,
    pub decoder_file: String,
    #[serde(default = "default_rate")]
    pub sample_rate: u32,
}

fn default_rate() -> u32 {
    SAMPLE_RATE
}

impl CloneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model_type != "CLONE1" {
            bail!("Unsupported cloning model type '{}'; expected CLONE1", self.model_type);
        }
        if self.sample_rate != SAMPLE_RATE {
            bail!("cloning model produces {} Hz; {} Hz is required", self.sample_rate, SAMPLE_RATE);
        }
        Ok(())
    }
}

/// Resolved model files; sessions are only built in [`CloningModelLoader::load`].
#[derive(Debug, Clone)]
pub struct OnnxClonerLoader {
    encoder: PathBuf,
    decoder: PathBuf,
}

impl OnnxClonerLoader {
    pub fn fetch(source: &ModelSource) -> Result<Self> {
        let config: CloneConfig = source.config()?;
        config.validate()?;
        Ok(Self {
            encoder: source.fetch(&config.encoder_file)?,
            decoder: source.fetch(&config.decoder_file)?,
        })
    }
}

fn session_on(device: ComputeDevice, path: &std::path::Path) -> Result<Session> {
    let builder = Session::builder().context("Failed to create ORT session builder")?;
    let builder = match device {
        ComputeDevice::Cuda => builder
            .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
            .context("Failed to enable CUDA execution provider")?,
        ComputeDevice::CoreMl => builder
            .with_execution_providers([CoreMLExecutionProvider::default().build().error_on_failure()])
            .context("Failed to enable CoreML execution provider")?,
        ComputeDevice::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to enable CPU execution provider")?,
    };
    builder
        .commit_from_file(path)
        .with_context(|| format!("Cannot load ONNX model: {}", path.display()))
}

impl CloningModelLoader for OnnxClonerLoader {
    type Model = OnnxCloner;

    fn load(&self, device: ComputeDevice) -> Result<OnnxCloner> {
        Ok(OnnxCloner {
            encoder: session_on(device, &self.encoder)?,
            decoder: session_on(device, &self.decoder)?,
            speaker: None,
        })
    }
}

pub struct OnnxCloner {
    encoder: Session,
    decoder: Session,
    speaker: Option<Vec<f32>>,
}

impl CloningModel for OnnxCloner {
    fn condition(&mut self, reference: &Waveform) -> Result<()> {
        let n = reference.len();
        let input = Tensor::<f32>::from_array(([1usize, n], reference.samples().to_vec()))
            .context("Failed to build reference tensor")?;
        let outputs = self
            .encoder
            .run(ort::inputs![input])
            .context("Speaker encoder failed")?;
        let (_shape, embedding) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract speaker embedding")?;
        tracing::debug!(dim = embedding.len(), "speaker embedding computed");
        self.speaker = Some(embedding.to_vec());
        Ok(())
    }

    fn speak(&mut self, text: &str) -> Result<Vec<f32>> {
        let speaker = self.speaker.as_ref().context("no speaker conditioning; call condition first")?;

        let ipa = phonemize(text).with_context(|| format!("Phonemisation failed for {:?}", text))?;
        let ids = ipa_to_ids(&ipa);
        let seq_len = ids.len();

        let t_ids = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .context("Failed to build input_ids tensor")?;
        let t_speaker = Tensor::<f32>::from_array(([1usize, speaker.len()], speaker.clone()))
            .context("Failed to build speaker tensor")?;

        let outputs = self
            .decoder
            .run(ort::inputs![t_ids, t_speaker])
            .context("Decoder inference failed")?;
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;
        Ok(audio.to_vec())
    }

    fn release(&mut self) {
        self.speaker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let c: CloneConfig = serde_json::from_str(
            r#"{"type":"CLONE1","encoder_file":"enc.onnx","decoder_file":"dec.onnx"}"#,
        )
        .unwrap();
        assert_eq!(c.sample_rate, 22_050);
        assert!(c.validate().is_ok());

        let wrong_rate = CloneConfig { sample_rate: 24_000, ..c.clone() };
        assert!(wrong_rate.validate().is_err());
        let wrong_type = CloneConfig { model_type: "ONNX1".into(), ..c };
        assert!(wrong_type.validate().is_err());
    }

    #[test]
    fn test_fetch_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"type":"CLONE1","encoder_file":"enc.onnx","decoder_file":"dec.onnx"}"#,
        )
        .unwrap();
        let source = ModelSource::Dir(dir.path().to_path_buf());
        assert!(OnnxClonerLoader::fetch(&source).is_err());

        std::fs::write(dir.path().join("enc.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("dec.onnx"), b"").unwrap();
        assert!(OnnxClonerLoader::fetch(&source).is_ok());
    }
}
