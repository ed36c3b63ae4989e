//! Voice-cloning engine: narration in the voice of a short reference clip.
//!
//! The compute device is chosen once, when the engine is built.  The model
//! is loaded on first use; if loading on an accelerator fails the engine
//! falls back to the CPU once.  Speaker conditioning is per run and is
//! dropped in [`SynthesisBackend::end_run`].

use std::path::PathBuf;

use anyhow::Result;

use super::{SynthesisBackend, VoiceConfig};
use crate::audio::Waveform;
use crate::device::{ComputeDevice, DeviceProbe};
use crate::error::SynthesisError;
use crate::text::{clean_for_speech, split_into_phases};

pub const SAMPLE_RATE: u32 = 22_050;
pub const PAUSE_SECS: f32 = 0.5;

/// Silence between the pieces of one long segment.
pub const PHASE_PAUSE_SECS: f32 = 0.3;

pub const DEFAULT_MAX_PHASE_CHARS: usize = 800;

/// A loaded cloning model, producing audio at [`SAMPLE_RATE`].
pub trait CloningModel {
    /// Compute speaker conditioning from `reference` (already at
    /// [`SAMPLE_RATE`]).
    fn condition(&mut self, reference: &Waveform) -> Result<()>;

    /// Speak `text` in the conditioned voice.
    fn speak(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Forget the conditioning and any cached per-request tensors.
    fn release(&mut self);
}

/// Builds a [`CloningModel`] on a given device.
pub trait CloningModelLoader {
    type Model: CloningModel;

    fn load(&self, device: ComputeDevice) -> Result<Self::Model>;
}

pub struct ClonedVoiceEngine<L: CloningModelLoader> {
    loader: L,
    device: ComputeDevice,
    model: Option<L::Model>,
    conditioned_on: Option<PathBuf>,
    max_phase_chars: usize,
}

impl<L: CloningModelLoader> ClonedVoiceEngine<L> {
    pub fn new(loader: L, device: ComputeDevice) -> Self {
        Self {
            loader,
            device,
            model: None,
            conditioned_on: None,
            max_phase_chars: DEFAULT_MAX_PHASE_CHARS,
        }
    }

    /// Resolve the device through `probe` unless `forced` names one.
    pub fn with_probe(loader: L, probe: &dyn DeviceProbe, forced: Option<ComputeDevice>) -> Self {
        let device = forced.unwrap_or_else(|| ComputeDevice::resolve(probe));
        tracing::info!(%device, forced = forced.is_some(), "cloned-voice device selected");
        Self::new(loader, device)
    }

    pub fn with_max_phase_chars(mut self, max_phase_chars: usize) -> Self {
        self.max_phase_chars = max_phase_chars.max(1);
        self
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn loaded_model(&mut self) -> Result<&mut L::Model> {
        if self.model.is_none() {
            let model = match self.loader.load(self.device) {
                Ok(m) => m,
                Err(e) if self.device.is_accelerated() => {
                    tracing::warn!(device = %self.device, error = %format!("{e:#}"), "model load failed, falling back to CPU");
                    self.device = ComputeDevice::Cpu;
                    self.loader.load(ComputeDevice::Cpu)?
                }
                Err(e) => return Err(e),
            };
            tracing::info!(device = %self.device, "cloning model loaded");
            self.model = Some(model);
        }
        match self.model.as_mut() {
            Some(m) => Ok(m),
            None => anyhow::bail!("cloning model missing after load"),
        }
    }
}

impl<L: CloningModelLoader> SynthesisBackend for ClonedVoiceEngine<L> {
    fn name(&self) -> &'static str {
        "cloned-voice"
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn pause_duration(&self) -> f32 {
        PAUSE_SECS
    }

    fn synthesize(&mut self, text: &str, voice: &VoiceConfig) -> Result<Waveform, SynthesisError> {
        let VoiceConfig::Reference(reference) = voice else {
            return Err(SynthesisError::VoiceConfig("cloned voice needs a reference clip".into()));
        };
        let text = clean_for_speech(text);
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let needs_conditioning = self.conditioned_on.as_deref() != Some(reference.path());
        let phases = split_into_phases(&text, self.max_phase_chars);
        let model = self.loaded_model().map_err(SynthesisError::Model)?;

        if needs_conditioning {
            let clip = reference.waveform().resample(SAMPLE_RATE);
            model.condition(&clip).map_err(SynthesisError::Model)?;
        }

        let mut parts = Vec::with_capacity(phases.len());
        for (i, phase) in phases.iter().enumerate() {
            tracing::debug!(phase = i + 1, of = phases.len(), chars = phase.len(), "speaking phase");
            let samples = model.speak(phase).map_err(SynthesisError::Model)?;
            parts.push(Waveform::new(samples, SAMPLE_RATE));
        }

        if needs_conditioning {
            self.conditioned_on = Some(reference.path().to_path_buf());
        }

        Waveform::join_with_pause(&parts, PHASE_PAUSE_SECS)
            .map_err(|e| SynthesisError::Model(e.into()))
    }

    fn end_run(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.release();
        }
        self.conditioned_on = None;
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::Path, rc::Rc};

    use super::*;
    use crate::audio::WavClip;
    use crate::synth::ReferenceAudio;

    #[derive(Default)]
    struct Log {
        loads: Vec<ComputeDevice>,
        conditions: usize,
        spoken: Vec<String>,
        releases: usize,
    }

    struct FakeModel(Rc<RefCell<Log>>);

    impl CloningModel for FakeModel {
        fn condition(&mut self, reference: &Waveform) -> Result<()> {
            assert_eq!(reference.sample_rate(), SAMPLE_RATE);
            self.0.borrow_mut().conditions += 1;
            Ok(())
        }

        fn speak(&mut self, text: &str) -> Result<Vec<f32>> {
            self.0.borrow_mut().spoken.push(text.to_string());
            Ok(vec![0.2; 100])
        }

        fn release(&mut self) {
            self.0.borrow_mut().releases += 1;
        }
    }

    struct FakeLoader {
        log: Rc<RefCell<Log>>,
        fails_on: Vec<ComputeDevice>,
    }

    impl CloningModelLoader for FakeLoader {
        type Model = FakeModel;

        fn load(&self, device: ComputeDevice) -> Result<FakeModel> {
            self.log.borrow_mut().loads.push(device);
            if self.fails_on.contains(&device) {
                anyhow::bail!("no {device} runtime");
            }
            Ok(FakeModel(self.log.clone()))
        }
    }

    fn engine(device: ComputeDevice, fails_on: Vec<ComputeDevice>) -> (ClonedVoiceEngine<FakeLoader>, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let loader = FakeLoader { log: log.clone(), fails_on };
        (ClonedVoiceEngine::new(loader, device), log)
    }

    fn reference(name: &str) -> VoiceConfig {
        let clip = WavClip { sample_rate: 16_000, channels: vec![vec![0.3; 16_000 * 8]] };
        VoiceConfig::Reference(ReferenceAudio::from_clip(Path::new(name), clip).unwrap())
    }

    #[test]
    fn test_capabilities() {
        let (e, _) = engine(ComputeDevice::Cpu, vec![]);
        assert_eq!(e.sample_rate(), 22_050);
        assert_eq!(e.pause_duration(), 0.5);
        assert!(!e.is_loaded());
    }

    #[test]
    fn test_builtin_voice_rejected() {
        let (mut e, log) = engine(ComputeDevice::Cpu, vec![]);
        let err = e.synthesize("Hello.", &VoiceConfig::Builtin("Jasper".into())).unwrap_err();
        assert!(matches!(err, SynthesisError::VoiceConfig(_)));
        assert!(log.borrow().loads.is_empty());
    }

    #[test]
    fn test_blank_text_rejected() {
        let (mut e, _) = engine(ComputeDevice::Cpu, vec![]);
        let err = e.synthesize(" ", &reference("a.wav")).unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyText));
    }

    #[test]
    fn test_conditions_once_per_run_and_releases() {
        let (mut e, log) = engine(ComputeDevice::Cpu, vec![]);
        let voice = reference("a.wav");
        e.synthesize("First segment.", &voice).unwrap();
        e.synthesize("Second segment.", &voice).unwrap();
        assert_eq!(log.borrow().conditions, 1);
        assert_eq!(log.borrow().loads, vec![ComputeDevice::Cpu]);

        e.end_run();
        assert_eq!(log.borrow().releases, 1);

        e.synthesize("Next run.", &voice).unwrap();
        assert_eq!(log.borrow().conditions, 2);
        assert_eq!(log.borrow().loads.len(), 1, "weights stay loaded across runs");
    }

    #[test]
    fn test_falls_back_to_cpu() {
        let (mut e, log) = engine(ComputeDevice::Cuda, vec![ComputeDevice::Cuda]);
        e.synthesize("Hello there.", &reference("a.wav")).unwrap();
        assert_eq!(log.borrow().loads, vec![ComputeDevice::Cuda, ComputeDevice::Cpu]);
        assert_eq!(e.device(), ComputeDevice::Cpu);
    }

    #[test]
    fn test_cpu_failure_is_reported() {
        let (mut e, _) = engine(ComputeDevice::Cpu, vec![ComputeDevice::Cpu]);
        let err = e.synthesize("Hello there.", &reference("a.wav")).unwrap_err();
        assert!(err.to_string().contains("no cpu runtime"));
    }

    #[test]
    fn test_long_segment_split_into_phases() {
        let (e, log) = engine(ComputeDevice::Cpu, vec![]);
        let mut e = e.with_max_phase_chars(30);
        let text = "This is sentence one. This is sentence two. This is sentence three.";
        let w = e.synthesize(text, &reference("a.wav")).unwrap();

        let spoken = log.borrow().spoken.clone();
        assert_eq!(spoken.len(), 3);
        let gap = crate::audio::pause_samples(PHASE_PAUSE_SECS, SAMPLE_RATE);
        assert_eq!(w.len(), 3 * 100 + 2 * gap);
        assert_eq!(w.sample_rate(), SAMPLE_RATE);
    }
}
