//! Synthesis backends: one text segment in, one mono waveform out.
//!
//! | Engine                         | Voice                     | Rate      | Pause  |
//! |--------------------------------|---------------------------|-----------|--------|
//! | [`DefaultVoiceEngine`]         | built-in voice name       | 24 000 Hz | 0.2 s  |
//! | [`ClonedVoiceEngine`]          | 5–30 s reference clip     | 22 050 Hz | 0.5 s  |
//!
//! Both sit behind [`SynthesisBackend`]; the assembler never looks past it.
//! The neural models themselves are further traits ([`NarrationModel`],
//! [`CloningModelLoader`]) so the ONNX implementations can be swapped out.

pub mod cloned_voice;
pub mod default_voice;
pub mod reference;

#[cfg(feature = "onnx")]
pub mod clone_onnx;
#[cfg(feature = "onnx")]
pub mod kitten;

pub use cloned_voice::{ClonedVoiceEngine, CloningModel, CloningModelLoader};
pub use default_voice::{DefaultVoiceEngine, NarrationModel};
pub use reference::ReferenceAudio;

use crate::audio::Waveform;
use crate::error::SynthesisError;

/// How the voice for a run is chosen.
#[derive(Debug, Clone)]
pub enum VoiceConfig {
    /// A voice shipped with the model, by name.
    Builtin(String),
    /// Clone the speaker of a validated reference clip.
    Reference(ReferenceAudio),
}

/// A text-to-speech engine usable by the assembler.
pub trait SynthesisBackend {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Rate of every waveform this backend returns.
    fn sample_rate(&self) -> u32;

    /// Silence inserted between consecutive segments, in seconds.
    fn pause_duration(&self) -> f32;

    /// Render one segment.  Blank text is rejected with
    /// [`SynthesisError::EmptyText`].
    fn synthesize(&mut self, text: &str, voice: &VoiceConfig) -> Result<Waveform, SynthesisError>;

    /// Drop per-run model state.  Called once after every run, whether it
    /// succeeded or not.
    fn end_run(&mut self) {}
}
