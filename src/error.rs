//! Error taxonomy for a podcast run.
//!
//! Every failure aborts the current run and reaches the caller as a
//! [`PodcastError`].  [`PodcastError::stage`] tells which pipeline stage gave
//! up; synthesis failures also carry the index of the offending segment.

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::audio::SampleRateMismatch;

/// Pipeline stage a [`PodcastError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Source,
    Reference,
    Script,
    Synthesis,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Config => "config",
            Stage::Source => "source",
            Stage::Reference => "reference",
            Stage::Script => "script",
            Stage::Synthesis => "synthesis",
            Stage::Persist => "persist",
        })
    }
}

/// Failure of the language-model call or of parsing its answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("language model request failed: {0}")]
    Transport(String),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse a script from the model output: {0}")]
    Malformed(String),

    #[error("model produced a degenerate script: {0}")]
    Degenerate(String),

    #[error("language model is not configured: {0}")]
    NotConfigured(String),
}

/// Failure of a synthesis backend on one segment.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("segment text is empty")]
    EmptyText,

    #[error("wrong voice configuration: {0}")]
    VoiceConfig(String),

    #[error("backend returned {got} Hz audio, expected {expected} Hz")]
    SampleRate { expected: u32, got: u32 },

    #[error("model failed: {0:#}")]
    Model(anyhow::Error),
}

/// Everything that can abort a run.
#[derive(Debug, Error)]
pub enum PodcastError {
    #[error("{0}")]
    Config(String),

    #[error("source '{0}' not found")]
    SourceNotFound(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("script generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid reference audio {}: {reason}", path.display())]
    InvalidReferenceAudio { path: PathBuf, reason: String },

    #[error("synthesis failed on segment {index}: {source}")]
    Synthesis {
        index: usize,
        #[source]
        source: SynthesisError,
    },

    /// Segments could not be stitched into one waveform.
    #[error("cannot stitch segments: {0}")]
    Assembly(#[from] SampleRateMismatch),

    #[error("cannot write {}: {cause:#}", path.display())]
    Persistence { path: PathBuf, cause: anyhow::Error },

    #[error("run cancelled after {completed} segment(s)")]
    Cancelled { completed: usize },
}

impl PodcastError {
    pub fn stage(&self) -> Stage {
        match self {
            PodcastError::Config(_) => Stage::Config,
            PodcastError::SourceNotFound(_) | PodcastError::InvalidSource(_) => Stage::Source,
            PodcastError::InvalidReferenceAudio { .. } => Stage::Reference,
            PodcastError::Generation(_) => Stage::Script,
            PodcastError::Synthesis { .. }
            | PodcastError::Assembly(_)
            | PodcastError::Cancelled { .. } => Stage::Synthesis,
            PodcastError::Persistence { .. } => Stage::Persist,
        }
    }

    /// Segment index for per-segment failures.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            PodcastError::Synthesis { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn reference(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PodcastError::InvalidReferenceAudio { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, cause: impl Into<anyhow::Error>) -> Self {
        PodcastError::Persistence { path: path.into(), cause: cause.into() }
    }
}

pub type Result<T> = std::result::Result<T, PodcastError>;
