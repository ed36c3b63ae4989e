//! # podsite
//!
//! Turns a piece of text into a narrated podcast: a language model writes a
//! single-speaker script, a text-to-speech engine reads it segment by
//! segment, and the result is stitched into one WAV file next to the
//! per-segment files and the script itself.
//!
//! ## Quick start
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use podsite::{
//!     assembler::{GenerationRequest, PodcastAssembler},
//!     config::AppConfig,
//!     hub::ModelSource,
//!     llm::ChatClient,
//!     script::{ScriptGenerator, Style, TargetDuration},
//!     source::MemorySourceStore,
//!     synth::{kitten::KittenModel, DefaultVoiceEngine},
//! };
//!
//! let config = podsite::config::init(AppConfig::load(None)?);
//!
//! let mut sources = MemorySourceStore::new();
//! let id = sources.add_text("Sun", "The sun is a star.")?.id.clone();
//!
//! let generator = ScriptGenerator::new(ChatClient::new(config.llm.clone())?, config.llm.max_source_chars);
//! let kitten = KittenModel::open(&ModelSource::parse(&config.default_voice.repo_id), 1.0)?;
//! let voice = DefaultVoiceEngine::new(kitten, config.default_voice.voice.clone());
//!
//! let mut assembler = PodcastAssembler::new(sources, generator, Box::new(voice), &config.output_dir);
//! let run = assembler.run(&GenerationRequest::new(id, Style::Educational, TargetDuration::Five))?;
//! println!("{}", run.combined_file.display());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "onnx"))]
//! # fn main() {}
//! ```
//!
//! ## Pipeline
//! 1. **Source lookup** in a [`source::SourceStore`].
//! 2. **Reference check** for the cloned voice (5–30 s, single speaker).
//! 3. **Script** from the language model ([`script::ScriptGenerator`]).
//! 4. **Synthesis**, one segment at a time, through a [`synth::SynthesisBackend`].
//! 5. **Stitching** with the backend's pause between segments.
//! 6. **Persistence** into a fresh `podcast_YYYYMMDD_HHMMSS` directory.
//!
//! ## Runtime requirements (feature `onnx`)
//! | Need                | Why                                              |
//! |---------------------|--------------------------------------------------|
//! | `espeak-ng` on PATH | phonemes for both ONNX models                    |
//! | network, first run  | model files from the HuggingFace Hub (cached)    |
//! | `GROQ_API_KEY`      | script generation (any OpenAI-compatible server) |

pub mod assembler;
pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod llm;
pub mod logging;
pub mod script;
pub mod source;
pub mod synth;
pub mod text;

#[cfg(feature = "onnx")]
pub mod hub;
#[cfg(feature = "onnx")]
pub mod phonemize;
#[cfg(feature = "onnx")]
pub mod tokenize;
#[cfg(feature = "onnx")]
pub mod voices;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use assembler::{Engine, GenerationRequest, PodcastAssembler, PodcastRun};
pub use audio::Waveform;
pub use error::{PodcastError, Result, Stage};
pub use script::{Script, Style, TargetDuration};
