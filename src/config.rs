//! Application configuration, loaded once at startup.
//!
//! Resolution order: built-in defaults → optional JSON file → environment
//! (including a `.env` file in the working directory).  The result is stored
//! process-wide with [`init`]; components get their section handed to them
//! and never read the environment themselves.

use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::device::ComputeDevice;
use crate::error::{PodcastError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completions endpoint used for script generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Never written back out; comes from `GROQ_API_KEY` or the file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL (no trailing `/chat/completions`).
    pub base_url: String,

    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,

    /// Source text beyond this many characters is not sent to the model.
    pub max_source_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: 120,
            max_source_chars: 8000,
        }
    }
}

/// Fixed-voice engine (KittenTTS ONNX).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultVoiceConfig {
    pub repo_id: String,
    pub voice: String,
    pub speed: f32,
}

impl Default for DefaultVoiceConfig {
    fn default() -> Self {
        Self {
            repo_id: "KittenML/kitten-tts-mini-0.8".to_string(),
            voice: "Jasper".to_string(),
            speed: 1.0,
        }
    }
}

/// Voice-cloning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClonedVoiceConfig {
    /// Local directory or HuggingFace repository holding `config.json` and
    /// the two ONNX graphs.  Unset means the engine is unavailable.
    pub model: Option<String>,

    /// Skip probing and use this device.
    pub device: Option<ComputeDevice>,

    /// Longer segments are synthesised in pieces of about this many chars.
    pub max_phase_chars: usize,
}

impl Default for ClonedVoiceConfig {
    fn default() -> Self {
        Self { model: None, device: None, max_phase_chars: 800 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub default_voice: DefaultVoiceConfig,
    pub cloned_voice: ClonedVoiceConfig,
    pub logging: LogConfig,

    /// Run directories are created below this root.
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            default_voice: DefaultVoiceConfig::default(),
            cloned_voice: ClonedVoiceConfig::default(),
            logging: LogConfig::default(),
            output_dir: PathBuf::from("podcast_outputs"),
        }
    }
}

impl AppConfig {
    /// Parse a JSON config file.  Missing fields take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Full startup load: `.env`, then `path` (or `$PODSITE_CONFIG`), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PODSITE_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(p) => Self::from_file(&p).map_err(|e| PodcastError::Config(format!("{e:#}")))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PODSITE_*` / `GROQ_API_KEY` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GROQ_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("PODSITE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("PODSITE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("PODSITE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("PODSITE_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = get("PODSITE_VOICE") {
            self.default_voice.voice = v;
        }
        if let Some(v) = get("PODSITE_CLONE_MODEL") {
            self.cloned_voice.model = Some(v);
        }
        if let Some(v) = get("PODSITE_DEVICE") {
            let device = v.parse::<ComputeDevice>().map_err(PodcastError::Config)?;
            self.cloned_voice.device = Some(device);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide instance
// ─────────────────────────────────────────────────────────────────────────────

static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// Install the process-wide configuration.  Only the first call wins; later
/// calls get the already-installed value back.
pub fn init(config: AppConfig) -> &'static AppConfig {
    if CONFIG.get().is_some() {
        tracing::warn!("configuration already initialised; ignoring reload");
    }
    CONFIG.get_or_init(|| config)
}

/// The configuration installed by [`init`], if any.
pub fn get() -> Option<&'static AppConfig> {
    CONFIG.get()
}
