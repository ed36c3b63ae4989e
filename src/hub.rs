//! Model file resolution: a local directory or a HuggingFace Hub repository.
//!
//! Hub downloads are cached in the HuggingFace cache directory
//! (`~/.cache/huggingface/hub` by default).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use serde::de::DeserializeOwned;

/// Where a model's `config.json` and weight files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Dir(PathBuf),
    Hub(String),
}

impl ModelSource {
    /// An existing directory is used as-is; anything else is a repo id.
    /// Bare names (`kitten-tts-mini-0.8`) are expanded under `KittenML/`.
    pub fn parse(spec: &str) -> Self {
        let path = Path::new(spec);
        if path.is_dir() {
            return ModelSource::Dir(path.to_path_buf());
        }
        if spec.contains('/') {
            ModelSource::Hub(spec.to_string())
        } else {
            ModelSource::Hub(format!("KittenML/{spec}"))
        }
    }

    /// Local path of `filename`, downloading it first for Hub sources.
    pub fn fetch(&self, filename: &str) -> Result<PathBuf> {
        match self {
            ModelSource::Dir(dir) => {
                let path = dir.join(filename);
                if !path.is_file() {
                    anyhow::bail!("'{}' not found in {}", filename, dir.display());
                }
                Ok(path)
            }
            ModelSource::Hub(repo_id) => {
                tracing::info!(repo_id = %repo_id, filename, "fetching model file");
                let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;
                api.model(repo_id.clone())
                    .get(filename)
                    .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
            }
        }
    }

    /// Fetch and parse the source's `config.json`.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.fetch("config.json")?;
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes).context("Failed to parse config.json")
    }
}
