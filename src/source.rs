//! Narration sources: pasted text or scraped pages, keyed by id.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{PodcastError, Result};
use crate::text::word_count;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "url")]
pub enum SourceOrigin {
    Text,
    Url(String),
}

/// An immutable piece of source material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub text: String,
    pub origin: SourceOrigin,
    pub added_at: DateTime<Local>,
}

impl Source {
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Lookup side of a source store — all the pipeline needs.
pub trait SourceStore {
    fn get(&self, id: &str) -> Option<&Source>;
}

/// In-process store used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    sources: Vec<Source>,
    next_id: u64,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add pasted text.  A blank `name` becomes `Text (HH:MM)`.
    pub fn add_text(&mut self, name: &str, text: &str) -> Result<&Source> {
        let now = Local::now();
        let name = match name.trim() {
            "" => format!("Text ({})", now.format("%H:%M")),
            n => n.to_string(),
        };
        self.insert(name, text, SourceOrigin::Text, now)
    }

    /// Add the content of a scraped page.
    pub fn add_scraped(&mut self, title: &str, url: &str, content: &str) -> Result<&Source> {
        let name = match title.trim() {
            "" => url.to_string(),
            t => t.to_string(),
        };
        self.insert(name, content, SourceOrigin::Url(url.to_string()), Local::now())
    }

    pub fn remove(&mut self, id: &str) -> Option<Source> {
        let pos = self.sources.iter().position(|s| s.id == id)?;
        let removed = self.sources.remove(pos);
        tracing::info!(id, name = %removed.name, "removed source");
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn insert(
        &mut self,
        name: String,
        text: &str,
        origin: SourceOrigin,
        added_at: DateTime<Local>,
    ) -> Result<&Source> {
        if text.trim().is_empty() {
            return Err(PodcastError::InvalidSource(format!("'{name}' has no text")));
        }
        self.next_id += 1;
        let source = Source {
            id: format!("src-{}", self.next_id),
            name,
            text: text.to_string(),
            origin,
            added_at,
        };
        tracing::info!(id = %source.id, name = %source.name, words = source.word_count(), "added source");
        self.sources.push(source);
        Ok(&self.sources[self.sources.len() - 1])
    }
}

impl SourceStore for MemorySourceStore {
    fn get(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }
}
