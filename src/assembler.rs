//! The podcast pipeline: source → script → per-segment audio → files.
//!
//! A run is strictly sequential.  Any failure aborts it; nothing is written
//! until every segment has been synthesised, and a run directory that could
//! not be completed is removed (or left with an `.incomplete` marker if even
//! that fails).

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::audio::Waveform;
use crate::error::{PodcastError, Result, Stage, SynthesisError};
use crate::llm::LanguageModel;
use crate::script::{Script, ScriptGenerator, Style, TargetDuration};
use crate::source::SourceStore;
use crate::synth::{ReferenceAudio, SynthesisBackend, VoiceConfig};

pub const COMBINED_FILE: &str = "complete_podcast.wav";
pub const SCRIPT_FILE: &str = "podcast_script.json";
pub const INCOMPLETE_MARKER: &str = ".incomplete";

/// File name of the segment at `index` (numbered from 1 on disk).
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{:03}_speaker.wav", index + 1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    #[default]
    DefaultVoice,
    ClonedVoice,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::DefaultVoice => "default_voice",
            Engine::ClonedVoice => "cloned_voice",
        })
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default_voice" | "default" => Ok(Engine::DefaultVoice),
            "cloned_voice" | "cloned" | "clone" => Ok(Engine::ClonedVoice),
            other => Err(format!("unknown engine '{other}' (expected default_voice or cloned_voice)")),
        }
    }
}

/// One podcast to produce.  `reference_audio` is needed for
/// [`Engine::ClonedVoice`] and ignored otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub source_id: String,
    pub style: Style,
    pub duration: TargetDuration,
    pub engine: Engine,
    #[serde(default)]
    pub reference_audio: Option<PathBuf>,
    /// Built-in voice for the default engine; its configured voice when unset.
    #[serde(default)]
    pub voice: Option<String>,
}

impl GenerationRequest {
    pub fn new(source_id: impl Into<String>, style: Style, duration: TargetDuration) -> Self {
        Self {
            source_id: source_id.into(),
            style,
            duration,
            engine: Engine::DefaultVoice,
            reference_audio: None,
            voice: None,
        }
    }

    pub fn cloned(mut self, reference_audio: impl Into<PathBuf>) -> Self {
        self.engine = Engine::ClonedVoice;
        self.reference_audio = Some(reference_audio.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

/// Progress callbacks for a run.  Returning [`Flow::Abort`] from
/// [`on_segment`](Self::on_segment) stops the run before the next segment.
pub trait RunObserver {
    fn on_stage(&mut self, _stage: Stage) {}

    fn on_segment(&mut self, _done: usize, _total: usize) -> Flow {
        Flow::Continue
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

// ─────────────────────────────────────────────────────────────────────────────
// Run result
// ─────────────────────────────────────────────────────────────────────────────

/// A finished, persisted run.
#[derive(Debug, Clone)]
pub struct PodcastRun {
    pub run_id: String,
    pub engine: Engine,
    pub script: Script,
    pub segment_waveforms: Vec<Waveform>,
    pub combined: Waveform,
    pub dir: PathBuf,
    pub segment_files: Vec<PathBuf>,
    pub combined_file: PathBuf,
    pub script_file: PathBuf,
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembler
// ─────────────────────────────────────────────────────────────────────────────

pub struct PodcastAssembler<S, L> {
    sources: S,
    generator: ScriptGenerator<L>,
    default_voice: Box<dyn SynthesisBackend>,
    cloned_voice: Option<Box<dyn SynthesisBackend>>,
    output_root: PathBuf,
}

impl<S: SourceStore, L: LanguageModel> PodcastAssembler<S, L> {
    pub fn new(
        sources: S,
        generator: ScriptGenerator<L>,
        default_voice: Box<dyn SynthesisBackend>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            generator,
            default_voice,
            cloned_voice: None,
            output_root: output_root.into(),
        }
    }

    pub fn with_cloned_voice(mut self, backend: Box<dyn SynthesisBackend>) -> Self {
        self.cloned_voice = Some(backend);
        self
    }

    /// Script only, without synthesis or files.
    pub fn script(&self, source_id: &str, style: Style, duration: TargetDuration) -> Result<Script> {
        let source = self
            .sources
            .get(source_id)
            .ok_or_else(|| PodcastError::SourceNotFound(source_id.to_string()))?;
        Ok(self.generator.generate(&source.id, &source.text, style, duration)?)
    }

    pub fn run(&mut self, request: &GenerationRequest) -> Result<PodcastRun> {
        self.run_with(request, &mut NoopObserver)
    }

    pub fn run_with(
        &mut self,
        request: &GenerationRequest,
        observer: &mut dyn RunObserver,
    ) -> Result<PodcastRun> {
        tracing::info!(
            source_id = %request.source_id,
            style = %request.style,
            minutes = request.duration.minutes(),
            engine = %request.engine,
            "podcast run started"
        );

        observer.on_stage(Stage::Source);
        let source = self
            .sources
            .get(&request.source_id)
            .ok_or_else(|| PodcastError::SourceNotFound(request.source_id.clone()))?;
        let (source_id, text) = (source.id.clone(), source.text.clone());

        observer.on_stage(Stage::Reference);
        let voice = self.voice_for(request)?;

        observer.on_stage(Stage::Script);
        let script = self.generator.generate(&source_id, &text, request.style, request.duration)?;

        observer.on_stage(Stage::Synthesis);
        let backend: &mut dyn SynthesisBackend = match request.engine {
            Engine::DefaultVoice => self.default_voice.as_mut(),
            Engine::ClonedVoice => match self.cloned_voice.as_mut() {
                Some(b) => b.as_mut(),
                None => return Err(not_configured()),
            },
        };
        let segments = synthesize_all(backend, &script, &voice, observer);
        backend.end_run();
        let segment_waveforms = segments?;

        // Rates were checked per segment, so stitching only fails on a backend bug.
        let combined = Waveform::join_with_pause(&segment_waveforms, backend.pause_duration())?;
        tracing::info!(
            segments = segment_waveforms.len(),
            secs = combined.duration_secs(),
            sample_rate = combined.sample_rate(),
            "podcast audio assembled"
        );

        observer.on_stage(Stage::Persist);
        let run = persist(&self.output_root, request.engine, script, segment_waveforms, combined)?;
        tracing::info!(run_id = %run.run_id, dir = %run.dir.display(), "podcast run finished");
        Ok(run)
    }

    fn voice_for(&self, request: &GenerationRequest) -> Result<VoiceConfig> {
        match request.engine {
            Engine::DefaultVoice => {
                if request.reference_audio.is_some() {
                    tracing::debug!("default voice ignores the reference clip");
                }
                Ok(VoiceConfig::Builtin(request.voice.clone().unwrap_or_default()))
            }
            Engine::ClonedVoice => {
                if self.cloned_voice.is_none() {
                    return Err(not_configured());
                }
                let path = request
                    .reference_audio
                    .as_deref()
                    .ok_or_else(|| PodcastError::reference(PathBuf::new(), "no reference clip given"))?;
                Ok(VoiceConfig::Reference(ReferenceAudio::load(path)?))
            }
        }
    }
}

fn not_configured() -> PodcastError {
    PodcastError::Config("cloned-voice engine is not configured".into())
}

fn synthesize_all(
    backend: &mut dyn SynthesisBackend,
    script: &Script,
    voice: &VoiceConfig,
    observer: &mut dyn RunObserver,
) -> Result<Vec<Waveform>> {
    let total = script.len();
    let expected = backend.sample_rate();
    let mut waves = Vec::with_capacity(total);

    for segment in script.segments() {
        tracing::info!(backend = backend.name(), segment = segment.index + 1, of = total, "synthesising");
        let fail = |source| PodcastError::Synthesis { index: segment.index, source };

        let wave = backend.synthesize(&segment.text, voice).map_err(fail)?;
        if wave.sample_rate() != expected {
            return Err(fail(SynthesisError::SampleRate { expected, got: wave.sample_rate() }));
        }
        waves.push(wave);

        if observer.on_segment(waves.len(), total) == Flow::Abort {
            tracing::warn!(completed = waves.len(), "run cancelled");
            return Err(PodcastError::Cancelled { completed: waves.len() });
        }
    }
    Ok(waves)
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// A freshly created run directory, marked incomplete until [`finish`](Self::finish).
struct RunDir {
    run_id: String,
    path: PathBuf,
}

impl RunDir {
    /// Create `podcast_YYYYMMDD_HHMMSS`, or the first free `_N` variant.
    fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| PodcastError::persistence(root, e))?;
        let base = format!("podcast_{}", Local::now().format("%Y%m%d_%H%M%S"));

        let mut n = 0u32;
        loop {
            let run_id = if n == 0 { base.clone() } else { format!("{base}_{n}") };
            let path = root.join(&run_id);
            match fs::create_dir(&path) {
                Ok(()) => {
                    let marker = path.join(INCOMPLETE_MARKER);
                    let dir = Self { run_id, path };
                    if let Err(e) = fs::write(&marker, b"") {
                        dir.discard();
                        return Err(PodcastError::persistence(marker, e));
                    }
                    return Ok(dir);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(PodcastError::persistence(path, e)),
            }
        }
    }

    fn finish(&self) -> Result<()> {
        let marker = self.path.join(INCOMPLETE_MARKER);
        fs::remove_file(&marker).map_err(|e| PodcastError::persistence(marker, e))
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            tracing::warn!(dir = %self.path.display(), error = %e, "could not remove incomplete run directory");
        }
    }
}

fn persist(
    root: &Path,
    engine: Engine,
    script: Script,
    segment_waveforms: Vec<Waveform>,
    combined: Waveform,
) -> Result<PodcastRun> {
    write_into(RunDir::create(root)?, engine, script, segment_waveforms, combined)
}

/// Write every artifact into `dir`; on failure the directory is discarded.
fn write_into(
    dir: RunDir,
    engine: Engine,
    script: Script,
    segment_waveforms: Vec<Waveform>,
    combined: Waveform,
) -> Result<PodcastRun> {
    match write_artifacts(&dir.path, &script, &segment_waveforms, &combined).and_then(|files| {
        dir.finish()?;
        Ok(files)
    }) {
        Ok((segment_files, combined_file, script_file)) => Ok(PodcastRun {
            run_id: dir.run_id.clone(),
            engine,
            script,
            segment_waveforms,
            combined,
            dir: dir.path.clone(),
            segment_files,
            combined_file,
            script_file,
        }),
        Err(e) => {
            dir.discard();
            Err(e)
        }
    }
}

fn write_artifacts(
    dir: &Path,
    script: &Script,
    segments: &[Waveform],
    combined: &Waveform,
) -> Result<(Vec<PathBuf>, PathBuf, PathBuf)> {
    let mut segment_files = Vec::with_capacity(segments.len());
    for (index, wave) in segments.iter().enumerate() {
        let path = dir.join(segment_file_name(index));
        wave.write_wav(&path).map_err(|e| PodcastError::persistence(&path, e))?;
        segment_files.push(path);
    }

    let combined_file = dir.join(COMBINED_FILE);
    combined
        .write_wav(&combined_file)
        .map_err(|e| PodcastError::persistence(&combined_file, e))?;

    let script_file = dir.join(SCRIPT_FILE);
    let json = script.to_json().map_err(|e| PodcastError::persistence(&script_file, e))?;
    fs::write(&script_file, json).map_err(|e| PodcastError::persistence(&script_file, e))?;

    Ok((segment_files, combined_file, script_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_names() {
        assert_eq!(segment_file_name(0), "segment_001_speaker.wav");
        assert_eq!(segment_file_name(41), "segment_042_speaker.wav");
        assert_eq!(segment_file_name(1000), "segment_1001_speaker.wav");
    }

    #[test]
    fn test_engine_parsing() {
        assert_eq!("cloned-voice".parse::<Engine>().unwrap(), Engine::ClonedVoice);
        assert_eq!("default".parse::<Engine>().unwrap(), Engine::DefaultVoice);
        assert!("robot".parse::<Engine>().is_err());
        assert_eq!(serde_json::to_string(&Engine::ClonedVoice).unwrap(), "\"cloned_voice\"");
    }

    #[test]
    fn test_run_dirs_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let a = RunDir::create(root.path()).unwrap();
        let b = RunDir::create(root.path()).unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.run_id.starts_with("podcast_"));
        assert!(a.path.join(INCOMPLETE_MARKER).exists());

        a.finish().unwrap();
        assert!(!a.path.join(INCOMPLETE_MARKER).exists());
        b.discard();
        assert!(!b.path.exists());
    }

    #[test]
    fn test_persist_layout() {
        let root = tempfile::tempdir().unwrap();
        let script = Script::new(
            "src-1",
            Style::Educational,
            TargetDuration::Five,
            vec!["One.".to_string(), "Two.".to_string()],
        );
        let waves = vec![Waveform::new(vec![0.1; 10], 24_000), Waveform::new(vec![0.2; 20], 24_000)];
        let combined = Waveform::join_with_pause(&waves, 0.2).unwrap();

        let run = persist(root.path(), Engine::DefaultVoice, script, waves, combined).unwrap();
        let mut names: Vec<String> = fs::read_dir(&run.dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![COMBINED_FILE, SCRIPT_FILE, "segment_001_speaker.wav", "segment_002_speaker.wav"]
        );
    }

    #[test]
    fn test_failed_write_discards_run_dir() {
        let root = tempfile::tempdir().unwrap();
        let script =
            Script::new("src-1", Style::Educational, TargetDuration::Five, vec!["One.".to_string()]);
        let waves = vec![Waveform::new(vec![0.1; 10], 24_000)];
        let combined = waves[0].clone();

        // A directory squatting on the combined file's name makes that write fail
        // after the segment file has already been written.
        let dir = RunDir::create(root.path()).unwrap();
        fs::create_dir(dir.path.join(COMBINED_FILE)).unwrap();
        fs::write(dir.path.join(COMBINED_FILE).join("keep"), b"x").unwrap();

        let err = write_into(dir, Engine::DefaultVoice, script, waves, combined).unwrap_err();
        assert!(matches!(err, PodcastError::Persistence { ref path, .. } if path.ends_with(COMBINED_FILE)));
        assert_eq!(err.stage(), Stage::Persist);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
