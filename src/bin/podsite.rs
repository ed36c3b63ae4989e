//! `podsite` — turn a text into a narrated podcast from the command line.
//!
//! Usage:
//!   podsite generate --file article.txt --style educational --duration 5
//!   podsite generate --text "The sun is a star." --engine cloned_voice --reference me.wav
//!   podsite script --file article.txt --style debate
//!
//! Requirements:
//!   - GROQ_API_KEY (or another OpenAI-compatible endpoint, see PODSITE_LLM_BASE_URL)
//!   - espeak-ng on $PATH (apk add espeak-ng / apt install espeak-ng)
//!   - Internet access for the first run (models are cached afterwards)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use podsite::{
    assembler::{Engine, Flow, GenerationRequest, PodcastAssembler, RunObserver},
    config::{self, AppConfig},
    device::OrtProbe,
    error::Stage,
    hub::ModelSource,
    llm::ChatClient,
    logging,
    phonemize::is_espeak_available,
    script::{ScriptGenerator, Style, TargetDuration},
    source::{MemorySourceStore, SourceStore},
    synth::{
        clone_onnx::OnnxClonerLoader, kitten::KittenModel, ClonedVoiceEngine, DefaultVoiceEngine,
    },
};

#[derive(Debug, Parser)]
#[command(name = "podsite", version, about = "Text-to-podcast generator")]
struct Cli {
    /// JSON config file (defaults to $PODSITE_CONFIG, then built-in defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the script and the audio.
    Generate {
        #[command(flatten)]
        input: Input,

        #[arg(long, default_value = "default_voice")]
        engine: Engine,

        /// Reference clip (5-30 s WAV) for the cloned voice.
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Built-in voice for the default engine.
        #[arg(long)]
        voice: Option<String>,

        /// Overrides the configured output root.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Generate the script only and print it as JSON.
    Script {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(Debug, Args)]
struct Input {
    /// Source text.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// File holding the source text.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Display name of the source.
    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "conversational")]
    style: Style,

    /// Target length in minutes: 5, 10, 15 or 20.
    #[arg(long, default_value = "10")]
    duration: TargetDuration,
}

impl Input {
    fn load_store(&self) -> Result<(MemorySourceStore, String)> {
        let (name, text) = match (&self.text, &self.file) {
            (Some(t), _) => (self.name.clone(), t.clone()),
            (None, Some(path)) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read source file: {}", path.display()))?;
                let name = if self.name.is_empty() {
                    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
                } else {
                    self.name.clone()
                };
                (name, text)
            }
            (None, None) => bail!("give the source with --text or --file"),
        };
        let mut store = MemorySourceStore::new();
        let id = store.add_text(&name, &text)?.id.clone();
        Ok((store, id))
    }
}

/// Prints one line per finished segment.
struct ConsoleProgress;

impl RunObserver for ConsoleProgress {
    fn on_stage(&mut self, stage: Stage) {
        eprintln!("» {stage}");
    }

    fn on_segment(&mut self, done: usize, total: usize) -> Flow {
        eprintln!("  segment {done}/{total}");
        Flow::Continue
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init(AppConfig::load(cli.config.as_deref())?);
    logging::init(&config.logging);

    match cli.command {
        Command::Script { input } => {
            let (store, id) = input.load_store()?;
            let source = store.get(&id).context("source vanished")?;
            let generator =
                ScriptGenerator::new(ChatClient::new(config.llm.clone())?, config.llm.max_source_chars);
            let script = generator.generate(&source.id, &source.text, input.style, input.duration)?;
            println!("{}", script.to_json()?);
        }
        Command::Generate { input, engine, reference, voice, output_dir } => {
            if !is_espeak_available() {
                eprintln!(
                    "WARNING: espeak-ng not found on $PATH.\n\
                     Install with:  apk add espeak-ng  (Alpine)\n\
                     Or:            apt install espeak-ng  (Debian/Ubuntu)\n\
                     Or:            brew install espeak-ng  (macOS)"
                );
            }

            let (store, id) = input.load_store()?;
            let generator =
                ScriptGenerator::new(ChatClient::new(config.llm.clone())?, config.llm.max_source_chars);

            let kitten = KittenModel::open(
                &ModelSource::parse(&config.default_voice.repo_id),
                config.default_voice.speed,
            )?;
            let default_voice = DefaultVoiceEngine::new(kitten, config.default_voice.voice.clone());

            let root = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let mut assembler = PodcastAssembler::new(store, generator, Box::new(default_voice), root);

            if engine == Engine::ClonedVoice {
                let model = config
                    .cloned_voice
                    .model
                    .as_deref()
                    .context("cloned voice needs a model: set cloned_voice.model or PODSITE_CLONE_MODEL")?;
                let loader = OnnxClonerLoader::fetch(&ModelSource::parse(model))?;
                let cloned = ClonedVoiceEngine::with_probe(loader, &OrtProbe, config.cloned_voice.device)
                    .with_max_phase_chars(config.cloned_voice.max_phase_chars);
                assembler = assembler.with_cloned_voice(Box::new(cloned));
            }

            let mut request = GenerationRequest::new(id, input.style, input.duration);
            request.engine = engine;
            request.reference_audio = reference;
            request.voice = voice;

            let run = assembler.run_with(&request, &mut ConsoleProgress)?;
            println!("Run      : {}", run.run_id);
            println!("Segments : {}", run.script.len());
            println!("Length   : {:.1} s", run.combined.duration_secs());
            println!("Podcast  : {}", run.combined_file.display());
            println!("Script   : {}", run.script_file.display());
        }
    }
    Ok(())
}
