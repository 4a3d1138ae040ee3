//! Voicefy terminal studio
//!
//! Generates speech for a line of text, plays it with a live frequency visualizer, and manages
//! the on-disk clip library.

mod terminal;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use terminal::TerminalSurface;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voicefy_core::{Language, Library, PersonaCatalog, StudioConfig, DEFAULT_PERSONA};
use voicefy_voice::download::HISTORY_PREFIX;
use voicefy_voice::{
    ClientHandle, CompressedEncoder, DownloadArtifact, DownloadFormat, GenerationRequest,
    HeadlessOutput, OutputDevice, Pace, PlaybackState, RodioOutput, SampleBuffer, VoiceError,
    VoiceStudio, Visualizer,
};

const VISUALIZER_COLS: usize = 64;
const VISUALIZER_ROWS: usize = 8;
/// Longest wait for the device to play out its buffered tail.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_POLL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "voicefy", version, about = "Text-to-speech studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate speech and play it
    Speak(SpeakArgs),
    /// Rewrite text in a persona's style
    Refine {
        text: String,
        #[arg(long, default_value = DEFAULT_PERSONA)]
        persona: String,
    },
    /// Translate text
    Translate {
        text: String,
        #[arg(long, value_parser = parse_language)]
        language: Language,
    },
    /// List featured personas
    Personas {
        #[arg(long)]
        search: Option<String>,
    },
    /// Saved clips
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
}

#[derive(Args)]
struct SpeakArgs {
    text: String,
    #[arg(long, default_value = DEFAULT_PERSONA)]
    persona: String,
    #[arg(long, value_parser = parse_language, default_value = "English")]
    language: Language,
    #[arg(long, default_value_t = 1.0)]
    speed: f32,
    /// Faster, lower-quality speech model
    #[arg(long)]
    turbo: bool,
    /// Skip the sound card
    #[arg(long)]
    no_audio: bool,
    /// Save the clip to the library
    #[arg(long)]
    save: bool,
    /// Also write the clip to the download directory
    #[arg(long, value_parser = parse_format)]
    download: Option<DownloadFormat>,
}

#[derive(Subcommand)]
enum LibraryAction {
    List,
    Play {
        id: String,
        #[arg(long)]
        no_audio: bool,
    },
    Delete {
        id: String,
    },
    Export {
        id: String,
        #[arg(long, value_parser = parse_format, default_value = "wav")]
        format: DownloadFormat,
    },
}

fn parse_language(raw: &str) -> Result<Language, String> {
    raw.parse().map_err(|e: voicefy_core::CoreError| e.to_string())
}

fn parse_format(raw: &str) -> Result<DownloadFormat, String> {
    raw.parse()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[voicefy] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = StudioConfig::load().context("load StudioConfig")?;

    match run(cli.command, &config).await {
        Err(e) => match e.downcast_ref::<VoiceError>() {
            Some(voice) => {
                tracing::debug!(error = %voice, "command failed");
                eprintln!("{}", voice.notice());
                std::process::exit(1);
            }
            None => Err(e),
        },
        ok => ok,
    }
}

async fn run(command: Command, config: &StudioConfig) -> anyhow::Result<()> {
    match command {
        Command::Speak(args) => speak(args, config).await,
        Command::Refine { text, persona } => {
            let mut studio = studio(config, silent_output())?;
            println!("{}", studio.refine_text(&text, &persona).await?);
            Ok(())
        }
        Command::Translate { text, language } => {
            let mut studio = studio(config, silent_output())?;
            println!("{}", studio.translate_text(&text, language).await?);
            Ok(())
        }
        Command::Personas { search } => {
            let catalog = PersonaCatalog::builtin()?;
            let profiles: Vec<_> = match search.as_deref() {
                Some(query) => catalog.search(query),
                None => catalog.featured().collect(),
            };
            for p in profiles {
                println!("{:<22} {:<14} {:<7} {:<24} {}", p.id, p.name, p.gender, p.label, p.description);
            }
            Ok(())
        }
        Command::Library { action } => library(action, config).await,
    }
}

async fn speak(args: SpeakArgs, config: &StudioConfig) -> anyhow::Result<()> {
    let output = if args.no_audio {
        silent_output()
    } else {
        Box::new(RodioOutput::new()?) as Box<dyn OutputDevice>
    };
    let mut studio = studio(config, output)?;

    let request = GenerationRequest::new(args.text)
        .persona(args.persona)
        .language(args.language)
        .speed(args.speed)
        .high_quality(!args.turbo);
    let generation = studio.generate(request).await?;
    if generation.cache_hit {
        tracing::info!("served from history");
    }

    watch_playback(&mut studio, args.no_audio).await;

    if args.save {
        let library = Library::open_path(config.library_path())?;
        if let Some(record) = studio.save_to_library(generation.entry_id, &library)? {
            println!("Saved {}", record.id);
        }
    }
    if let Some(format) = args.download {
        let artifact = studio.prepare_download(None, format).await?;
        let path = artifact.save_to(Path::new(&config.download_dir))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn library(action: LibraryAction, config: &StudioConfig) -> anyhow::Result<()> {
    let library = Library::open_path(config.library_path())?;
    match action {
        LibraryAction::List => {
            for r in library.list()? {
                let when = chrono::DateTime::from_timestamp_millis(r.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {:<8} {:<20} {:>4.2}x  {}",
                    r.id, when, r.language, r.voice, r.speed, r.text
                );
            }
        }
        LibraryAction::Play { id, no_audio } => {
            let output = if no_audio {
                silent_output()
            } else {
                Box::new(RodioOutput::new()?) as Box<dyn OutputDevice>
            };
            let mut studio = studio(config, output)?;
            if studio.recall_from_library(&id, &library)?.is_none() {
                anyhow::bail!("no saved clip with id {}", id);
            }
            watch_playback(&mut studio, no_audio).await;
        }
        LibraryAction::Delete { id } => {
            if !library.delete(&id)? {
                anyhow::bail!("no saved clip with id {}", id);
            }
            println!("Deleted {}", id);
        }
        LibraryAction::Export { id, format } => {
            let item = library
                .load(&id)?
                .with_context(|| format!("no saved clip with id {}", id))?;
            let buffer = Arc::new(SampleBuffer::from_wav_bytes(&item.audio)?);
            let encoder = CompressedEncoder::with_default_backends();
            let artifact =
                DownloadArtifact::prepare(buffer, format, HISTORY_PREFIX, &id, &encoder).await?;
            let path = artifact.save_to(Path::new(&config.download_dir))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn studio(config: &StudioConfig, output: Box<dyn OutputDevice>) -> anyhow::Result<VoiceStudio> {
    let personas = Arc::new(PersonaCatalog::builtin()?);
    Ok(VoiceStudio::new(
        config,
        personas,
        ClientHandle::gemini(config),
        output,
    )?)
}

fn silent_output() -> Box<dyn OutputDevice> {
    Box::new(HeadlessOutput::new(Pace::Unthrottled))
}

/// Block until playback ends or CTRL-C, drawing bars unless `quiet`.
async fn watch_playback(studio: &mut VoiceStudio, quiet: bool) {
    let mut state = studio.subscribe_playback();
    let until_idle = async {
        let _ = state.wait_for(|s| *s == PlaybackState::Idle).await;
    };

    if quiet {
        tokio::select! {
            _ = until_idle => {}
            _ = tokio::signal::ctrl_c() => studio.stop(),
        }
        wait_for_drain(studio).await;
        return;
    }

    let visualizer = Visualizer::new(studio.analysis_tap());
    let surface = TerminalSurface::new(VISUALIZER_COLS, VISUALIZER_ROWS);
    let frames: watch::Receiver<PlaybackState> = studio.subscribe_playback();
    tokio::select! {
        _ = visualizer.run(surface, frames) => {}
        _ = until_idle => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; stopping playback");
            studio.stop();
        }
    }
    wait_for_drain(studio).await;
}

/// Idle fires when the last sample is pulled; the device still has to render it.
async fn wait_for_drain(studio: &VoiceStudio) {
    let drained = async {
        while !studio.output_drained() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drained).await.is_err() {
        tracing::warn!("output did not drain; releasing the device");
    }
}
