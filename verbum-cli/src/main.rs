// Verbum Command Line Interface
// Narrates a Bible or a plain text document through a simulated voice

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use verbum_core::{JsonFileStore, KeyDocument, KeyRef, RewindAmount, SpeakSettings};
use verbum_spk::{
    BibleSource, BibleText, KeyReading, MemoryBookmarkStore, SimulatedEngine, SimulatedEngineConfig, SpeakConfig,
    SpeakEvent, SpeakService, SpeakState, SHOW_ALL,
};

const SAMPLE_BIBLE: &str = include_str!("../data/sample_bible.tsv");

#[derive(Parser)]
#[command(name = "verbum")]
#[command(about = "Verbum - narrate scripture and documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Speech configuration file (.toml or .json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// File keeping the pause state between runs
    #[arg(long, default_value = "verbum-state.json", global = true)]
    state: PathBuf,

    /// Speaking speed in percent of normal
    #[arg(long, default_value = "100", global = true)]
    speed: u32,

    /// Characters per second of the simulated voice
    #[arg(long, default_value = "40", global = true)]
    chars_per_second: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a Bible from a reference on
    Bible {
        /// Reference to start at, e.g. Gen.1.1
        #[arg(default_value = "Gen.1.1")]
        from: String,

        /// Tab separated Bible file; the built-in sample when omitted
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Read a plain text document. Lines starting with "# " open a key,
    /// blank lines separate paragraphs.
    Document {
        /// Document file
        path: PathBuf,

        /// Key to start at
        #[arg(long, short)]
        key: Option<String>,

        /// Stop at the end of the starting key
        #[arg(long)]
        only_key: bool,

        /// Read the starting key over and over
        #[arg(long)]
        repeat: bool,
    },

    /// Continue a session paused in an earlier run
    Resume {
        /// Bible file the session was reading
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Document the session was reading
        #[arg(long, short)]
        document: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SpeakConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SpeakConfig::default(),
    };

    match &cli.command {
        Commands::Bible { from, file } => {
            let bible = load_bible(file.as_deref())?;
            let document_id = bible.id.clone();
            let verse = bible
                .versification()
                .parse(from)
                .with_context(|| format!("{} is not a reference in {}", from, document_id))?;
            let service = start_service(&cli, config, bible)?;
            service.speak_bible(&document_id, verse)?;
            run_session(&service).await
        }
        Commands::Document {
            path,
            key,
            only_key,
            repeat,
        } => {
            let document = load_document(path)?;
            let reading = reading_for(&document, key.as_deref(), *only_key, *repeat)?;
            let service = start_service(&cli, config, load_bible(None)?)?;
            service.speak_keys(document, reading)?;
            run_session(&service).await
        }
        Commands::Resume { file, document } => {
            let service = start_service(&cli, config, load_bible(file.as_deref())?)?;
            if !service.is_paused() {
                let Some(path) = document else {
                    bail!("Nothing to resume");
                };
                if !service.resume_document(load_document(path)?) {
                    bail!("No paused session for {}", path.display());
                }
            }
            println!("Resuming at {}", service.status_text(SHOW_ALL));
            service.continue_after_pause()?;
            run_session(&service).await
        }
    }
}

fn load_bible(file: Option<&Path>) -> Result<BibleText> {
    let bible = match file {
        Some(path) => BibleText::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BibleText::from_tsv(SAMPLE_BIBLE)?,
    };
    Ok(bible)
}

fn load_document(path: &Path) -> Result<Arc<KeyDocument>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document")
        .to_string();
    Ok(Arc::new(KeyDocument::from_plain_text(name.clone(), name, &text)?))
}

/// Where to start reading `document` and where to stop
fn reading_for(document: &KeyDocument, key: Option<&str>, only_key: bool, repeat: bool) -> Result<KeyReading> {
    let index = match key {
        Some(name) => match document.key_index(name) {
            Some(index) => index,
            None => bail!("{} has no key named {:?}", document.name, name),
        },
        None => 0,
    };
    let start = KeyRef::new(index, 0);
    let mut reading = KeyReading::from(start);
    if only_key || repeat {
        let paragraphs = document.key(index).map_or(0, |k| k.paragraphs.len() as u32);
        reading = reading.until(KeyRef::new(index, paragraphs.saturating_sub(1)));
    }
    Ok(reading.repeating(repeat))
}

fn start_service(cli: &Cli, config: SpeakConfig, bible: BibleText) -> Result<SpeakService> {
    let engine = SimulatedEngine::new(SimulatedEngineConfig {
        chars_per_second: cli.chars_per_second,
        ..Default::default()
    })
    .with_printer(|text| println!("  {}", text));

    let mut settings = SpeakSettings::default();
    settings.playback.speed = cli.speed;

    let store = JsonFileStore::open(&cli.state).with_context(|| format!("opening {}", cli.state.display()))?;
    let (service, engine_events) = SpeakService::new(
        Arc::new(engine),
        BibleSource::new(bible),
        Arc::new(store),
        Arc::new(MemoryBookmarkStore::new()),
        settings.shared(),
        config,
    )?;
    tokio::spawn(engine_events.run());
    info!("Speech service ready");
    Ok(service)
}

fn print_controls() {
    println!("Controls: p pause, c continue, r rewind, f forward, s status, x stop, q quit and keep position");
}

/// Feed console commands to the service until reading ends
async fn run_session(service: &SpeakService) -> Result<()> {
    let mut events = service.subscribe_events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    print_controls();

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(command) => {
                        if !handle_command(service, command.trim())? {
                            break;
                        }
                    }
                    None => {
                        debug!("Console input closed");
                        stdin_open = false;
                    }
                }
            }
            event = events.recv() => match event {
                Ok(SpeakEvent::State { state: SpeakState::Silent }) => {
                    println!("- Stopped -");
                    break;
                }
                Ok(SpeakEvent::State { state }) => debug!("State {:?}", state),
                Ok(SpeakEvent::Error { message, .. }) => eprintln!("Error: {}", message),
                Ok(SpeakEvent::Progress(progress)) if progress.force_follow => {
                    println!("[{}]", service.status_text(SHOW_ALL));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

/// Apply one console command. False ends the session.
fn handle_command(service: &SpeakService, command: &str) -> Result<bool> {
    match command {
        "p" => service.pause(true),
        "c" => service.continue_after_pause_with_rewind(service.settings().rewind_amount)?,
        "r" => service.rewind(RewindAmount::SmartUnit),
        "f" => service.forward(RewindAmount::SmartUnit),
        "s" => println!(
            "{} ({:?}, {}s of {}s)",
            service.status_text(SHOW_ALL),
            service.state(),
            service.paused_completed_secs(),
            service.paused_total_secs()
        ),
        "x" => {
            service.stop(false);
            return Ok(false);
        }
        "q" => {
            service.pause(false);
            println!("Paused at {}. Run `verbum resume` to continue.", service.status_text(SHOW_ALL));
            return Ok(false);
        }
        "" => {}
        _ => print_controls(),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> KeyDocument {
        KeyDocument::from_plain_text("notes", "notes", "# One\nA\n\nB\n\nC\n# Two\nD\n").unwrap()
    }

    #[test]
    fn test_sample_bible_parses() {
        let bible = load_bible(None).unwrap();
        assert_eq!(bible.id, "KJV");
        assert!(bible.versification().parse("John.1.1").is_some());
    }

    #[test]
    fn test_reading_for_key() {
        let reading = reading_for(&document(), Some("Two"), false, false).unwrap();
        assert_eq!(reading.start, KeyRef::new(1, 0));
        assert_eq!(reading.end, None);

        let reading = reading_for(&document(), Some("One"), true, false).unwrap();
        assert_eq!(reading.end, Some(KeyRef::new(0, 2)));
        assert!(!reading.repeat);

        let reading = reading_for(&document(), None, false, true).unwrap();
        assert_eq!(reading.end, Some(KeyRef::new(0, 2)));
        assert!(reading.repeat);
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        assert!(reading_for(&document(), Some("Three"), false, false).is_err());
    }
}
