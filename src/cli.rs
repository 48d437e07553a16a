//! CLI interface for braille-tutor

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{self, Config, EXAMPLE_DEVICE_URL};
use crate::device::HttpDeviceClient;
use crate::letters::{seed_vocabulary, LetterStats, SqliteLetterStore};
use crate::session::{SessionController, SessionSettings};
use crate::types::{Feedback, Level};

#[derive(Parser)]
#[command(name = "braille-tutor")]
#[command(about = "Korean braille tutor: sends random letters to a braille device and speaks them back", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, env = "BRAILLE_TUTOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Letter database file (overrides the configuration)
    #[arg(long, env = "BRAILLE_TUTOR_DB", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Practice interactively (default when no command given)
    Interactive,
    /// Send one random letter of a level to the device
    Send {
        /// Difficulty level (1-3)
        #[arg(short, long, value_parser = parse_level)]
        level: Level,
        /// Exit right after sending instead of waiting for the spoken feedback
        #[arg(long)]
        no_wait: bool,
    },
    /// Load the built-in vocabulary into empty levels
    Seed,
    /// List the stored letters of a level
    List {
        /// Difficulty level (1-3)
        #[arg(short, long, value_parser = parse_level)]
        level: Level,
    },
    /// Show the stored braille pattern for a text
    Lookup {
        /// Letter, syllable or word
        text: String,
    },
    /// Show how many letters each level holds
    Stats,
    /// Configure the device endpoint
    Config {
        /// Store the device URL
        #[arg(long)]
        set_url: Option<String>,
        /// Forget the stored device URL
        #[arg(long)]
        reset_url: bool,
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn parse_level(s: &str) -> Result<Level, String> {
    s.parse::<Level>().map_err(|e| e.to_string())
}

/// Everything the commands need, built once per invocation
struct App {
    config_path: PathBuf,
    config: Config,
    store: SqliteLetterStore,
}

impl App {
    async fn open(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => config::config_path()?,
        };

        let mut config = Config::load_from(&config_path)?;
        config.speech = config.speech.clone().apply_env();

        let database_path = match &cli.database {
            Some(path) => path.clone(),
            None => config.storage.resolve_database_path()?,
        };

        let store = SqliteLetterStore::open(&database_path).await?;

        Ok(Self {
            config_path,
            config,
            store,
        })
    }

    fn session(&self) -> (SessionController, mpsc::UnboundedReceiver<Feedback>) {
        SessionController::new(
            self.store.clone(),
            Arc::new(HttpDeviceClient::new()),
            self.config.speech.build_speaker(),
            SessionSettings::from_config(&self.config),
        )
    }

    /// Seed on a background task
    fn spawn_seeding(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = seed_vocabulary(&store).await {
                warn!("Seeding failed: {:#}", e);
            }
        })
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = App::open(&cli).await?;

    match cli.command {
        None | Some(Commands::Interactive) => {
            run_interactive(&app).await?;
        }
        Some(Commands::Send { level, no_wait }) => {
            app.spawn_seeding().await.context("Seeding task failed")?;
            send_once(&app, level, !no_wait).await;
        }
        Some(Commands::Seed) => {
            let report = seed_vocabulary(&app.store).await?;
            for (level, count) in &report.inserted {
                println!("Level {}: inserted {} letters", level, count);
            }
            for level in &report.skipped {
                println!("Level {}: already loaded", level);
            }
        }
        Some(Commands::List { level }) => {
            app.spawn_seeding().await.context("Seeding task failed")?;
            let entries = app.store.get_by_level(level).await?;
            if entries.is_empty() {
                println!("No letters stored for level {}", level);
            }
            for entry in entries {
                println!(
                    "{:>4}  {:<8} {}",
                    entry.id.unwrap_or_default(),
                    entry.text,
                    entry.cells().join(" ")
                );
            }
        }
        Some(Commands::Lookup { text }) => {
            app.spawn_seeding().await.context("Seeding task failed")?;
            match app.store.get_by_text(&text).await? {
                Some(entry) => println!(
                    "{} (level {}): {}",
                    entry.text,
                    entry.level,
                    entry.cells().join(" ")
                ),
                None => println!("'{}' is not in the vocabulary", text),
            }
        }
        Some(Commands::Stats) => {
            print!("{}", format_stats(&app.store.stats().await?));
        }
        Some(Commands::Config { set_url, reset_url, show }) => {
            if let Some(url) = set_url {
                let url = config::set_device_url(&app.config_path, &url)?;
                println!("Device URL saved: {}", url);
            } else if reset_url {
                config::reset_device_url(&app.config_path)?;
                println!("Device URL cleared.");
            } else if show {
                config::show_config(&app.config_path)?;
            } else {
                config::show_config(&app.config_path)?;
                println!("\nUse 'braille-tutor config --set-url {}' to set the device", EXAMPLE_DEVICE_URL);
            }
        }
    }

    Ok(())
}

fn format_stats(stats: &LetterStats) -> String {
    let mut out = String::new();
    for (level, count) in &stats.per_level {
        out.push_str(&format!("Level {} ({}): {} letters\n", level, level.description(), count));
    }
    out.push_str(&format!("Total: {}\n", stats.total));
    out
}

/// Stats for the prompt; a store failure becomes a notice instead of an error
async fn stats_text(store: &SqliteLetterStore) -> String {
    match store.stats().await {
        Ok(stats) => format_stats(&stats),
        Err(e) => {
            warn!("Failed to read letter stats: {:#}", e);
            format!("{}\n", Feedback::StoreFailed { message: format!("{:#}", e) })
        }
    }
}

fn print_pending(feedback: &mut mpsc::UnboundedReceiver<Feedback>) {
    while let Ok(event) = feedback.try_recv() {
        println!("{}", event);
    }
}

async fn send_once(app: &App, level: Level, wait_for_speech: bool) {
    let (session, mut feedback) = app.session();

    let result = session.send_random_letter(level).await;
    print_pending(&mut feedback);

    match result {
        Ok(_) if wait_for_speech && app.config.speech.enabled => {
            println!("Speaking in {}s...", app.config.speech.delay_secs);
            session.wait_for_speech().await;
            print_pending(&mut feedback);
        }
        Ok(_) => {}
        Err(crate::session::SessionError::EndpointMissing) => {
            println!("Use 'braille-tutor config --set-url {}' first", EXAMPLE_DEVICE_URL);
        }
        Err(_) => {}
    }
}

fn print_help() {
    println!("Commands:");
    for level in Level::ALL {
        println!("  {}      send a random letter of level {} ({})", level, level, level.description());
    }
    println!("  r      reset the device URL");
    println!("  s      show vocabulary statistics");
    println!("  h      show this help");
    println!("  q      quit");
}

fn readline(editor: &mut DefaultEditor, prompt: &str) -> Result<Option<String>> {
    match tokio::task::block_in_place(|| editor.readline(prompt)) {
        Ok(line) => {
            let _ = editor.add_history_entry(line.as_str());
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e).context("Failed to read input"),
    }
}

/// Outcome of one line typed at the device URL prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlInput {
    /// In use and persisted
    Saved(String),
    /// In use for this run only; the config file could not be written
    Unsaved { url: String, message: String },
    /// Empty or invalid, ask again
    Rejected(String),
}

async fn submit_url(session: &SessionController, config_path: &Path, line: &str) -> UrlInput {
    if line.trim().is_empty() {
        return UrlInput::Rejected("The URL is empty.".to_string());
    }

    let url = match session.set_endpoint(line).await {
        Ok(url) => url,
        Err(e) => return UrlInput::Rejected(e.to_string()),
    };

    match config::set_device_url(config_path, &url) {
        Ok(_) => UrlInput::Saved(url),
        Err(e) => {
            warn!("Failed to persist device URL: {:#}", e);
            UrlInput::Unsaved {
                url,
                message: format!("{:#}", e),
            }
        }
    }
}

/// Forget the device URL in the session and in the config file
async fn reset_url(session: &SessionController, config_path: &Path) -> Result<()> {
    session.clear_endpoint().await?;
    config::reset_device_url(config_path)?;
    Ok(())
}

/// Ask for the device URL until a valid one is given; `false` if the user gave up
async fn prompt_for_url(
    editor: &mut DefaultEditor,
    session: &SessionController,
    config_path: &Path,
) -> Result<bool> {
    println!("Enter the braille device address (e.g. {})", EXAMPLE_DEVICE_URL);

    loop {
        let Some(line) = readline(editor, "device url> ")? else {
            return Ok(false);
        };

        match submit_url(session, config_path, &line).await {
            UrlInput::Saved(_) => return Ok(true),
            UrlInput::Unsaved { message, .. } => {
                println!("Using the URL for this session only, saving failed: {}", message);
                return Ok(true);
            }
            UrlInput::Rejected(message) => println!("{}", message),
        }
    }
}

async fn run_interactive(app: &App) -> Result<()> {
    let _seeding = app.spawn_seeding();

    let (session, mut feedback) = app.session();
    let printer = tokio::spawn(async move {
        while let Some(event) = feedback.recv().await {
            println!("{}", event);
        }
    });

    let mut editor = DefaultEditor::new().context("Failed to initialize terminal")?;

    println!("Braille Tutor v{}", crate::VERSION);
    print_help();

    if session.endpoint().await.is_none() {
        prompt_for_url(&mut editor, &session, &app.config_path).await?;
    }

    loop {
        let Some(line) = readline(&mut editor, "braille> ")? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "h" | "help" | "?" => print_help(),
            "s" | "stats" => print!("{}", stats_text(session.store()).await),
            "r" | "reset" => {
                if session.is_endpoint_fixed().await {
                    println!("The device URL is fixed in the configuration.");
                    continue;
                }
                match reset_url(&session, &app.config_path).await {
                    Ok(()) => {
                        prompt_for_url(&mut editor, &session, &app.config_path).await?;
                    }
                    Err(e) => {
                        warn!("Failed to reset device URL: {:#}", e);
                        println!("Could not reset the device URL: {:#}", e);
                    }
                }
            }
            other => match other.parse::<Level>() {
                Ok(level) => {
                    if session.endpoint().await.is_none() {
                        // Reports the missing URL through the feedback queue
                        session.spawn_send(level).await.ok();
                        prompt_for_url(&mut editor, &session, &app.config_path).await?;
                    } else {
                        session.spawn_send(level);
                    }
                }
                Err(_) => println!("Unknown command '{}'. Type h for help.", other),
            },
        }
    }

    if session.speech().cancel().await {
        info!("Dropped pending speech on exit");
    }
    drop(session);
    printer.abort();

    Ok(())
}
