//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, sets up diagnostics, and
//! dispatches to the interactive chat, the one-shot `say` command, or the
//! credential and configuration helpers.

pub mod say;

use std::error::Error;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{AssistantsApi, HttpAssistantsClient};
use crate::auth::{interactive_auth, interactive_deauth, wait_for_credential};
use crate::core::assistant::ensure_assistant;
use crate::core::config::Config;
use crate::core::session::{AssistantSession, SessionEvent, SessionSettings};
use crate::ui::chat_loop::run_chat;
use crate::utils::logging::TranscriptLog;

const DEFAULT_LOG_FILTER: &str = "palaver=info";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", ",
    env!("VERGEN_GIT_SHA"),
    ")\nbuilt ",
    env!("VERGEN_BUILD_DATE"),
    " with rustc ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "palaver")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "A terminal chat client for hosted AI assistants")]
#[command(
    long_about = "Palaver is a full-screen terminal client for a hosted assistant that can \
run tools, read reference files, and produce files of its own. Replies show citation \
footnotes; generated files are saved to your download directory.\n\n\
Authentication:\n\
  Use 'palaver auth' to store an API key in your system keyring.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your OpenAI API key (takes precedence over the keyring)\n\
  RUST_LOG          Diagnostic filter for --debug-log (default: palaver=info)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Shift+Enter       Insert a newline\n\
  Esc               Stop waiting for the current reply\n\
  Up/Down/PgUp/PgDn Scroll through the conversation\n\
  Ctrl+L            Pause or resume the transcript log\n\
  Ctrl+C            Quit the application"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Write the conversation transcript to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Save generated files into this directory
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Write diagnostic logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub debug_log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send one message and print the reply without the TUI
    Say {
        /// Message to send (multiple words are joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Store an API key in the system keyring
    Auth,
    /// Remove the stored API key
    Deauth,
    /// Forget the registered assistant so the next start creates a new one
    ForgetAssistant,
    /// Print the effective configuration
    Config,
}

/// Paths from the command line that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
}

/// A live session plus what the front end needs to drive it.
pub struct StartedSession {
    pub session: Arc<AssistantSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub download_dir: PathBuf,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let to_stderr = matches!(args.command, Some(Commands::Say { .. }));
    init_tracing(args.debug_log.as_deref(), to_stderr)?;

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let overrides = Overrides {
        log: args.log,
        download_dir: args.download_dir,
    };

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Auth => {
            if let Err(e) = interactive_auth() {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deauth => {
            if let Err(e) = interactive_deauth() {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::ForgetAssistant => {
            let config_path = Config::config_path()?;
            let mut config = Config::load_from_path(&config_path)?;
            match config.assistant_id.take() {
                Some(id) => {
                    config.save_to_path(&config_path)?;
                    println!("✅ Forgot assistant {id}. A new one is created on next start.");
                }
                None => println!("No assistant is registered."),
            }
            Ok(())
        }
        Commands::Config => {
            let config_path = Config::config_path()?;
            let config = Config::load_from_path(&config_path)?;
            println!("Config file: {}", config_path.display());
            config.print_all();
            Ok(())
        }
        Commands::Say { prompt } => say::run_say(prompt, &overrides).await,
        Commands::Chat => {
            let started = start_session(&overrides).await?;
            run_chat(started).await
        }
    }
}

/// Resolve credentials, register the assistant if needed, and open a thread.
pub async fn start_session(overrides: &Overrides) -> Result<StartedSession, Box<dyn Error>> {
    let config_path = Config::config_path()?;
    let (mut config, credential) = wait_for_credential(&config_path)?;
    info!(source = credential.source.describe(), "using API key");

    let api: Arc<dyn AssistantsApi> = Arc::new(HttpAssistantsClient::new(
        config.base_url(),
        credential.api_key,
    )?);
    let assistant_id = ensure_assistant(api.as_ref(), &mut config, &config_path).await?;

    let log_file = overrides.log.clone().unwrap_or_else(|| config.log_file());
    let transcript = Arc::new(Mutex::new(TranscriptLog::new(Some(log_file))));
    let settings = SessionSettings {
        assistant_id,
        poll: config.poll_settings(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let session = AssistantSession::begin_session(api, settings, transcript, tx).await?;

    Ok(StartedSession {
        session: Arc::new(session),
        events: rx,
        download_dir: overrides
            .download_dir
            .clone()
            .unwrap_or_else(|| config.download_dir()),
    })
}

/// Diagnostics go to `debug_log` when given, to stderr when `to_stderr`, and
/// nowhere otherwise so the full-screen UI is never overwritten.
fn init_tracing(debug_log: Option<&Path>, to_stderr: bool) -> Result<(), Box<dyn Error>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    match debug_log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| err.to_string())?;
        }
        None if to_stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_writer(io::stderr)
                .try_init()
                .map_err(|err| err.to_string())?;
        }
        None => {}
    }
    Ok(())
}
