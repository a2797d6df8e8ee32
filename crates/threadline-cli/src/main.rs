#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use threadline_core::{Engine, EngineError};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tl: conversation history store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding threadline.sqlite3 and threadline.toml.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Write events from a JSON-lines file",
        long_about = "Write every event of a JSON-lines file in one atomic batch.",
        after_help = "EXAMPLES:\n    # Import a backup\n    tl ingest backup.jsonl\n\n    # Emit machine-readable output\n    tl ingest backup.jsonl --json"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        about = "List threads",
        long_about = "List threads with optional filters, sort order and conversation grouping.",
        after_help = "EXAMPLES:\n    # Newest threads first\n    tl threads\n\n    # Unread threads of one account, grouped by contact\n    tl threads --grouped --filter account_id=work --filter unread_count=1"
    )]
    Threads(cmd::threads::ThreadsArgs),

    #[command(
        about = "List events of a thread",
        after_help = "EXAMPLES:\n    tl events --account work --thread 42"
    )]
    Events(cmd::events::EventsArgs),

    #[command(about = "Delete a thread and its events")]
    RemoveThread(cmd::ThreadArgs),

    #[command(about = "Mark all events of a thread as read")]
    MarkRead(cmd::ThreadArgs),

    #[command(about = "List grouped conversations")]
    Conversations(cmd::conversations::ConversationsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("THREADLINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "threadline=debug,info"
        } else {
            "threadline=info,warn"
        })
    });

    let format = env::var("THREADLINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn resolve_data_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("threadline"))
        .context("no platform data directory; pass --data-dir")
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    debug!(data_dir = %data_dir.display(), "resolved data directory");
    let engine = Engine::open_dir(&data_dir)?;

    let result = match &cli.command {
        Commands::Ingest(args) => cmd::ingest::run_ingest(args, &engine, output),
        Commands::Threads(args) => cmd::threads::run_threads(args, &engine, output),
        Commands::Events(args) => cmd::events::run_events(args, &engine, output),
        Commands::RemoveThread(args) => {
            cmd::remove_thread::run_remove_thread(args, &engine, output)
        }
        Commands::MarkRead(args) => cmd::mark_read::run_mark_read(args, &engine, output),
        Commands::Conversations(args) => {
            cmd::conversations::run_conversations(args, &engine, output)
        }
    };
    engine.shutdown()?;
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = OutputMode::from_json_flag(cli.json);
    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = e
                .downcast_ref::<EngineError>()
                .map_or_else(|| CliError::new(format!("{e:#}")), CliError::from);
            if let Err(render_failure) = render_error(output, &error) {
                eprintln!("error: {e:#} ({render_failure})");
            }
            ExitCode::FAILURE
        }
    }
}
