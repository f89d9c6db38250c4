//! # HealthDoc CLI (`healthdoc`)
//!
//! ## Usage
//!
//! ```bash
//! healthdoc [--config healthdoc.toml] [--output human|json] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `healthdoc chat [PATHS]...` | Process documents, then answer questions from stdin |
//! | `healthdoc inspect [PATHS]...` | Extract and chunk only; no credentials or network |
//!
//! ## Examples
//!
//! ```bash
//! # Chat over a folder of lab reports and one discharge summary
//! healthdoc chat ./labs discharge.pdf
//!
//! # Check what text a scanned PDF yields before embedding it
//! healthdoc inspect scan.pdf
//!
//! # Script-friendly output
//! echo "What was my last HbA1c?" | healthdoc --output json chat ./labs
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use healthdoc::config;
use healthdoc::console::OutputMode;
use healthdoc::{inspect, repl};

/// Config file read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_PATH: &str = "./healthdoc.toml";

/// HealthDoc: ask questions about your medical documents.
#[derive(Parser)]
#[command(
    name = "healthdoc",
    about = "HealthDoc — ask questions about your medical documents",
    version,
    long_about = "HealthDoc extracts text from PDF, DOCX, and TXT files, embeds it into an \
    in-memory index, and answers follow-up questions with a retrieval-augmented chat model. \
    The chat model needs OPENAI_API_KEY in the environment (or in a .env file)."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./healthdoc.toml` when present, otherwise built-in
    /// defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for turns and status messages.
    #[arg(long, global = true, value_enum, default_value = "human")]
    output: OutputMode,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process documents and chat about them.
    ///
    /// Files are read in the order given; directories are walked for
    /// .pdf, .docx, and .txt files. Questions are read from stdin, one
    /// per line. Type :help for commands.
    Chat {
        /// Files or directories to process before the first question.
        paths: Vec<PathBuf>,
    },

    /// Extract and chunk documents without embedding or chatting.
    ///
    /// Prints per-file extraction status and chunk statistics.
    Inspect {
        /// Files or directories to inspect.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("healthdoc=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let cfg = config::load_or_default(cli.config.as_deref(), Path::new(DEFAULT_CONFIG_PATH))?;

    match cli.command {
        Commands::Chat { paths } => {
            repl::run_chat(&cfg, &paths, cli.output).await?;
        }
        Commands::Inspect { paths } => {
            inspect::run_inspect(&cfg, &paths, cli.output)?;
        }
    }

    Ok(())
}
