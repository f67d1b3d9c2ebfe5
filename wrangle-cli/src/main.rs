//! Wrangle CLI: terminal driver for the NF-UQ-NIDS-v2 preparation pipeline.
//!
//! Runs the whole pipeline by default, or a single step via subcommands.

mod commands;
mod terminal;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Wrangle: acquire, reduce, diagnose and prepare the NF-UQ-NIDS-v2 dataset
#[derive(Parser, Debug)]
#[command(name = "wrangle", version, about, long_about = None)]
struct Cli {
    /// Workspace directory holding the dataset files
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand (runs the full pipeline if omitted)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run every step in order
    Run,
    /// Download the full dataset unless it is already present
    Acquire {
        /// Where to place the full dataset
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create the stratified reduction of the full dataset
    Sample {
        /// Full dataset to reduce
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Reduced dataset to write
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fraction of rows to keep, in (0, 1)
        #[arg(short, long)]
        fraction: Option<f64>,
        /// Label column to stratify on
        #[arg(short, long)]
        target: Option<String>,
        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Report hard and soft nulls in a dataset
    Diagnose {
        /// Dataset to diagnose
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the prepared dataset
    Clean {
        /// Dataset to prepare
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Prepared dataset to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "netflow", "wrangle")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "wrangle.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    tracing::debug!(workspace = %workspace.display(), "resolved workspace");

    let command = cli.command.unwrap_or(Commands::Run);
    let ctx = commands::Context {
        workspace,
        config_file: cli.config,
        quiet: cli.quiet,
    };
    match commands::handle_command(command, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", terminal::render_error(&e));
            ExitCode::FAILURE
        }
    }
}
