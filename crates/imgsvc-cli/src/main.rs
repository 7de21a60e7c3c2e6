//! # imgsvc CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use imgsvc_cli::config::{run_config, ConfigArgs};
use imgsvc_cli::key::{run_key, KeyArgs};
use imgsvc_cli::transform::{run_transform, TransformArgs};

/// imgsvc operator toolchain.
///
/// Canonicalizes cache keys, renders variants locally with the service's
/// transform, and checks configuration documents.
#[derive(Parser, Debug)]
#[command(name = "imgsvc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode queries into cfg keys and decode them back.
    Key(KeyArgs),

    /// Render one variant of a local image file.
    Transform(TransformArgs),

    /// Check or print service configuration.
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Key(args) => run_key(&args),
        Commands::Transform(args) => run_transform(&args),
        Commands::Config(args) => run_config(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
