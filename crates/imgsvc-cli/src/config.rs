//! # Config Subcommand
//!
//! Loads service configuration the way the server does and prints the
//! resolved result, so operators can check a document before deploying it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};

use imgsvc_core::ServiceConfig;

/// Arguments for the `imgsvc config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Output encoding of a printed configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load, validate and print the effective configuration.
    ///
    /// Reads `--file`, or `IMGSVC_CONFIG` when absent, then applies
    /// environment overrides.
    Check {
        /// Configuration document (JSON, or YAML for .yaml/.yml).
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Print the built-in defaults.
    Defaults {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

/// Execute the config subcommand.
pub fn run_config(args: &ConfigArgs) -> Result<u8> {
    match &args.command {
        ConfigCommand::Check { file, format } => {
            let loaded = match file {
                Some(path) => {
                    let path = path.to_string_lossy().into_owned();
                    ServiceConfig::load_with(|var| match var {
                        "IMGSVC_CONFIG" => Some(path.clone()),
                        other => std::env::var(other).ok(),
                    })
                }
                None => ServiceConfig::load(),
            };
            match loaded {
                Ok(config) => {
                    println!("{}", render(&config, *format)?);
                    Ok(0)
                }
                Err(e) => {
                    println!("INVALID: {e}");
                    Ok(1)
                }
            }
        }
        ConfigCommand::Defaults { format } => {
            println!("{}", render(&ServiceConfig::default(), *format)?);
            Ok(0)
        }
    }
}

/// Serialize `config` for display.
pub fn render(config: &ServiceConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(config).context("failed to render YAML"),
        OutputFormat::Json => {
            serde_json::to_string_pretty(config).context("failed to render JSON")
        }
    }
}
