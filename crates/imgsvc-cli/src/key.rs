//! # Key Subcommand
//!
//! Shows how a request query maps onto the cache key, and back.

use anyhow::Result;
use clap::{Args, Subcommand};

use imgsvc_core::{CfgKey, TransformConfig};

/// Arguments for the `imgsvc key` subcommand.
#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub command: KeyCommand,
}

/// Key subcommands.
#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Canonicalize a transform query string into its cfg key.
    Encode {
        /// Query string, e.g. `w=50&h=50&fmt=png`.
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Expand a cfg key into its canonical query string.
    Decode {
        /// Canonical cfg key, e.g. `80x60-jpeg-q85`.
        #[arg(value_name = "CFG_KEY")]
        cfg_key: String,
    },
}

/// Execute the key subcommand.
pub fn run_key(args: &KeyArgs) -> Result<u8> {
    match &args.command {
        KeyCommand::Encode { query } => {
            let line = encode(query)?;
            println!("{line}");
            Ok(0)
        }
        KeyCommand::Decode { cfg_key } => match decode(cfg_key) {
            Ok(query) => {
                println!("{query}");
                Ok(0)
            }
            Err(e) => {
                println!("INVALID: {e}");
                Ok(1)
            }
        },
    }
}

/// Canonical cfg key of `query`.
pub fn encode(query: &str) -> Result<CfgKey> {
    Ok(TransformConfig::from_query(query)?.cfg_key())
}

/// Canonical query string of `cfg_key`.
pub fn decode(cfg_key: &str) -> Result<String> {
    Ok(CfgKey::parse(cfg_key)?.to_config()?.to_query())
}
