//! # Transform Subcommand
//!
//! Renders one variant of a local image with the same transform the service
//! uses, without touching any store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use imgsvc_core::{sha256_hex, TransformConfig};
use imgsvc_transform::{ImageTransform, Transform};

/// Arguments for the `imgsvc transform` subcommand.
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Source image file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Transform query, e.g. `w=100&h=100&fmt=webp`.
    #[arg(long, short)]
    pub query: String,

    /// Output file. Defaults to `<input stem>.<cfg key>.<ext>` next to the input.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Execute the transform subcommand.
pub fn run_transform(args: &TransformArgs) -> Result<u8> {
    let cfg = TransformConfig::from_query(&args.query)
        .with_context(|| format!("invalid transform query {:?}", args.query))?;
    if !args.input.is_file() {
        bail!("input not found: {}", args.input.display());
    }
    let raw = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let out = match ImageTransform::new().transform(&raw, &cfg) {
        Ok(out) => out,
        Err(e) => {
            println!("FAILED: {e}");
            return Ok(1);
        }
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, &cfg));
    std::fs::write(&output, &out)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(cfg_key = %cfg.cfg_key(), bytes = out.len(), "variant rendered");

    println!(
        "OK: {} cfg_key={} size={} sha256={}",
        output.display(),
        cfg.cfg_key(),
        out.len(),
        sha256_hex(&out)
    );
    Ok(0)
}

fn default_output(input: &Path, cfg: &TransformConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}.{}.{}", cfg.cfg_key(), cfg.format().as_str()))
}
