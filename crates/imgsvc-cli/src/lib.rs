//! # imgsvc-cli: Operator CLI for imgsvc
//!
//! ## Subcommands
//!
//! - `imgsvc key encode` / `imgsvc key decode`: cfg key canonicalization.
//! - `imgsvc transform`: render one variant of a local image file.
//! - `imgsvc config check` / `imgsvc config defaults`: configuration checks.
//!
//! ```bash
//! imgsvc key encode 'format=JPG&height=60&width=80'   # 80x60-jpeg-q85
//! imgsvc transform photo.png --query 'w=100&h=100&fmt=webp' -o thumb.webp
//! IMGSVC_CONFIG=imgsvc.yaml imgsvc config check
//! ```
//!
//! Every handler returns the process exit code: `0` on success, `1` when a
//! check fails. Unexpected errors propagate as `anyhow::Error`.

pub mod config;
pub mod key;
pub mod transform;
