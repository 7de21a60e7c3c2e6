//! # Service Configuration
//!
//! Settings shared by the upload, eager and on-demand pipelines and by the
//! delivery edge.
//!
//! Loading order:
//!
//! 1. Built-in defaults.
//! 2. Optional document at `IMGSVC_CONFIG` (JSON, or YAML for `.yaml`/`.yml`).
//!    Legacy documents with only `default_transformations` and `upload_ttl`
//!    load unchanged.
//! 3. Environment overrides:
//!    - `UPLOAD_TTL_SECS`, `MAX_UPLOAD_BYTES`
//!    - `DEFAULT_TRANSFORMATIONS` (JSON list of transform configs)
//!    - `INVOCATION_TIMEOUT_SECS`, `PENDING_LEASE_SECS`
//!    - `EDGE_TTL_SECS`, `EDGE_MAX_ENTRIES`
//!    - `RAW_STORE_DIR`, `FORMATTED_STORE_DIR` (switch a store to the filesystem)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform_config::{OutputFormat, TransformConfig};

/// Where an object store keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLocation {
    /// Process memory. Contents vanish on restart.
    #[default]
    Memory,
    /// A directory on the local filesystem.
    Filesystem { root: PathBuf },
}

/// Pipeline and edge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Variants precomputed for every upload.
    pub default_transformations: Vec<TransformConfig>,
    /// Seconds an upload ticket stays valid.
    #[serde(alias = "upload_ttl")]
    pub upload_ttl_secs: u64,
    /// Largest accepted upload payload.
    pub max_upload_bytes: u64,
    /// Execution budget of a single upload, eager or on-demand invocation.
    pub invocation_timeout_secs: u64,
    /// Age after which another worker may take over a pending claim.
    pub pending_lease_secs: u64,
    /// How long a reader waits on another worker's pending claim.
    pub pending_wait_ms: u64,
    /// Poll interval while waiting on a pending claim.
    pub pending_poll_ms: u64,
    /// Lifetime of a delivery edge cache entry.
    pub edge_ttl_secs: u64,
    /// Capacity of the delivery edge cache.
    pub edge_max_entries: usize,
    pub raw_store: StoreLocation,
    pub formatted_store: StoreLocation,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let default_variant = TransformConfig::new(100, 100, OutputFormat::Webp)
            .map(|cfg| vec![cfg])
            .unwrap_or_default();
        Self {
            default_transformations: default_variant,
            upload_ttl_secs: 300,
            max_upload_bytes: 6 * 1024 * 1024,
            invocation_timeout_secs: 30,
            pending_lease_secs: 60,
            pending_wait_ms: 2_000,
            pending_poll_ms: 50,
            edge_ttl_secs: 3_600,
            edge_max_entries: 1_024,
            raw_store: StoreLocation::Memory,
            formatted_store: StoreLocation::Memory,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `IMGSVC_CONFIG` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|var| std::env::var(var).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("IMGSVC_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let parsed = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("UPLOAD_TTL_SECS") {
            self.upload_ttl_secs = parse_var("UPLOAD_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("INVOCATION_TIMEOUT_SECS") {
            self.invocation_timeout_secs = parse_var("INVOCATION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PENDING_LEASE_SECS") {
            self.pending_lease_secs = parse_var("PENDING_LEASE_SECS", &v)?;
        }
        if let Some(v) = lookup("EDGE_TTL_SECS") {
            self.edge_ttl_secs = parse_var("EDGE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("EDGE_MAX_ENTRIES") {
            self.edge_max_entries = parse_var("EDGE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = lookup("DEFAULT_TRANSFORMATIONS") {
            self.default_transformations =
                serde_json::from_str(&v).map_err(|e| ConfigError::InvalidVar {
                    var: "DEFAULT_TRANSFORMATIONS",
                    reason: e.to_string(),
                })?;
        }
        if let Some(v) = lookup("RAW_STORE_DIR") {
            self.raw_store = StoreLocation::Filesystem { root: v.into() };
        }
        if let Some(v) = lookup("FORMATTED_STORE_DIR") {
            self.formatted_store = StoreLocation::Filesystem { root: v.into() };
        }
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("upload_ttl_secs", self.upload_ttl_secs),
            ("max_upload_bytes", self.max_upload_bytes),
            ("invocation_timeout_secs", self.invocation_timeout_secs),
            ("pending_lease_secs", self.pending_lease_secs),
            ("pending_poll_ms", self.pending_poll_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be positive")));
            }
        }
        if self.pending_wait_ms >= self.invocation_timeout_secs.saturating_mul(1_000) {
            return Err(ConfigError::Invalid(
                "pending_wait_ms must be shorter than the invocation timeout".to_string(),
            ));
        }
        Ok(())
    }

    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn pending_lease(&self) -> Duration {
        Duration::from_secs(self.pending_lease_secs)
    }

    pub fn pending_wait(&self) -> Duration {
        Duration::from_millis(self.pending_wait_ms)
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pending_poll_ms)
    }

    pub fn edge_ttl(&self) -> Duration {
        Duration::from_secs(self.edge_ttl_secs)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        var,
        reason: e.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
