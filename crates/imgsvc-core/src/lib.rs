//! # imgsvc-core: Foundational Types for imgsvc
//!
//! Every other crate in the workspace depends on `imgsvc-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `ImageId` and `CfgKey` are
//!    validated newtypes. No bare strings cross crate boundaries as keys.
//!
//! 2. **`CfgKey` is the only cache key.** Every lookup in the Variant Index
//!    and every formatted object key is derived from
//!    [`TransformConfig::cfg_key()`], so semantically identical requests can
//!    never map to two different variants.
//!
//! 3. **One error taxonomy.** [`PipelineError`] names the error kinds the
//!    pipeline reports to its callers. Protocol-level mapping happens only at
//!    the HTTP boundary.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `imgsvc-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod transform_config;
pub mod variant;

// Re-export primary types for ergonomic imports.
pub use config::{ConfigError, ServiceConfig, StoreLocation};
pub use digest::sha256_hex;
pub use error::{PipelineError, ValidationError};
pub use identity::ImageId;
pub use transform_config::{CfgKey, FitMode, OutputFormat, TransformConfig};
pub use variant::{Variant, VariantIndexEntry, VariantKey, VariantState};
