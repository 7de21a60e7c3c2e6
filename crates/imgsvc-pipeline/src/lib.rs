//! # imgsvc-pipeline: Transformation Orchestration
//!
//! Decides when a variant is computed, how concurrent requests for one
//! variant are coordinated, and how the Raw Store, Formatted Store and
//! Variant Index interact.
//!
//! ## Components
//!
//! - [`UploadHandler`]: validates and stores raw uploads, issues upload
//!   tickets. Never calls a transformer.
//! - [`EagerTransformer`]: computes the default variants for a raw-created
//!   event, skipping any variant already indexed.
//! - [`EagerWorker`]: drains raw-created events and retries transient
//!   failures with exponential backoff.
//! - [`OnDemandTransformer`]: serves `(image, config)`, computing on a miss.
//!
//! ## Ordering
//!
//! Within one invocation the formatted object is always written before the
//! index entry that points at it. A failure between the two leaves an
//! unindexed object, never an entry without an object.
//!
//! ## Crate Policy
//!
//! - Collaborators are injected as trait objects ([`Collaborators`]).
//! - `transform` runs on the blocking pool.
//! - Every invocation runs under the configured time budget.

pub mod budget;
mod collaborators;
pub mod eager;
mod materialize;
pub mod metrics;
pub mod on_demand;
pub mod retry;
pub mod single_flight;
pub mod upload;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::Collaborators;
pub use eager::{EagerOutcome, EagerReport, EagerTransformer};
pub use on_demand::{OnDemandTransformer, Served, ServedSource};
pub use retry::RetryPolicy;
pub use single_flight::SingleFlight;
pub use upload::{UploadHandler, UploadReceipt, UploadTicket};
pub use worker::EagerWorker;
