//! # imgsvc-store: Storage Tiers
//!
//! The pipeline coordinates through three injected collaborators:
//!
//! - **Raw Store**: an [`ObjectStore`] holding uploaded images, keyed by
//!   image id. Wrapped in [`NotifyingStore`] so every completed write emits a
//!   [`RawCreatedEvent`].
//! - **Formatted Store**: an [`ObjectStore`] holding computed variants, keyed
//!   by [`VariantKey::object_key`](imgsvc_core::VariantKey::object_key).
//! - **Variant Index**: a [`VariantIndex`] recording which variants exist and
//!   which are being computed.
//!
//! Every operation is async and may fail with a [`StoreError`]. Adapters
//! provided here are in-memory (tests, single-node deployments) and
//! filesystem-backed. The Postgres Variant Index lives in `imgsvc-api`.

pub mod error;
pub mod fs;
pub mod index;
pub mod memory;
pub mod notify;
pub mod object;

pub use error::{StoreError, StoreErrorKind};
pub use fs::FsObjectStore;
pub use index::{ClaimOutcome, MemoryVariantIndex, VariantIndex};
pub use memory::MemoryObjectStore;
pub use notify::{NotifyingStore, RawCreatedEvent};
pub use object::{validate_key, ObjectMeta, ObjectStore, StoredObject};
