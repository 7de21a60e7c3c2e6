//! # API Route Modules
//!
//! - `images`: raw uploads, ticketed uploads, variant reads (behind the
//!   edge cache), and per-image variant listings.
//! - `uploads`: upload ticket issuance.
//! - `health`: liveness and readiness checks.

pub mod health;
pub mod images;
pub mod uploads;
