//! # Pipeline Metrics
//!
//! Counters recorded through the `metrics` facade. Without an installed
//! recorder they are no-ops; the API binary installs a Prometheus recorder.

/// Variant lookups by outcome: `hit`, `miss`, `pending_wait`,
/// `consistency_fault`.
pub const VARIANT_LOOKUPS: &str = "imgsvc_variant_lookups_total";

/// Transform invocations by trigger: `eager`, `on_demand`, `self_heal`.
pub const TRANSFORM_INVOCATIONS: &str = "imgsvc_transform_invocations_total";

/// Ready index entries whose formatted object was missing.
pub const CONSISTENCY_FAULTS: &str = "imgsvc_consistency_faults_total";

pub(crate) fn record_lookup(outcome: &'static str) {
    ::metrics::counter!(VARIANT_LOOKUPS, "outcome" => outcome).increment(1);
}

pub(crate) fn record_transform(trigger: Trigger) {
    ::metrics::counter!(TRANSFORM_INVOCATIONS, "trigger" => trigger.as_str()).increment(1);
}

pub(crate) fn record_consistency_fault() {
    ::metrics::counter!(CONSISTENCY_FAULTS).increment(1);
}

/// Why a transform ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Eager,
    OnDemand,
    SelfHeal,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::OnDemand => "on_demand",
            Self::SelfHeal => "self_heal",
        }
    }
}
