use std::sync::Arc;

use imgsvc_store::{ObjectStore, VariantIndex};
use imgsvc_transform::Transform;

/// The stores, index and transform a pipeline component works against.
#[derive(Clone)]
pub struct Collaborators {
    pub raw: Arc<dyn ObjectStore>,
    pub formatted: Arc<dyn ObjectStore>,
    pub index: Arc<dyn VariantIndex>,
    pub transform: Arc<dyn Transform>,
}

impl Collaborators {
    pub fn new(
        raw: Arc<dyn ObjectStore>,
        formatted: Arc<dyn ObjectStore>,
        index: Arc<dyn VariantIndex>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            raw,
            formatted,
            index,
            transform,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
