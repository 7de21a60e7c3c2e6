//! # Raw-Created Notifications
//!
//! [`NotifyingStore`] decorates the Raw Store: after each completed `put` it
//! emits a [`RawCreatedEvent`] on an in-process channel. Uploaders never call
//! the transformer themselves; the eager worker drains the channel.
//!
//! Delivery is at-least-once from the consumer's point of view: a re-upload
//! under the same key emits a second event, and consumers must be
//! idempotent.

use async_trait::async_trait;
use bytes::Bytes;
use imgsvc_core::ImageId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::object::{ObjectMeta, ObjectStore, StoredObject};

/// A raw image finished landing in the Raw Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCreatedEvent {
    pub image_id: ImageId,
    /// Raw Store object key.
    pub key: String,
}

/// Raw Store decorator that announces completed writes.
pub struct NotifyingStore<S> {
    inner: S,
    events: mpsc::UnboundedSender<RawCreatedEvent>,
}

impl<S: ObjectStore> NotifyingStore<S> {
    /// Wrap `inner`, returning the store and the receiving end of its event
    /// channel.
    pub fn new(inner: S) -> (Self, mpsc::UnboundedReceiver<RawCreatedEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { inner, events }, rx)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for NotifyingStore<S> {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<ObjectMeta, StoreError> {
        let meta = self.inner.put(key, bytes, content_type).await?;
        match ImageId::parse(key) {
            Ok(image_id) => {
                let event = RawCreatedEvent {
                    image_id,
                    key: key.to_string(),
                };
                if self.events.send(event).is_err() {
                    tracing::warn!(key, "raw-created event dropped: no consumer");
                }
            }
            Err(_) => tracing::warn!(key, "raw object key is not an image id; no event emitted"),
        }
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}
