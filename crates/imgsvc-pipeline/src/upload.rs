//! # Upload Handler
//!
//! Accepts a raw image, assigns it a fresh [`ImageId`] and writes it to the
//! Raw Store. Image format is not checked here; undecodable uploads fail at
//! transform time. Downstream processing is triggered by the Raw Store's
//! notification, never by the handler.
//!
//! ## Upload Tickets
//!
//! A client may first reserve an id with [`UploadHandler::issue_ticket`] and
//! then upload against it with [`UploadHandler::upload_with_ticket`] within
//! `upload_ttl`. Tickets are single-use. Expired or used tickets are rejected
//! with `TicketExpired`, unknown ones with `NotFound`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use imgsvc_core::{ImageId, PipelineError, ServiceConfig, ValidationError};
use imgsvc_store::ObjectStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::budget::{to_chrono, with_budget};

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub image_id: ImageId,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A reserved image id that accepts one upload until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub image_id: ImageId,
    pub upload_path: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketState {
    Issued,
    Redeeming,
    Used,
}

#[derive(Debug, Clone, Copy)]
struct TicketRecord {
    state: TicketState,
    expires_at: DateTime<Utc>,
}

/// Validates uploads and writes them to the Raw Store.
pub struct UploadHandler {
    raw: Arc<dyn ObjectStore>,
    max_upload_bytes: u64,
    upload_ttl: chrono::Duration,
    budget: Duration,
    tickets: Mutex<HashMap<ImageId, TicketRecord>>,
}

impl UploadHandler {
    pub fn new(raw: Arc<dyn ObjectStore>, config: &ServiceConfig) -> Self {
        Self {
            raw,
            max_upload_bytes: config.max_upload_bytes,
            upload_ttl: to_chrono(config.upload_ttl()),
            budget: config.invocation_timeout(),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Store `bytes` under a freshly generated id.
    ///
    /// Each call generates a new id, so retrying a failed upload is safe.
    pub async fn upload(
        &self,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<UploadReceipt, PipelineError> {
        self.check_payload(&bytes)?;
        self.store(ImageId::generate(), bytes, content_type).await
    }

    /// Reserve an image id for a later upload.
    pub fn issue_ticket(&self) -> UploadTicket {
        self.issue_ticket_at(Utc::now())
    }

    /// Reserve an image id as of `now`.
    pub fn issue_ticket_at(&self, now: DateTime<Utc>) -> UploadTicket {
        let image_id = ImageId::generate();
        let expires_at = now + self.upload_ttl;
        let mut tickets = self.tickets.lock();
        // Forget tickets that expired more than one ttl ago.
        let horizon = now - self.upload_ttl;
        tickets.retain(|_, t| t.expires_at > horizon);
        tickets.insert(
            image_id.clone(),
            TicketRecord {
                state: TicketState::Issued,
                expires_at,
            },
        );
        tracing::debug!(image_id = %image_id, %expires_at, "upload ticket issued");
        UploadTicket {
            upload_path: format!("/v1/images/{image_id}"),
            image_id,
            expires_at,
        }
    }

    /// Upload against a previously issued ticket.
    pub async fn upload_with_ticket(
        &self,
        image_id: &ImageId,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<UploadReceipt, PipelineError> {
        self.check_payload(&bytes)?;
        let redemption = self.begin_redeem(image_id, Utc::now())?;
        let receipt = self.store(image_id.clone(), bytes, content_type).await?;
        redemption.commit();
        Ok(receipt)
    }

    fn check_payload(&self, bytes: &Bytes) -> Result<(), PipelineError> {
        let size = bytes.len() as u64;
        if size == 0 {
            return Err(ValidationError::EmptyPayload.into());
        }
        if size > self.max_upload_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size,
                max: self.max_upload_bytes,
            }
            .into());
        }
        Ok(())
    }

    fn begin_redeem<'a>(
        &'a self,
        image_id: &'a ImageId,
        now: DateTime<Utc>,
    ) -> Result<Redemption<'a>, PipelineError> {
        let mut tickets = self.tickets.lock();
        let ticket = tickets
            .get_mut(image_id)
            .ok_or_else(|| PipelineError::NotFound(format!("upload ticket {image_id}")))?;
        match ticket.state {
            TicketState::Used | TicketState::Redeeming => Err(PipelineError::TicketExpired(
                format!("upload ticket {image_id} already used"),
            )),
            TicketState::Issued if now >= ticket.expires_at => Err(PipelineError::TicketExpired(
                format!("upload ticket {image_id} expired at {}", ticket.expires_at),
            )),
            TicketState::Issued => {
                ticket.state = TicketState::Redeeming;
                Ok(Redemption {
                    handler: self,
                    image_id,
                    committed: false,
                })
            }
        }
    }

    fn set_ticket_state(&self, image_id: &ImageId, state: TicketState) {
        if let Some(ticket) = self.tickets.lock().get_mut(image_id) {
            ticket.state = state;
        }
    }

    async fn store(
        &self,
        image_id: ImageId,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<UploadReceipt, PipelineError> {
        let meta = with_budget(self.budget, async {
            self.raw
                .put(image_id.as_str(), bytes, content_type)
                .await
                .map_err(PipelineError::from)
        })
        .await?;
        tracing::info!(image_id = %image_id, size_bytes = meta.size_bytes, "raw image stored");
        Ok(UploadReceipt {
            image_id,
            size_bytes: meta.size_bytes,
            content_type: meta.content_type,
            uploaded_at: meta.created_at,
        })
    }
}

impl std::fmt::Debug for UploadHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandler")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_ttl", &self.upload_ttl)
            .field("tickets", &self.tickets.lock().len())
            .finish()
    }
}

/// A ticket in the `Redeeming` state.
///
/// Unless committed, dropping it returns the ticket to `Issued`: a failed
/// store write or a cancelled upload leaves the ticket usable.
struct Redemption<'a> {
    handler: &'a UploadHandler,
    image_id: &'a ImageId,
    committed: bool,
}

impl Redemption<'_> {
    fn commit(mut self) {
        self.committed = true;
        self.handler.set_ticket_state(self.image_id, TicketState::Used);
    }
}

impl Drop for Redemption<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.handler
                .set_ticket_state(self.image_id, TicketState::Issued);
        }
    }
}
