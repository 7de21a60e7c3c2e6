//! # Upload Ticket Routes
//!
//! `POST /v1/uploads` reserves an image id. The client then uploads once to
//! the returned `upload_path` with `PUT` before `expires_at`. A ticket that
//! has expired or was already used answers `410 Gone`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use imgsvc_pipeline::UploadTicket;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// Build the upload tickets router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/uploads", post(issue_ticket))
}

/// An issued upload ticket.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TicketResponse {
    pub image_id: String,
    /// Path to `PUT` the image bytes to.
    pub upload_path: String,
    pub expires_at: DateTime<Utc>,
}

impl From<UploadTicket> for TicketResponse {
    fn from(ticket: UploadTicket) -> Self {
        Self {
            image_id: ticket.image_id.to_string(),
            upload_path: ticket.upload_path,
            expires_at: ticket.expires_at,
        }
    }
}

/// POST /v1/uploads: Issue an upload ticket.
#[utoipa::path(
    post,
    path = "/v1/uploads",
    responses(
        (status = 201, description = "Ticket issued", body = TicketResponse),
    ),
    tag = "uploads"
)]
pub async fn issue_ticket(State(state): State<AppState>) -> (StatusCode, Json<TicketResponse>) {
    let ticket = state.uploads.issue_ticket();
    (StatusCode::CREATED, Json(ticket.into()))
}
