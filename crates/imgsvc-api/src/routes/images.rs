//! # Image Routes
//!
//! | Method & path                         | Handler               |
//! |---------------------------------------|-----------------------|
//! | `POST /v1/images`                     | [`upload_image`]      |
//! | `PUT /v1/images/{image_id}`           | [`upload_with_ticket`]|
//! | `GET /v1/images/{image_id}?w=&h=...`  | [`get_variant`]       |
//! | `GET /v1/images/{image_id}/variants`  | [`list_variants`]     |
//!
//! The variant read sits behind the edge cache. It answers `200` when the
//! variant came from the index and `201` when this request computed it.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use imgsvc_core::{ImageId, TransformConfig, VariantIndexEntry, VariantState};
use imgsvc_pipeline::{ServedSource, UploadReceipt};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::middleware::edge_cache::{edge_cache_middleware, EdgeCache};
use crate::state::AppState;

/// Response header naming the canonical cfg key of a served variant.
pub const X_CFG_KEY: HeaderName = HeaderName::from_static("x-cfg-key");

/// Build the images router.
///
/// `body_limit` is the largest request body accepted before the upload
/// handler sees it.
pub fn router(edge_cache: EdgeCache, body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/v1/images", post(upload_image))
        .route(
            "/v1/images/{image_id}",
            get(get_variant)
                .layer(from_fn_with_state(edge_cache, edge_cache_middleware))
                .put(upload_with_ticket),
        )
        .route("/v1/images/{image_id}/variants", get(list_variants))
        .layer(DefaultBodyLimit::max(body_limit))
}

// -- DTOs ---------------------------------------------------------------------

/// A stored raw image.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub image_id: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            image_id: receipt.image_id.to_string(),
            size_bytes: receipt.size_bytes,
            content_type: receipt.content_type,
            uploaded_at: receipt.uploaded_at,
        }
    }
}

/// One Variant Index entry of an image.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantEntryResponse {
    pub cfg_key: String,
    /// `pending` or `ready`.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
}

impl From<VariantIndexEntry> for VariantEntryResponse {
    fn from(entry: VariantIndexEntry) -> Self {
        let cfg_key = entry.key.cfg_key.to_string();
        match entry.state {
            VariantState::Pending { claimed_at } => Self {
                cfg_key,
                state: "pending".into(),
                claimed_at: Some(claimed_at),
                storage_location: None,
                size_bytes: None,
                content_type: None,
                content_digest: None,
                computed_at: None,
            },
            VariantState::Ready(v) => Self {
                cfg_key,
                state: "ready".into(),
                claimed_at: None,
                storage_location: Some(v.storage_location),
                size_bytes: Some(v.size_bytes),
                content_type: Some(v.content_type),
                content_digest: Some(v.content_digest),
                computed_at: Some(v.computed_at),
            },
        }
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/images: Store a raw image under a new id.
#[utoipa::path(
    post,
    path = "/v1/images",
    request_body(content = Vec<u8>, description = "Raw image bytes", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 413, description = "Payload exceeds the upload limit", body = crate::error::ErrorBody),
        (status = 422, description = "Empty payload", body = crate::error::ErrorBody),
        (status = 503, description = "Raw Store unavailable", body = crate::error::ErrorBody),
    ),
    tag = "images"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let receipt = state.uploads.upload(body, content_type(&headers)).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// PUT /v1/images/{image_id}: Upload against an issued ticket.
#[utoipa::path(
    put,
    path = "/v1/images/{image_id}",
    params(("image_id" = String, Path, description = "Id reserved by an upload ticket")),
    request_body(content = Vec<u8>, description = "Raw image bytes", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 404, description = "No ticket for this id", body = crate::error::ErrorBody),
        (status = 410, description = "Ticket expired or already used", body = crate::error::ErrorBody),
        (status = 413, description = "Payload exceeds the upload limit", body = crate::error::ErrorBody),
    ),
    tag = "images"
)]
pub async fn upload_with_ticket(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let image_id = ImageId::parse(&image_id)?;
    let receipt = state
        .uploads
        .upload_with_ticket(&image_id, body, content_type(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// GET /v1/images/{image_id}: Serve a variant, computing it on a miss.
#[utoipa::path(
    get,
    path = "/v1/images/{image_id}",
    params(
        ("image_id" = String, Path, description = "Image id"),
        ("w" = u32, Query, description = "Output width in pixels (alias `width`)"),
        ("h" = u32, Query, description = "Output height in pixels (alias `height`)"),
        ("fmt" = Option<String>, Query, description = "png (default), jpeg, webp, or gif (alias `format`)"),
        ("q" = Option<u8>, Query, description = "JPEG quality 1-100 (alias `quality`)"),
        ("fit" = Option<String>, Query, description = "contain (default), cover, or fill"),
    ),
    responses(
        (status = 200, description = "Variant served from the index"),
        (status = 201, description = "Variant computed by this request"),
        (status = 404, description = "Unknown image", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid parameters or undecodable image", body = crate::error::ErrorBody),
        (status = 504, description = "Invocation budget exceeded", body = crate::error::ErrorBody),
    ),
    tag = "images"
)]
pub async fn get_variant(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let image_id = ImageId::parse(&image_id)?;
    let cfg = TransformConfig::from_query(query.as_deref().unwrap_or_default())?;
    let served = state.on_demand.get_or_compute(&image_id, &cfg).await?;

    let status = match served.source {
        ServedSource::Index => StatusCode::OK,
        ServedSource::Computed => StatusCode::CREATED,
    };
    Ok((
        status,
        [
            (CONTENT_TYPE, served.content_type),
            (X_CFG_KEY, served.cfg_key.to_string()),
        ],
        served.bytes,
    )
        .into_response())
}

/// GET /v1/images/{image_id}/variants: List the image's index entries.
#[utoipa::path(
    get,
    path = "/v1/images/{image_id}/variants",
    params(("image_id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Index entries in cfg key order", body = Vec<VariantEntryResponse>),
        (status = 422, description = "Invalid image id", body = crate::error::ErrorBody),
    ),
    tag = "images"
)]
pub async fn list_variants(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<Vec<VariantEntryResponse>>, AppError> {
    let image_id = ImageId::parse(&image_id)?;
    let entries = state.on_demand.variants(&image_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
