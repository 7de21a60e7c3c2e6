//! # OpenAPI Document Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI document
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI document for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgsvc: Image Transformation Service",
        version = "0.1.0",
        description = "Raw image uploads, upload tickets, and on-demand image variants served through an edge cache."
    ),
    paths(
        crate::routes::images::upload_image,
        crate::routes::images::upload_with_ticket,
        crate::routes::images::get_variant,
        crate::routes::images::list_variants,
        crate::routes::uploads::issue_ticket,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::images::UploadResponse,
        crate::routes::images::VariantEntryResponse,
        crate::routes::uploads::TicketResponse,
    )),
    tags(
        (name = "images", description = "Raw uploads and variant delivery"),
        (name = "uploads", description = "Upload tickets"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
