//! Defines routes for the upload lifecycle.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Collection**
//!   - `POST /uploads` — initiate a multipart upload
//!   - `GET  /uploads` — list visible uploads (status, owner_id, mine, limit, cursor)
//!
//! - **Single upload**
//!   - `GET  /uploads/{id}` — fetch one upload
//!   - `PATCH /uploads/{id}` — edit title, description, visibility
//!   - `DELETE /uploads/{id}` — delete the upload and its parts
//!   - `GET  /uploads/{id}/parts` — per-part tracking
//!   - `POST /uploads/{id}/part-urls` — presign part URLs
//!   - `PUT  /uploads/{id}/parts/{part_number}` — report an uploaded part
//!   - `POST /uploads/{id}/complete` — complete the multipart session
//!   - `POST /uploads/{id}/abort` — abort the multipart session

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{
            abort_upload, complete_upload, delete_upload, get_upload, initiate_upload, list_parts,
            list_uploads, report_part, request_part_urls, update_upload,
        },
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for every upload route.
///
/// The router carries shared state (`UploadService`) to all handlers.
pub fn routes() -> Router<UploadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/uploads", post(initiate_upload).get(list_uploads))
        .route(
            "/uploads/{id}",
            get(get_upload).patch(update_upload).delete(delete_upload),
        )
        .route("/uploads/{id}/parts", get(list_parts))
        .route("/uploads/{id}/part-urls", post(request_part_urls))
        .route("/uploads/{id}/parts/{part_number}", put(report_part))
        .route("/uploads/{id}/complete", post(complete_upload))
        .route("/uploads/{id}/abort", post(abort_upload))
}
