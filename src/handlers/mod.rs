//! Axum handlers: the boundary between HTTP and `UploadService`.

pub mod extract;
pub mod health_handlers;
pub mod principal;
pub mod upload_handlers;
