//! Core data models for the upload service.
//!
//! Records map to database tables via `sqlx::FromRow` and serialize as JSON
//! via `serde`.

pub mod part;
pub mod principal;
pub mod upload;
