//! Multipart video upload service.
//!
//! Clients upload large files straight to S3-compatible object storage through
//! presigned part URLs; this crate tracks each upload in SQLite and keeps the
//! record and the remote multipart session consistent from initiation to
//! completion or failure.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
