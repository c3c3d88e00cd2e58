//! Per-part tracking for a multipart upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One planned part of an upload.
///
/// Rows are created alongside the parent record and removed with it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct PartRecord {
    /// Parent upload id.
    pub upload_id: Uuid,

    /// Part number (1-based, unique per upload).
    pub part_number: i32,

    /// Planned size in bytes.
    pub size_bytes: i64,

    /// ETag reported by the client or confirmed at completion.
    pub etag: Option<String>,

    pub uploaded: bool,

    pub uploaded_at: Option<DateTime<Utc>>,
}

/// A part reference handed to the backend when completing a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}
