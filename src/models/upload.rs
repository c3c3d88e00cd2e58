//! Represents a single large-file upload and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of an upload record.
///
/// `pending → uploading → processing → completed`, with `failed` reachable from
/// every non-terminal state. `completed` and `failed` are terminal.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// States in which the client may still obtain part URLs and report parts.
    pub const ACCEPTING_PARTS: [UploadStatus; 2] = [UploadStatus::Pending, UploadStatus::Uploading];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    pub fn accepts_parts(&self) -> bool {
        Self::ACCEPTING_PARTS.contains(self)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-exposure tier of an upload.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Unlisted,
}

/// An upload as persisted in the `uploads` table.
///
/// The payload itself never passes through this service; the record tracks the
/// multipart session the client is feeding directly in object storage.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadRecord {
    /// Internal UUID, also the public record id.
    pub id: Uuid,

    /// Principal id of the uploader.
    pub owner_id: i64,

    pub title: String,

    /// Free-form description, empty when the client sent none.
    pub description: String,

    /// Filename as declared by the client.
    pub original_filename: String,

    /// Declared size in bytes.
    pub file_size: i64,

    /// Declared MIME type (one of the allowed video container types).
    pub mime_type: String,

    /// Bucket holding the object.
    pub bucket: String,

    /// Object key within the bucket, unique across all records.
    pub object_key: String,

    /// Multipart upload id assigned by the storage backend.
    pub session_id: String,

    /// Suggested part size in bytes.
    pub chunk_size: i64,

    /// Suggested number of parts.
    pub total_chunks: i64,

    pub status: UploadStatus,

    /// Percentage in `0.0..=100.0`; reaches 100 only on completion.
    pub progress: f64,

    pub visibility: Visibility,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set exactly when `status` is `completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn is_owned_by(&self, principal_id: i64) -> bool {
        self.owner_id == principal_id
    }

    /// Whether `viewer` may read this record at all.
    pub fn is_visible_to(&self, viewer: Option<i64>) -> bool {
        self.visibility == Visibility::Public || viewer.is_some_and(|id| self.is_owned_by(id))
    }
}

/// Public projection of an [`UploadRecord`].
///
/// Storage locators and the multipart session id stay server-side.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadView {
    pub id: Uuid,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub status: UploadStatus,
    pub progress: f64,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<UploadRecord> for UploadView {
    fn from(record: UploadRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            title: record.title,
            description: record.description,
            original_filename: record.original_filename,
            file_size: record.file_size,
            mime_type: record.mime_type,
            chunk_size: record.chunk_size,
            total_chunks: record.total_chunks,
            status: record.status,
            progress: record.progress,
            visibility: record.visibility,
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
        }
    }
}
