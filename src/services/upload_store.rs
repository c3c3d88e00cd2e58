//! src/services/upload_store.rs
//!
//! UploadStore: SQLite persistence for upload records and their parts.
//! Every state change is a conditional `UPDATE ... WHERE status IN (...)`, so
//! two writers racing on the same record (even from separate processes sharing
//! the database) cannot both win.

use crate::models::{
    part::{CompletedPart, PartRecord},
    upload::{UploadRecord, UploadStatus, Visibility},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const UPLOAD_COLUMNS: &str = "id, owner_id, title, description, original_filename, file_size, \
     mime_type, bucket, object_key, session_id, chunk_size, total_chunks, status, progress, \
     visibility, created_at, updated_at, completed_at";

/// Part reports alone never push progress to 100; only completion does.
pub const MAX_PROGRESS_BEFORE_COMPLETION: f64 = 99.0;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object key `{0}` is already tracked by another upload")]
    DuplicateObjectKey(String),
    #[error("part {part_number} is not planned for upload {upload_id}")]
    PartNotFound { upload_id: Uuid, part_number: i32 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyset position for newest-first listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ListCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ListCursor {
    /// Opaque token handed to clients.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}|{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id
        );
        general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Option<Self> {
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(token).ok()?;
        let raw = String::from_utf8(bytes).ok()?;
        let (created_at, id) = raw.split_once('|')?;
        Some(Self {
            created_at: DateTime::parse_from_rfc3339(created_at)
                .ok()?
                .with_timezone(&Utc),
            id: Uuid::parse_str(id).ok()?,
        })
    }
}

/// Visibility-filtered listing parameters.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    /// Authenticated viewer, `None` for anonymous callers.
    pub viewer: Option<i64>,
    pub status: Option<UploadStatus>,
    pub owner_id: Option<i64>,
    pub after: Option<ListCursor>,
    pub limit: usize,
}

#[derive(Debug)]
pub struct ListPage {
    pub uploads: Vec<UploadRecord>,
    pub next_cursor: Option<ListCursor>,
}

#[derive(Clone)]
pub struct UploadStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl UploadStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Persist a new record and its planned parts in one transaction.
    pub async fn insert_upload(
        &self,
        record: &UploadRecord,
        parts: &[PartRecord],
    ) -> StoreResult<UploadRecord> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            "INSERT INTO uploads ({UPLOAD_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {UPLOAD_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.original_filename)
            .bind(record.file_size)
            .bind(&record.mime_type)
            .bind(&record.bucket)
            .bind(&record.object_key)
            .bind(&record.session_id)
            .bind(record.chunk_size)
            .bind(record.total_chunks)
            .bind(record.status)
            .bind(record.progress)
            .bind(record.visibility)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.completed_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::DuplicateObjectKey(record.object_key.clone())
                } else {
                    StoreError::Sqlx(err)
                }
            })?;

        for part in parts {
            sqlx::query(
                "INSERT INTO upload_parts (upload_id, part_number, size_bytes, etag, uploaded, uploaded_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(part.upload_id)
            .bind(part.part_number)
            .bind(part.size_bytes)
            .bind(&part.etag)
            .bind(part.uploaded)
            .bind(part.uploaded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn fetch_upload(&self, id: Uuid) -> StoreResult<Option<UploadRecord>> {
        let sql = format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?");
        let record = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }

    /// Parts of an upload in part-number order.
    pub async fn fetch_parts(&self, id: Uuid) -> StoreResult<Vec<PartRecord>> {
        let parts = sqlx::query_as::<_, PartRecord>(
            "SELECT upload_id, part_number, size_bytes, etag, uploaded, uploaded_at
             FROM upload_parts WHERE upload_id = ? ORDER BY part_number ASC",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await?;
        Ok(parts)
    }

    /// Move `id` to `to` if its status is currently one of `from`.
    ///
    /// Returns the updated record, or `None` when the precondition did not
    /// hold (record missing or in another state).
    pub async fn transition(
        &self,
        id: Uuid,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> StoreResult<Option<UploadRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE uploads SET status = ");
        builder.push_bind(to);
        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in from {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");
        builder.push(" RETURNING ");
        builder.push(UPLOAD_COLUMNS);

        let record = builder
            .build_query_as::<UploadRecord>()
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }

    /// Finalize a record claimed for completion (`processing`) and record the
    /// ETag of every submitted part.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        parts: &[CompletedPart],
    ) -> StoreResult<Option<UploadRecord>> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let sql = format!(
            "UPDATE uploads
             SET status = ?, progress = 100, completed_at = ?, updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING {UPLOAD_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(UploadStatus::Completed)
            .bind(now)
            .bind(now)
            .bind(id)
            .bind(UploadStatus::Processing)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(record) = record else {
            tx.rollback().await?;
            return Ok(None);
        };

        for part in parts {
            sqlx::query(
                "UPDATE upload_parts
                 SET etag = ?, uploaded = 1, uploaded_at = COALESCE(uploaded_at, ?)
                 WHERE upload_id = ? AND part_number = ?",
            )
            .bind(&part.etag)
            .bind(now)
            .bind(id)
            .bind(part.part_number)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Mark one part uploaded, bump `pending` to `uploading` and raise progress
    /// to the uploaded-bytes percentage. Progress never decreases.
    ///
    /// Returns `None` (and changes nothing) when the upload no longer accepts
    /// parts.
    pub async fn record_part_uploaded(
        &self,
        record: &UploadRecord,
        part_number: i32,
        etag: &str,
    ) -> StoreResult<Option<UploadRecord>> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE upload_parts
             SET etag = ?, uploaded = 1, uploaded_at = ?
             WHERE upload_id = ? AND part_number = ?",
        )
        .bind(etag)
        .bind(now)
        .bind(record.id)
        .bind(part_number)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::PartNotFound {
                upload_id: record.id,
                part_number,
            });
        }

        let uploaded_bytes: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM upload_parts
             WHERE upload_id = ? AND uploaded = 1",
        )
        .bind(record.id)
        .fetch_one(&mut *tx)
        .await?;

        let progress = (uploaded_bytes as f64 * 100.0 / record.file_size as f64)
            .min(MAX_PROGRESS_BEFORE_COMPLETION);

        let sql = format!(
            "UPDATE uploads
             SET status = CASE WHEN status = 'pending' THEN 'uploading' ELSE status END,
                 progress = MAX(progress, ?),
                 updated_at = ?
             WHERE id = ? AND status IN ('pending', 'uploading')
             RETURNING {UPLOAD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, UploadRecord>(&sql)
            .bind(progress)
            .bind(now)
            .bind(record.id)
            .fetch_optional(&mut *tx)
            .await?;

        match updated {
            Some(updated) => {
                tx.commit().await?;
                Ok(Some(updated))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    /// List records visible to `query.viewer`, newest first.
    ///
    /// Anonymous viewers only see public records; an authenticated viewer also
    /// sees every record they own.
    pub async fn list_uploads(&self, query: &ListQuery) -> StoreResult<ListPage> {
        let limit = query.limit.max(1);
        let fetch_limit = limit + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE "
        ));
        match query.viewer {
            Some(viewer) => {
                builder.push("(visibility = 'public' OR owner_id = ");
                builder.push_bind(viewer);
                builder.push(")");
            }
            None => {
                builder.push("visibility = 'public'");
            }
        }

        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }

        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ");
            builder.push_bind(owner_id);
        }

        if let Some(after) = &query.after {
            builder.push(" AND (created_at < ");
            builder.push_bind(after.created_at);
            builder.push(" OR (created_at = ");
            builder.push_bind(after.created_at);
            builder.push(" AND id < ");
            builder.push_bind(after.id);
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut uploads: Vec<UploadRecord> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_cursor = None;
        if uploads.len() == fetch_limit {
            uploads.pop();
            next_cursor = uploads.last().map(|last| ListCursor {
                created_at: last.created_at,
                id: last.id,
            });
        }

        Ok(ListPage {
            uploads,
            next_cursor,
        })
    }

    /// Overwrite the editable metadata of `id`; `None` fields are left as they
    /// are. Returns `None` when the record does not exist.
    pub async fn update_details(
        &self,
        id: Uuid,
        details: &DetailsUpdate,
    ) -> StoreResult<Option<UploadRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE uploads SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(title) = &details.title {
            builder.push(", title = ");
            builder.push_bind(title.clone());
        }
        if let Some(description) = &details.description {
            builder.push(", description = ");
            builder.push_bind(description.clone());
        }
        if let Some(visibility) = details.visibility {
            builder.push(", visibility = ");
            builder.push_bind(visibility);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(UPLOAD_COLUMNS);

        let record = builder
            .build_query_as::<UploadRecord>()
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }

    /// Delete `id` (and, through the foreign key, its parts) if its status is
    /// one of `from`. Returns whether a row was removed.
    pub async fn delete_upload(&self, id: Uuid, from: &[UploadStatus]) -> StoreResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM uploads WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in from {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&*self.db).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Editable metadata of an existing upload.
#[derive(Clone, Debug, Default)]
pub struct DetailsUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
