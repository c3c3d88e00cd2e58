//! src/services/upload_service.rs
//!
//! UploadService drives an upload through
//! `pending → uploading → processing → completed` (or `failed`), keeping the
//! local record and the remote multipart session consistent.
//!
//! Callers pass the authenticated principal explicitly into every operation.
//! Validation and ownership failures return before anything is written or
//! any backend call is made.

use crate::models::{
    part::{CompletedPart, PartRecord},
    principal::Principal,
    upload::{UploadRecord, UploadStatus, UploadView, Visibility},
};
use crate::services::{
    chunk_planner::{ChunkPlanError, ChunkPlanner},
    object_storage::{ObjectStorage, ObjectStorageError, PART_NUMBER_RANGE, generate_object_key},
    upload_store::{DetailsUpdate, ListCursor, ListQuery, StoreError, UploadStore},
};
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Container types accepted at initiation. `video/quicktime` and
/// `video/x-matroska` are the registered names of mov and mkv.
pub const ALLOWED_MIME_TYPES: [&str; 6] = [
    "video/mp4",
    "video/mov",
    "video/quicktime",
    "video/webm",
    "video/mkv",
    "video/x-matroska",
];

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_ETAG_LEN: usize = 255;

pub const DEFAULT_KEY_PREFIX: &str = "uploads/videos";

/// Statuses in which a record may be deleted. `processing` is excluded while a
/// completion is in flight.
const DELETABLE: [UploadStatus; 4] = [
    UploadStatus::Pending,
    UploadStatus::Uploading,
    UploadStatus::Completed,
    UploadStatus::Failed,
];

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("only the uploader may modify this upload")]
    Forbidden,
    #[error("cannot {operation} an upload in `{status}` state")]
    InvalidState {
        status: UploadStatus,
        operation: &'static str,
    },
    #[error("upload not found")]
    NotFound,
    #[error("{0}")]
    StorageInit(String),
    #[error("{0}")]
    StorageSign(String),
    #[error("{0}")]
    StorageComplete(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation_error",
            UploadError::Forbidden => "forbidden",
            UploadError::InvalidState { .. } => "invalid_state",
            UploadError::NotFound => "not_found",
            UploadError::StorageInit(_) => "storage_init_error",
            UploadError::StorageSign(_) => "storage_sign_error",
            UploadError::StorageComplete(_) => "storage_complete_error",
            UploadError::Store(_) => "internal",
        }
    }

    fn validation(msg: impl Into<String>) -> Self {
        UploadError::Validation(msg.into())
    }
}

impl From<ChunkPlanError> for UploadError {
    fn from(err: ChunkPlanError) -> Self {
        UploadError::Validation(err.to_string())
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Body of an initiate request.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateUpload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// Editable metadata; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUpload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// What the client needs to start sending parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedUpload {
    pub record_id: Uuid,
    pub session_id: String,
    pub object_key: String,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartUrl {
    pub part_number: i32,
    pub url: String,
}

/// Listing filters as received from the boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub status: Option<UploadStatus>,
    pub owner_id: Option<i64>,
    /// Restrict to the caller's own uploads.
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadList {
    pub uploads: Vec<UploadView>,
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct UploadService {
    pub storage: Arc<dyn ObjectStorage>,
    pub store: UploadStore,
    pub planner: ChunkPlanner,
    pub key_prefix: String,
    pub presign_ttl: Duration,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: UploadStore,
        planner: ChunkPlanner,
        key_prefix: impl Into<String>,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            store,
            planner,
            key_prefix: key_prefix.into(),
            presign_ttl,
        }
    }

    /// Open a multipart session and record it as `pending`.
    ///
    /// No record is written unless the backend session exists; if the write
    /// fails afterwards the session is aborted before the error is returned.
    pub async fn initiate(
        &self,
        principal: Principal,
        request: InitiateUpload,
    ) -> UploadResult<InitiatedUpload> {
        let title = validate_title(&request.title)?;

        let original_filename = request.original_filename.trim().to_string();
        if original_filename.is_empty() {
            return Err(UploadError::validation("original_filename is required"));
        }
        if original_filename.chars().count() > MAX_FILENAME_LEN {
            return Err(UploadError::validation(format!(
                "original_filename must be at most {MAX_FILENAME_LEN} characters"
            )));
        }

        let mime_type = request.mime_type.trim().to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(UploadError::validation(format!(
                "unsupported mime type `{}`; allowed: {}",
                request.mime_type,
                ALLOWED_MIME_TYPES.join(", ")
            )));
        }

        let plan = self.planner.plan(request.file_size)?;

        let object_key = generate_object_key(&self.key_prefix, principal.id(), &original_filename);
        let session_id = self
            .storage
            .initiate_multipart(&object_key, &mime_type)
            .await
            .map_err(|err| UploadError::StorageInit(err.to_string()))?;

        let now = Utc::now();
        let record = UploadRecord {
            id: Uuid::new_v4(),
            owner_id: principal.id(),
            title,
            description: request.description.unwrap_or_default(),
            original_filename,
            file_size: plan.file_size,
            mime_type,
            bucket: self.storage.bucket().to_string(),
            object_key,
            session_id,
            chunk_size: plan.chunk_size,
            total_chunks: plan.total_chunks,
            status: UploadStatus::Pending,
            progress: 0.0,
            visibility: request.visibility.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let parts = (1..=plan.total_chunks)
            .filter_map(|n| {
                plan.part_size(n).map(|size_bytes| PartRecord {
                    upload_id: record.id,
                    part_number: n as i32,
                    size_bytes,
                    etag: None,
                    uploaded: false,
                    uploaded_at: None,
                })
            })
            .collect::<Vec<_>>();

        let record = match self.store.insert_upload(&record, &parts).await {
            Ok(record) => record,
            Err(err) => {
                error!(
                    "failed to persist upload for key {}: {}; aborting session",
                    record.object_key, err
                );
                self.abort_session(&record.object_key, &record.session_id)
                    .await;
                return Err(err.into());
            }
        };

        info!(
            "upload {} initiated by {}: key={} parts={}",
            record.id, record.owner_id, record.object_key, record.total_chunks
        );

        Ok(InitiatedUpload {
            record_id: record.id,
            session_id: record.session_id,
            object_key: record.object_key,
            chunk_size: record.chunk_size,
            total_chunks: record.total_chunks,
            status: record.status,
        })
    }

    /// Presign one URL per requested part, in request order.
    ///
    /// The first successful request moves a `pending` upload to `uploading`;
    /// later requests leave the status alone.
    pub async fn request_part_urls(
        &self,
        principal: Principal,
        upload_id: Uuid,
        part_numbers: &[i32],
    ) -> UploadResult<Vec<PartUrl>> {
        let record = self.owned_record(principal, upload_id).await?;
        ensure_accepts_parts(&record, "request part urls for")?;

        if part_numbers.is_empty() {
            return Err(UploadError::validation("part_numbers must not be empty"));
        }
        for &part_number in part_numbers {
            ensure_planned_part(&record, part_number)?;
        }

        let urls = try_join_all(part_numbers.iter().map(|&part_number| {
            let record = &record;
            async move {
                self.storage
                    .presign_part_url(
                        &record.object_key,
                        &record.session_id,
                        part_number,
                        self.presign_ttl,
                    )
                    .await
                    .map(|url| PartUrl { part_number, url })
            }
        }))
        .await
        .map_err(|err| match err {
            ObjectStorageError::InvalidPartNumber(_) => UploadError::Validation(err.to_string()),
            other => UploadError::StorageSign(other.to_string()),
        })?;

        if record.status == UploadStatus::Pending
            && self
                .store
                .transition(upload_id, &[UploadStatus::Pending], UploadStatus::Uploading)
                .await?
                .is_some()
        {
            info!("upload {} is now uploading", upload_id);
        }

        Ok(urls)
    }

    /// Record that the client finished sending one part.
    pub async fn report_part_uploaded(
        &self,
        principal: Principal,
        upload_id: Uuid,
        part_number: i32,
        etag: &str,
    ) -> UploadResult<UploadView> {
        let record = self.owned_record(principal, upload_id).await?;
        ensure_accepts_parts(&record, "report parts for")?;
        ensure_planned_part(&record, part_number)?;
        let etag = ensure_etag(etag)?;

        match self
            .store
            .record_part_uploaded(&record, part_number, etag)
            .await?
        {
            Some(updated) => Ok(updated.into()),
            None => Err(self.current_state_error(upload_id, "report parts for").await),
        }
    }

    /// Assemble the remote object and finalize the record.
    ///
    /// Parts are sorted by part number before reaching the backend. Only one
    /// concurrent caller can claim the record; the others get `InvalidState`.
    /// A backend rejection leaves the record `failed`.
    pub async fn complete(
        &self,
        principal: Principal,
        upload_id: Uuid,
        parts: Vec<CompletedPart>,
    ) -> UploadResult<UploadView> {
        let record = self.owned_record(principal, upload_id).await?;
        ensure_accepts_parts(&record, "complete")?;
        let parts = normalize_parts(&record, parts)?;

        let Some(claimed) = self
            .store
            .transition(
                upload_id,
                &UploadStatus::ACCEPTING_PARTS,
                UploadStatus::Processing,
            )
            .await?
        else {
            return Err(self.current_state_error(upload_id, "complete").await);
        };

        if let Err(err) = self
            .storage
            .complete_multipart(&claimed.object_key, &claimed.session_id, &parts)
            .await
        {
            warn!("completion of upload {} rejected: {}", upload_id, err);
            self.fail_claimed(upload_id).await;
            return Err(UploadError::StorageComplete(err.to_string()));
        }

        // The object is assembled remotely; the record must not stay `processing`.
        let completed = match self.store.mark_completed(upload_id, &parts).await {
            Err(err) => {
                warn!(
                    "recording completion of upload {} failed: {}; retrying",
                    upload_id, err
                );
                self.store.mark_completed(upload_id, &parts).await
            }
            done => done,
        };

        match completed {
            Err(err) => {
                error!("could not record completion of upload {}: {}", upload_id, err);
                self.fail_claimed(upload_id).await;
                Err(err.into())
            }
            Ok(Some(completed)) => {
                info!(
                    "upload {} completed: key={} parts={}",
                    upload_id,
                    completed.object_key,
                    parts.len()
                );
                Ok(completed.into())
            }
            Ok(None) => Err(self.current_state_error(upload_id, "complete").await),
        }
    }

    /// Cancel an upload: mark it `failed` and discard the remote session.
    pub async fn abort(&self, principal: Principal, upload_id: Uuid) -> UploadResult<UploadView> {
        let record = self.owned_record(principal, upload_id).await?;
        ensure_accepts_parts(&record, "abort")?;

        let Some(failed) = self
            .store
            .transition(
                upload_id,
                &UploadStatus::ACCEPTING_PARTS,
                UploadStatus::Failed,
            )
            .await?
        else {
            return Err(self.current_state_error(upload_id, "abort").await);
        };

        self.abort_session(&failed.object_key, &failed.session_id)
            .await;
        info!("upload {} aborted by {}", upload_id, principal.id());
        Ok(failed.into())
    }

    /// Edit title, description or visibility. Allowed in every status.
    pub async fn update(
        &self,
        principal: Principal,
        upload_id: Uuid,
        request: UpdateUpload,
    ) -> UploadResult<UploadView> {
        self.owned_record(principal, upload_id).await?;
        if request.title.is_none() && request.description.is_none() && request.visibility.is_none()
        {
            return Err(UploadError::validation(
                "at least one of title, description or visibility is required",
            ));
        }

        let details = DetailsUpdate {
            title: request.title.as_deref().map(validate_title).transpose()?,
            description: request.description,
            visibility: request.visibility,
        };
        let updated = self
            .store
            .update_details(upload_id, &details)
            .await?
            .ok_or(UploadError::NotFound)?;
        info!("upload {} updated by {}", upload_id, principal.id());
        Ok(updated.into())
    }

    /// Remove a record and its parts. A session that is still open is
    /// aborted once the row is gone; cleanup failures are only logged.
    pub async fn delete(&self, principal: Principal, upload_id: Uuid) -> UploadResult<()> {
        let record = self.owned_record(principal, upload_id).await?;
        if !(record.status.accepts_parts() || record.status.is_terminal()) {
            return Err(UploadError::InvalidState {
                status: record.status,
                operation: "delete",
            });
        }

        if !self.store.delete_upload(upload_id, &DELETABLE).await? {
            return Err(self.current_state_error(upload_id, "delete").await);
        }
        if record.status.accepts_parts() {
            self.abort_session(&record.object_key, &record.session_id)
                .await;
        }
        info!("upload {} deleted by {}", upload_id, principal.id());
        Ok(())
    }

    /// Per-part tracking for the owner, in part-number order.
    pub async fn parts(&self, principal: Principal, upload_id: Uuid) -> UploadResult<Vec<PartRecord>> {
        self.owned_record(principal, upload_id).await?;
        Ok(self.store.fetch_parts(upload_id).await?)
    }

    /// Fetch one record, hidden entirely from callers who may not see it.
    pub async fn get(&self, viewer: Option<Principal>, upload_id: Uuid) -> UploadResult<UploadView> {
        let viewer = viewer.map(|p| p.id());
        match self.store.fetch_upload(upload_id).await? {
            Some(record) if record.is_visible_to(viewer) => Ok(record.into()),
            _ => Err(UploadError::NotFound),
        }
    }

    /// Visibility-filtered listing, newest first.
    pub async fn list(
        &self,
        viewer: Option<Principal>,
        filter: ListFilter,
    ) -> UploadResult<UploadList> {
        let viewer = viewer.map(|p| p.id());
        let owner_id = if filter.mine {
            Some(viewer.ok_or_else(|| {
                UploadError::validation("`mine` requires an authenticated caller")
            })?)
        } else {
            filter.owner_id
        };

        let after = match filter.cursor.as_deref() {
            Some(token) => Some(
                ListCursor::decode(token)
                    .ok_or_else(|| UploadError::validation("invalid cursor"))?,
            ),
            None => None,
        };

        let page = self
            .store
            .list_uploads(&ListQuery {
                viewer,
                status: filter.status,
                owner_id,
                after,
                limit: filter
                    .limit
                    .unwrap_or(DEFAULT_LIST_LIMIT)
                    .clamp(1, MAX_LIST_LIMIT),
            })
            .await?;

        Ok(UploadList {
            uploads: page.uploads.into_iter().map(UploadView::from).collect(),
            next_cursor: page.next_cursor.map(|cursor| cursor.encode()),
        })
    }

    async fn owned_record(&self, principal: Principal, upload_id: Uuid) -> UploadResult<UploadRecord> {
        let record = self
            .store
            .fetch_upload(upload_id)
            .await?
            .ok_or(UploadError::NotFound)?;
        if !record.is_owned_by(principal.id()) {
            return Err(UploadError::Forbidden);
        }
        Ok(record)
    }

    /// Build the error for a lost conditional transition from the state the
    /// record is in now.
    async fn current_state_error(&self, upload_id: Uuid, operation: &'static str) -> UploadError {
        match self.store.fetch_upload(upload_id).await {
            Ok(Some(record)) => UploadError::InvalidState {
                status: record.status,
                operation,
            },
            Ok(None) => UploadError::NotFound,
            Err(err) => err.into(),
        }
    }

    /// Move a claimed record from `processing` to `failed`, retrying once.
    async fn fail_claimed(&self, upload_id: Uuid) {
        for attempt in 1..=2 {
            match self
                .store
                .transition(upload_id, &[UploadStatus::Processing], UploadStatus::Failed)
                .await
            {
                Ok(_) => {
                    info!("upload {} marked failed", upload_id);
                    return;
                }
                Err(err) => error!(
                    "attempt {} to mark upload {} failed did not succeed: {}",
                    attempt, upload_id, err
                ),
            }
        }
    }

    /// Best-effort session cleanup. Failures are logged and never returned.
    async fn abort_session(&self, object_key: &str, session_id: &str) {
        match self.storage.abort_multipart(object_key, session_id).await {
            Ok(()) => info!("aborted multipart session for {}", object_key),
            Err(err) => warn!(
                "failed to abort multipart session for {}: {}",
                object_key, err
            ),
        }
    }
}

fn validate_title(raw: &str) -> UploadResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(UploadError::validation("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(UploadError::validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn ensure_accepts_parts(record: &UploadRecord, operation: &'static str) -> UploadResult<()> {
    if record.status.accepts_parts() {
        Ok(())
    } else {
        Err(UploadError::InvalidState {
            status: record.status,
            operation,
        })
    }
}

fn ensure_planned_part(record: &UploadRecord, part_number: i32) -> UploadResult<()> {
    let in_plan = i64::from(part_number) >= 1 && i64::from(part_number) <= record.total_chunks;
    if in_plan && PART_NUMBER_RANGE.contains(&part_number) {
        Ok(())
    } else {
        Err(UploadError::validation(format!(
            "part number {part_number} is outside 1..={}",
            record.total_chunks
        )))
    }
}

fn ensure_etag(etag: &str) -> UploadResult<&str> {
    let etag = etag.trim();
    if etag.is_empty() {
        return Err(UploadError::validation("etag must not be empty"));
    }
    if etag.len() > MAX_ETAG_LEN {
        return Err(UploadError::validation(format!(
            "etag must be at most {MAX_ETAG_LEN} bytes"
        )));
    }
    Ok(etag)
}

/// Shape-check the submitted parts and sort them ascending. Client order is
/// not trusted.
fn normalize_parts(
    record: &UploadRecord,
    parts: Vec<CompletedPart>,
) -> UploadResult<Vec<CompletedPart>> {
    if parts.is_empty() {
        return Err(UploadError::validation("parts must not be empty"));
    }

    let mut seen = HashSet::with_capacity(parts.len());
    let mut normalized = Vec::with_capacity(parts.len());
    for part in parts {
        ensure_planned_part(record, part.part_number)?;
        if !seen.insert(part.part_number) {
            return Err(UploadError::validation(format!(
                "part number {} listed more than once",
                part.part_number
            )));
        }
        let etag = ensure_etag(&part.etag)?.to_string();
        normalized.push(CompletedPart {
            part_number: part.part_number,
            etag,
        });
    }

    normalized.sort_by_key(|part| part.part_number);
    Ok(normalized)
}
