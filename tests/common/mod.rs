#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use video_uploads::{
    models::{part::CompletedPart, principal::Principal},
    services::{
        chunk_planner::ChunkPlanner,
        object_storage::{ObjectStorage, ObjectStorageError, ObjectStorageResult},
        upload_service::{InitiateUpload, InitiatedUpload, UploadService},
        upload_store::UploadStore,
    },
};

/// Every call the service made against the object store.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageCall {
    Initiate {
        key: String,
        content_type: String,
    },
    Presign {
        key: String,
        session_id: String,
        part_number: i32,
    },
    Complete {
        key: String,
        session_id: String,
        parts: Vec<CompletedPart>,
    },
    Abort {
        key: String,
        session_id: String,
    },
}

/// In-memory `ObjectStorage` that records calls and fails on demand.
#[derive(Default)]
pub struct FakeStorage {
    pub calls: Mutex<Vec<StorageCall>>,
    pub fail_initiate: AtomicBool,
    pub fail_sign: AtomicBool,
    pub fail_complete: AtomicBool,
    pub fail_abort: AtomicBool,
    pub complete_delay_ms: AtomicU64,
    sessions: AtomicU64,
}

impl FakeStorage {
    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> Vec<StorageCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StorageCall::Abort { .. }))
            .collect()
    }

    pub fn completes(&self) -> Vec<StorageCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StorageCall::Complete { .. }))
            .collect()
    }

    fn record(&self, call: StorageCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> ObjectStorageResult<String> {
        self.record(StorageCall::Initiate {
            key: key.to_string(),
            content_type: content_type.to_string(),
        });
        if self.fail_initiate.load(Ordering::SeqCst) {
            return Err(ObjectStorageError::Init("backend unavailable".into()));
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{n}"))
    }

    async fn presign_part_url(
        &self,
        key: &str,
        session_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> ObjectStorageResult<String> {
        self.record(StorageCall::Presign {
            key: key.to_string(),
            session_id: session_id.to_string(),
            part_number,
        });
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(ObjectStorageError::Sign("signing key rejected".into()));
        }
        Ok(format!(
            "https://storage.test/{key}?partNumber={part_number}&uploadId={session_id}&expires={}",
            ttl.as_secs()
        ))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> ObjectStorageResult<()> {
        self.record(StorageCall::Complete {
            key: key.to_string(),
            session_id: session_id.to_string(),
            parts: parts.to_vec(),
        });
        let delay = self.complete_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(ObjectStorageError::Complete(
                "InvalidPart: one or more of the specified parts could not be found".into(),
            ));
        }
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, session_id: &str) -> ObjectStorageResult<()> {
        self.record(StorageCall::Abort {
            key: key.to_string(),
            session_id: session_id.to_string(),
        });
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(ObjectStorageError::Abort("connection reset".into()));
        }
        Ok(())
    }
}

pub async fn harness() -> (UploadService, Arc<FakeStorage>) {
    let store = UploadStore::connect("sqlite::memory:", 1)
        .await
        .expect("failed to open in-memory database");
    store.migrate().await.expect("migration failed");

    let storage = Arc::new(FakeStorage::default());
    let service = UploadService::new(
        storage.clone(),
        store,
        ChunkPlanner::default(),
        "uploads/videos",
        Duration::from_secs(3600),
    );
    (service, storage)
}

pub fn demo_request() -> InitiateUpload {
    InitiateUpload {
        title: "Demo".into(),
        description: None,
        original_filename: "clip.mp4".into(),
        file_size: 250_000_000,
        mime_type: "video/mp4".into(),
        visibility: None,
    }
}

pub async fn initiate_demo(service: &UploadService, owner: i64) -> InitiatedUpload {
    service
        .initiate(Principal(owner), demo_request())
        .await
        .expect("initiate failed")
}

pub async fn count_uploads(service: &UploadService) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM uploads")
        .fetch_one(&*service.store.db)
        .await
        .unwrap()
}

pub fn part(part_number: i32, etag: &str) -> CompletedPart {
    CompletedPart {
        part_number,
        etag: etag.to_string(),
    }
}
