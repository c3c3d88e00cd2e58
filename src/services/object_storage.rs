//! src/services/object_storage.rs
//!
//! Object storage client: the thin contract the orchestrator needs from a
//! multipart-capable S3-compatible store, plus the `aws-sdk-s3` implementation
//! used in production. Payload bytes never flow through here: clients PUT
//! parts straight to presigned URLs.

use crate::models::part::CompletedPart;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart},
};
use chrono::Utc;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Part numbers accepted by the multipart protocol.
pub const PART_NUMBER_RANGE: std::ops::RangeInclusive<i32> = 1..=10_000;

/// Presigned part URLs stay valid for an hour unless configured otherwise.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ObjectStorageError {
    #[error("failed to initiate multipart upload: {0}")]
    Init(String),
    #[error("failed to sign part url: {0}")]
    Sign(String),
    #[error("failed to complete multipart upload: {0}")]
    Complete(String),
    #[error("failed to abort multipart upload: {0}")]
    Abort(String),
    #[error("part number {0} is outside 1..=10000")]
    InvalidPartNumber(i32),
}

pub type ObjectStorageResult<T> = Result<T, ObjectStorageError>;

/// Multipart upload operations against a single bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket every key is addressed in.
    fn bucket(&self) -> &str;

    /// Open a multipart session for `key` and return the backend's upload id.
    async fn initiate_multipart(&self, key: &str, content_type: &str)
    -> ObjectStorageResult<String>;

    /// Sign an `UploadPart` request for one part of an open session.
    async fn presign_part_url(
        &self,
        key: &str,
        session_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> ObjectStorageResult<String>;

    /// Assemble the session. `parts` must be in ascending part-number order.
    async fn complete_multipart(
        &self,
        key: &str,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> ObjectStorageResult<()>;

    /// Discard a session and the parts uploaded to it.
    async fn abort_multipart(&self, key: &str, session_id: &str) -> ObjectStorageResult<()>;
}

/// Reject part numbers the backend would refuse to sign.
pub fn ensure_part_number(part_number: i32) -> ObjectStorageResult<()> {
    if PART_NUMBER_RANGE.contains(&part_number) {
        Ok(())
    } else {
        Err(ObjectStorageError::InvalidPartNumber(part_number))
    }
}

/// Build a fresh object key for an upload.
///
/// Layout: `{prefix}/{owner_id}/{YYYYMMDD_HHMMSS}_{12 hex chars}{.ext}`. The
/// extension of `original_filename` is kept (lower-cased) when it is plain
/// alphanumeric; anything else is dropped.
pub fn generate_object_key(prefix: &str, owner_id: i64, original_filename: &str) -> String {
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    let prefix = prefix.trim_end_matches('/');

    format!("{prefix}/{owner_id}/{timestamp}_{}{extension}", &unique[..12])
}

/// Connection settings for [`S3ObjectStorage`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible vendors.
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

/// `ObjectStorage` backed by the AWS SDK.
#[derive(Clone)]
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
}

impl S3ObjectStorage {
    /// Build the SDK client. Static credentials win over the default provider
    /// chain when both halves are configured.
    pub async fn connect(settings: S3Settings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region));

        if let Some(endpoint) = settings.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (
            settings.access_key_id.as_deref(),
            settings.secret_access_key.as_deref(),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "video-uploads-config",
            ));
        }

        let sdk_config = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(settings.force_path_style)
                .build(),
        );

        info!(
            "S3 object storage ready: bucket={} endpoint={:?}",
            settings.bucket, settings.endpoint_url
        );

        Self {
            client,
            bucket: settings.bucket,
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> ObjectStorageResult<String> {
        debug!("create_multipart_upload: bucket={} key={}", self.bucket, key);

        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata("service", "video-uploads")
            .metadata("uploaded_at", Utc::now().to_rfc3339())
            .send()
            .await
            .map_err(|err| ObjectStorageError::Init(DisplayErrorContext(&err).to_string()))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| ObjectStorageError::Init("backend returned no upload id".into()))
    }

    async fn presign_part_url(
        &self,
        key: &str,
        session_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> ObjectStorageResult<String> {
        ensure_part_number(part_number)?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| ObjectStorageError::Sign(err.to_string()))?;

        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .part_number(part_number)
            .presigned(presigning)
            .await
            .map_err(|err| ObjectStorageError::Sign(DisplayErrorContext(&err).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        session_id: &str,
        parts: &[CompletedPart],
    ) -> ObjectStorageResult<()> {
        debug!(
            "complete_multipart_upload: bucket={} key={} parts={}",
            self.bucket,
            key,
            parts.len()
        );

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|part| {
                        S3CompletedPart::builder()
                            .part_number(part.part_number)
                            .e_tag(&part.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| ObjectStorageError::Complete(DisplayErrorContext(&err).to_string()))?;

        Ok(())
    }

    async fn abort_multipart(&self, key: &str, session_id: &str) -> ObjectStorageResult<()> {
        debug!("abort_multipart_upload: bucket={} key={}", self.bucket, key);

        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .send()
            .await
            .map_err(|err| ObjectStorageError::Abort(DisplayErrorContext(&err).to_string()))?;

        Ok(())
    }
}
