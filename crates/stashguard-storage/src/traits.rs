//! Object store backend trait
//!
//! A backend performs exactly one attempt of each S3-style primitive. Retries,
//! size routing and multipart session bookkeeping live in
//! [`crate::ObjectStorageGateway`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use stashguard_core::models::PresignOperation;
use thiserror::Error;

use crate::StorageBackend;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid presign expiry: {0}")]
    InvalidExpiry(String),

    #[error("Multipart upload failed: {0}")]
    MultipartFailed(String),

    #[error("Unknown multipart upload: {0}")]
    UnknownUpload(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether another attempt of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound(_)
                | StorageError::InvalidKey(_)
                | StorageError::InvalidExpiry(_)
                | StorageError::UnknownUpload(_)
                | StorageError::ConfigError(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One uploaded part of a multipart session, as it must appear in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResult {
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta)
        -> StorageResult<PutResult>;

    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    /// Deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn head_object(&self, key: &str) -> StorageResult<ObjectInfo>;

    /// Keys under `prefix` in lexicographic order, at most `limit`.
    async fn list_objects(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ObjectInfo>>;

    /// Returns the backend's upload id.
    async fn create_multipart_upload(&self, key: &str, meta: &ObjectMeta)
        -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart>;

    /// `parts` must be in ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutResult>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    async fn copy_object(&self, from_key: &str, to_key: &str) -> StorageResult<()>;

    async fn presign(
        &self,
        key: &str,
        operation: PresignOperation,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    async fn ping(&self) -> StorageResult<()>;

    fn backend_type(&self) -> StorageBackend;
}
