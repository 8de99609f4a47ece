//! File metadata repository interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{DocumentType, FileMetadata, FileVersion, ProcessingStatus};

/// Persisted state of one file: metadata plus its version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub metadata: FileMetadata,
    pub versions: Vec<FileVersion>,
}

#[derive(Debug, Clone, Default)]
pub struct FileFilters {
    pub project_id: Option<Uuid>,
    pub document_type: Option<DocumentType>,
    pub processing_status: Option<ProcessingStatus>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub file_count: u64,
    pub total_bytes: u64,
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, record: FileRecord) -> AppResult<FileRecord>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileRecord>>;

    /// Newest first.
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
        filters: &FileFilters,
    ) -> AppResult<Vec<FileMetadata>>;

    async fn update(&self, record: FileRecord) -> AppResult<FileRecord>;

    /// Hard delete. Returns whether a record existed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;

    async fn find_by_storage_key(&self, storage_key: &str) -> AppResult<Option<FileMetadata>>;

    async fn find_by_checksum(&self, sha256: &str) -> AppResult<Vec<FileMetadata>>;

    /// Files carrying every tag in `tags`.
    async fn find_by_tags(&self, tags: &[String]) -> AppResult<Vec<FileMetadata>>;

    async fn find_pending_processing(&self, limit: usize) -> AppResult<Vec<FileMetadata>>;

    /// Soft-deleted files whose `deleted_at` is before `older_than`.
    async fn find_expired_files(&self, older_than: DateTime<Utc>) -> AppResult<Vec<FileMetadata>>;

    async fn get_user_storage_usage(&self, user_id: Uuid) -> AppResult<StorageUsage>;

    async fn get_project_storage_usage(&self, project_id: Uuid) -> AppResult<StorageUsage>;
}
