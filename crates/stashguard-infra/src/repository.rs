//! In-memory file metadata repository
//!
//! Backs the CLI and the test suites. Records live in a single `RwLock`ed map;
//! every query scans it, which is fine for the volumes this is used with.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stashguard_core::models::{FileMetadata, ProcessingStatus};
use stashguard_core::{AppError, AppResult, FileFilters, FileRecord, FileRepository, StorageUsage};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryFileRepository {
    records: RwLock<HashMap<Uuid, FileRecord>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn select<F>(&self, predicate: F) -> Vec<FileMetadata>
    where
        F: Fn(&FileMetadata) -> bool,
    {
        let records = self.records.read().await;
        let mut found: Vec<FileMetadata> = records
            .values()
            .map(|r| &r.metadata)
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    async fn usage<F>(&self, predicate: F) -> StorageUsage
    where
        F: Fn(&FileMetadata) -> bool,
    {
        let records = self.records.read().await;
        records
            .values()
            .map(|r| &r.metadata)
            .filter(|m| !m.is_deleted() && predicate(m))
            .fold(StorageUsage::default(), |mut usage, m| {
                usage.file_count += 1;
                usage.total_bytes += m.size;
                usage
            })
    }
}

fn matches_filters(metadata: &FileMetadata, filters: &FileFilters) -> bool {
    (filters.include_deleted || !metadata.is_deleted())
        && filters.project_id.is_none_or(|p| metadata.project_id == Some(p))
        && filters
            .document_type
            .is_none_or(|t| metadata.document_type == t)
        && filters
            .processing_status
            .is_none_or(|s| metadata.processing_status == s)
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn create(&self, record: FileRecord) -> AppResult<FileRecord> {
        let mut records = self.records.write().await;
        let id = record.metadata.id;
        if records.contains_key(&id) {
            return Err(AppError::Validation(format!("File {} already exists", id)));
        }
        if records
            .values()
            .any(|r| r.metadata.storage_key == record.metadata.storage_key)
        {
            return Err(AppError::Validation(format!(
                "Storage key {} is already in use",
                record.metadata.storage_key
            )));
        }
        records.insert(id, record.clone());
        tracing::debug!(file_id = %id, "File record created");
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<FileRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: Uuid,
        filters: &FileFilters,
    ) -> AppResult<Vec<FileMetadata>> {
        let found = self
            .select(|m| m.owner_id == user_id && matches_filters(m, filters))
            .await;
        let limit = filters.limit.unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(filters.offset).take(limit).collect())
    }

    async fn update(&self, record: FileRecord) -> AppResult<FileRecord> {
        let mut records = self.records.write().await;
        let id = record.metadata.id;
        match records.get_mut(&id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(record)
            }
            None => Err(AppError::NotFound(format!("File {} not found", id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn find_by_storage_key(&self, storage_key: &str) -> AppResult<Option<FileMetadata>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.metadata.storage_key == storage_key
                    || r.versions.iter().any(|v| v.storage_key == storage_key)
            })
            .map(|r| r.metadata.clone()))
    }

    async fn find_by_checksum(&self, sha256: &str) -> AppResult<Vec<FileMetadata>> {
        let sha256 = sha256.to_lowercase();
        Ok(self
            .select(|m| !m.is_deleted() && m.checksum_sha256 == sha256)
            .await)
    }

    async fn find_by_tags(&self, tags: &[String]) -> AppResult<Vec<FileMetadata>> {
        let wanted: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        Ok(self
            .select(|m| !m.is_deleted() && wanted.iter().all(|t| m.tags.contains(t)))
            .await)
    }

    async fn find_pending_processing(&self, limit: usize) -> AppResult<Vec<FileMetadata>> {
        let mut found = self
            .select(|m| !m.is_deleted() && m.processing_status == ProcessingStatus::Pending)
            .await;
        found.reverse();
        found.truncate(limit);
        Ok(found)
    }

    async fn find_expired_files(&self, older_than: DateTime<Utc>) -> AppResult<Vec<FileMetadata>> {
        Ok(self
            .select(|m| m.deleted_at.is_some_and(|deleted| deleted < older_than))
            .await)
    }

    async fn get_user_storage_usage(&self, user_id: Uuid) -> AppResult<StorageUsage> {
        Ok(self.usage(|m| m.owner_id == user_id).await)
    }

    async fn get_project_storage_usage(&self, project_id: Uuid) -> AppResult<StorageUsage> {
        Ok(self.usage(|m| m.project_id == Some(project_id)).await)
    }
}
