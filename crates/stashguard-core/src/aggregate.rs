//! File aggregate
//!
//! `FileAggregate` is the only writer of [`FileMetadata`]. It owns the version
//! history, a bounded in-memory access log and the processing-status state
//! machine. Every mutation appends a [`DomainEvent`]; callers drain the buffer
//! after each use case and forward it to their event sink.
//!
//! The aggregate has no internal locking. Callers serialize mutations per file.

use std::collections::{BTreeSet, VecDeque};

use chrono::Utc;
use uuid::Uuid;

use crate::checksum::Checksums;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChangeType, DocumentType, DomainEvent, FileAccess, FileMetadata, FileOperation, FileVersion,
    NewVersion, ProcessingStatus, VirusScanStatus,
};
use crate::repository::FileRecord;

const MAX_TAGS: usize = 32;
const MAX_TAG_LEN: usize = 64;

/// Everything needed to register a freshly stored upload.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Option<Uuid>,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    pub storage_key: String,
    pub checksums: Checksums,
    pub tags: Vec<String>,
    pub virus_scan_status: VirusScanStatus,
}

#[derive(Debug, Clone)]
pub struct FileAggregate {
    metadata: FileMetadata,
    versions: Vec<FileVersion>,
    access_log: VecDeque<FileAccess>,
    events: Vec<DomainEvent>,
    max_access_log: usize,
}

impl FileAggregate {
    pub fn create(new: NewFile, max_access_log: usize) -> AppResult<Self> {
        if !new.checksums.is_complete() {
            return Err(AppError::Validation(
                "File checksums must not be empty".to_string(),
            ));
        }
        if new.storage_key.is_empty() {
            return Err(AppError::Validation("Storage key must not be empty".to_string()));
        }

        let now = Utc::now();
        let tags = normalize_tags(new.tags)?;
        let metadata = FileMetadata {
            id: new.id,
            owner_id: new.owner_id,
            project_id: new.project_id,
            filename: new.filename,
            original_name: new.original_name,
            document_type: DocumentType::from_content_type(&new.content_type),
            content_type: new.content_type,
            size: new.size,
            storage_key: new.storage_key.clone(),
            cdn_url: None,
            checksum_md5: new.checksums.md5.clone(),
            checksum_sha256: new.checksums.sha256.clone(),
            virus_scan_status: new.virus_scan_status,
            processing_status: ProcessingStatus::Pending,
            version_count: 1,
            tags,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let initial = FileVersion {
            id: Uuid::new_v4(),
            file_id: metadata.id,
            version_number: 1,
            created_at: now,
            created_by: metadata.owner_id,
            change_type: ChangeType::Created,
            size: metadata.size,
            checksum_md5: new.checksums.md5,
            checksum_sha256: new.checksums.sha256,
            storage_key: new.storage_key,
            is_active: true,
        };

        let event = DomainEvent::FileCreated {
            file_id: metadata.id,
            owner_id: metadata.owner_id,
            size: metadata.size,
            content_type: metadata.content_type.clone(),
            occurred_at: now,
        };

        Ok(Self {
            metadata,
            versions: vec![initial],
            access_log: VecDeque::new(),
            events: vec![event],
            max_access_log: max_access_log.max(1),
        })
    }

    /// Rehydrate from persisted state. No events are emitted.
    pub fn from_record(record: FileRecord, max_access_log: usize) -> Self {
        let mut versions = record.versions;
        versions.sort_by_key(|v| v.version_number);
        Self {
            metadata: record.metadata,
            versions,
            access_log: VecDeque::new(),
            events: Vec::new(),
            max_access_log: max_access_log.max(1),
        }
    }

    pub fn to_record(&self) -> FileRecord {
        FileRecord {
            metadata: self.metadata.clone(),
            versions: self.versions.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn versions(&self) -> &[FileVersion] {
        &self.versions
    }

    pub fn active_version(&self) -> Option<&FileVersion> {
        self.versions.iter().find(|v| v.is_active)
    }

    pub fn access_log(&self) -> impl Iterator<Item = &FileAccess> {
        self.access_log.iter()
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Hand the buffered events to the caller and clear the buffer.
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn update_processing_status(&mut self, next: ProcessingStatus) -> AppResult<()> {
        let previous = self.metadata.processing_status;
        if !previous.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition {
                from: previous,
                to: next,
            });
        }

        let now = Utc::now();
        self.metadata.processing_status = next;
        self.metadata.updated_at = now;
        self.events.push(DomainEvent::ProcessingStatusChanged {
            file_id: self.metadata.id,
            previous,
            new: next,
            occurred_at: now,
        });
        Ok(())
    }

    /// Append a new active version and point the metadata at its content.
    pub fn create_version(&mut self, new: NewVersion) -> AppResult<FileVersion> {
        self.ensure_editable()?;
        if !new.checksums.is_complete() {
            return Err(AppError::Validation(
                "Version checksums must not be empty".to_string(),
            ));
        }
        Ok(self.push_version(new))
    }

    /// Re-activate the content of an earlier version as a new version.
    pub fn restore_version(
        &mut self,
        version_number: u32,
        restored_by: Uuid,
    ) -> AppResult<FileVersion> {
        self.ensure_editable()?;

        let source = self
            .versions
            .iter()
            .find(|v| v.version_number == version_number)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Version {} of file {} not found",
                    version_number, self.metadata.id
                ))
            })?;

        let restored = self.push_version(NewVersion {
            created_by: restored_by,
            change_type: ChangeType::Restore,
            size: source.size,
            checksums: Checksums {
                md5: source.checksum_md5,
                sha256: source.checksum_sha256,
            },
            storage_key: source.storage_key,
        });

        self.events.push(DomainEvent::FileVersionRestored {
            file_id: self.metadata.id,
            restored_from: version_number,
            version_number: restored.version_number,
            restored_by,
            occurred_at: restored.created_at,
        });
        Ok(restored)
    }

    /// Owner-only access with read fallbacks for infected and in-flight files.
    pub fn can_access(&self, user_id: Uuid, operation: FileOperation) -> bool {
        if self.metadata.owner_id == user_id {
            return true;
        }
        if self.metadata.is_deleted() {
            return false;
        }
        if self.metadata.virus_scan_status == VirusScanStatus::Infected {
            return operation == FileOperation::Read;
        }
        if self.metadata.processing_status == ProcessingStatus::Processing {
            return operation == FileOperation::Read;
        }
        self.has_shared_access(user_id, operation)
    }

    // Sharing is not modelled yet; non-owners only get the fallbacks above.
    fn has_shared_access(&self, _user_id: Uuid, _operation: FileOperation) -> bool {
        false
    }

    pub fn record_access(&mut self, entry: FileAccess) {
        self.events.push(DomainEvent::FileAccessed {
            file_id: self.metadata.id,
            user_id: entry.user_id,
            operation: entry.operation,
            result: entry.result,
            occurred_at: entry.accessed_at,
        });
        self.access_log.push_back(entry);
        while self.access_log.len() > self.max_access_log {
            self.access_log.pop_front();
        }
    }

    pub fn soft_delete(&mut self, deleted_by: Uuid) -> AppResult<()> {
        if self.metadata.is_deleted() {
            return Err(AppError::Validation(format!(
                "File {} is already deleted",
                self.metadata.id
            )));
        }
        let now = Utc::now();
        self.metadata.deleted_at = Some(now);
        self.metadata.updated_at = now;
        self.events.push(DomainEvent::FileDeleted {
            file_id: self.metadata.id,
            deleted_by,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn restore(&mut self, restored_by: Uuid) -> AppResult<()> {
        if !self.metadata.is_deleted() {
            return Err(AppError::Validation(format!(
                "File {} is not deleted",
                self.metadata.id
            )));
        }
        let now = Utc::now();
        self.metadata.deleted_at = None;
        self.metadata.updated_at = now;
        self.events.push(DomainEvent::FileRestored {
            file_id: self.metadata.id,
            restored_by,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn mark_scan_status(&mut self, status: VirusScanStatus) {
        let previous = self.metadata.virus_scan_status;
        if previous == status {
            return;
        }
        let now = Utc::now();
        self.metadata.virus_scan_status = status;
        self.metadata.updated_at = now;
        self.events.push(DomainEvent::VirusScanStatusChanged {
            file_id: self.metadata.id,
            previous,
            new: status,
            occurred_at: now,
        });
    }

    pub fn update_tags(&mut self, tags: Vec<String>) -> AppResult<()> {
        let tags = normalize_tags(tags)?;
        let now = Utc::now();
        self.metadata.tags = tags.clone();
        self.metadata.updated_at = now;
        self.events.push(DomainEvent::TagsUpdated {
            file_id: self.metadata.id,
            tags,
            occurred_at: now,
        });
        Ok(())
    }

    /// Versions can only be added to live files that are not being processed.
    pub fn ensure_editable(&self) -> AppResult<()> {
        if self.metadata.is_deleted() {
            return Err(AppError::Validation(format!(
                "File {} is deleted",
                self.metadata.id
            )));
        }
        if self.metadata.processing_status == ProcessingStatus::Processing {
            return Err(AppError::InvalidProcessingState {
                file_id: self.metadata.id,
                status: self.metadata.processing_status,
            });
        }
        Ok(())
    }

    fn push_version(&mut self, new: NewVersion) -> FileVersion {
        let now = Utc::now();
        for version in self.versions.iter_mut() {
            version.is_active = false;
        }

        let version = FileVersion {
            id: Uuid::new_v4(),
            file_id: self.metadata.id,
            version_number: self.metadata.version_count + 1,
            created_at: now,
            created_by: new.created_by,
            change_type: new.change_type,
            size: new.size,
            checksum_md5: new.checksums.md5,
            checksum_sha256: new.checksums.sha256,
            storage_key: new.storage_key,
            is_active: true,
        };

        self.metadata.version_count = version.version_number;
        self.metadata.size = version.size;
        self.metadata.checksum_md5 = version.checksum_md5.clone();
        self.metadata.checksum_sha256 = version.checksum_sha256.clone();
        self.metadata.storage_key = version.storage_key.clone();
        self.metadata.updated_at = now;
        self.versions.push(version.clone());

        self.events.push(DomainEvent::FileVersionCreated {
            file_id: self.metadata.id,
            version_number: version.version_number,
            change_type: version.change_type,
            created_by: version.created_by,
            occurred_at: now,
        });
        version
    }
}

fn normalize_tags(tags: Vec<String>) -> AppResult<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(AppError::Validation(format!(
                "Tag '{}' exceeds {} characters",
                tag, MAX_TAG_LEN
            )));
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }
    Ok(out)
}
