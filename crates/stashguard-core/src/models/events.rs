use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccessResult, ChangeType, FileOperation, ProcessingStatus, VirusScanStatus};

/// State change recorded by a `FileAggregate` and drained by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    FileCreated {
        file_id: Uuid,
        owner_id: Uuid,
        size: u64,
        content_type: String,
        occurred_at: DateTime<Utc>,
    },
    ProcessingStatusChanged {
        file_id: Uuid,
        previous: ProcessingStatus,
        new: ProcessingStatus,
        occurred_at: DateTime<Utc>,
    },
    FileVersionCreated {
        file_id: Uuid,
        version_number: u32,
        change_type: ChangeType,
        created_by: Uuid,
        occurred_at: DateTime<Utc>,
    },
    FileVersionRestored {
        file_id: Uuid,
        restored_from: u32,
        version_number: u32,
        restored_by: Uuid,
        occurred_at: DateTime<Utc>,
    },
    FileDeleted {
        file_id: Uuid,
        deleted_by: Uuid,
        occurred_at: DateTime<Utc>,
    },
    FileRestored {
        file_id: Uuid,
        restored_by: Uuid,
        occurred_at: DateTime<Utc>,
    },
    FileAccessed {
        file_id: Uuid,
        user_id: Uuid,
        operation: FileOperation,
        result: AccessResult,
        occurred_at: DateTime<Utc>,
    },
    VirusScanStatusChanged {
        file_id: Uuid,
        previous: VirusScanStatus,
        new: VirusScanStatus,
        occurred_at: DateTime<Utc>,
    },
    TagsUpdated {
        file_id: Uuid,
        tags: Vec<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn file_id(&self) -> Uuid {
        match self {
            DomainEvent::FileCreated { file_id, .. }
            | DomainEvent::ProcessingStatusChanged { file_id, .. }
            | DomainEvent::FileVersionCreated { file_id, .. }
            | DomainEvent::FileVersionRestored { file_id, .. }
            | DomainEvent::FileDeleted { file_id, .. }
            | DomainEvent::FileRestored { file_id, .. }
            | DomainEvent::FileAccessed { file_id, .. }
            | DomainEvent::VirusScanStatusChanged { file_id, .. }
            | DomainEvent::TagsUpdated { file_id, .. } => *file_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::FileCreated { .. } => "file_created",
            DomainEvent::ProcessingStatusChanged { .. } => "processing_status_changed",
            DomainEvent::FileVersionCreated { .. } => "file_version_created",
            DomainEvent::FileVersionRestored { .. } => "file_version_restored",
            DomainEvent::FileDeleted { .. } => "file_deleted",
            DomainEvent::FileRestored { .. } => "file_restored",
            DomainEvent::FileAccessed { .. } => "file_accessed",
            DomainEvent::VirusScanStatusChanged { .. } => "virus_scan_status_changed",
            DomainEvent::TagsUpdated { .. } => "tags_updated",
        }
    }
}
