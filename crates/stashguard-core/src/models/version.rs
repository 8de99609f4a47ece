use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::Checksums;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    ContentUpdate,
    Processed,
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: Uuid,
    pub file_id: Uuid,
    pub version_number: u32,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub change_type: ChangeType,
    pub size: u64,
    pub checksum_md5: String,
    pub checksum_sha256: String,
    pub storage_key: String,
    pub is_active: bool,
}

/// Content of a version about to be appended.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub created_by: Uuid,
    pub change_type: ChangeType,
    pub size: u64,
    pub checksums: Checksums,
    pub storage_key: String,
}
