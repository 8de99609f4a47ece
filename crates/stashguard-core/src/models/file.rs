use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirusScanStatus {
    Pending,
    Scanning,
    Clean,
    Infected,
    Error,
}

impl Display for VirusScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VirusScanStatus::Pending => write!(f, "pending"),
            VirusScanStatus::Scanning => write!(f, "scanning"),
            VirusScanStatus::Clean => write!(f, "clean"),
            VirusScanStatus::Infected => write!(f, "infected"),
            VirusScanStatus::Error => write!(f, "error"),
        }
    }
}

/// Processing lifecycle of a stored file.
///
/// ```text
/// pending    -> processing | failed | skipped
/// processing -> completed | failed
/// completed  -> processing   (reprocess)
/// failed     -> processing   (retry)
/// skipped    -> processing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub fn allowed_transitions(&self) -> &'static [ProcessingStatus] {
        use ProcessingStatus::*;
        match self {
            Pending => &[Processing, Failed, Skipped],
            Processing => &[Completed, Failed],
            Completed => &[Processing],
            Failed => &[Processing],
            Skipped => &[Processing],
        }
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
            ProcessingStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Coarse document family, inferred from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Image,
    Video,
    Audio,
    Pdf,
    Spreadsheet,
    Presentation,
    Text,
    Archive,
    Other,
}

impl DocumentType {
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if ct.starts_with("image/") {
            return DocumentType::Image;
        }
        if ct.starts_with("video/") {
            return DocumentType::Video;
        }
        if ct.starts_with("audio/") {
            return DocumentType::Audio;
        }

        match ct.as_str() {
            "application/pdf" => DocumentType::Pdf,
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet"
            | "text/csv" => DocumentType::Spreadsheet,
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.oasis.opendocument.presentation" => DocumentType::Presentation,
            "application/zip"
            | "application/gzip"
            | "application/x-tar"
            | "application/x-7z-compressed"
            | "application/x-rar-compressed" => DocumentType::Archive,
            "application/json" | "application/xml" | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                DocumentType::Text
            }
            other if other.starts_with("text/") => DocumentType::Text,
            _ => DocumentType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Option<Uuid>,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    pub storage_key: String,
    pub cdn_url: Option<String>,
    pub checksum_md5: String,
    pub checksum_sha256: String,
    pub virus_scan_status: VirusScanStatus,
    pub processing_status: ProcessingStatus,
    pub document_type: DocumentType,
    pub version_count: u32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Lowercased extension of the stored filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }
}

pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
