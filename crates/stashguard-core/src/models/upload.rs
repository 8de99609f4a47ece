use bytes::Bytes;
use uuid::Uuid;
use validator::Validate;

use super::ProcessingOptions;

/// Untrusted upload handed to the file service.
#[derive(Debug, Clone, Validate)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub project_id: Option<Uuid>,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Content type must be between 1 and 255 characters"
    ))]
    pub content_type: String,
    pub data: Bytes,
    #[validate(length(max = 32, message = "At most 32 tags are allowed"))]
    pub tags: Vec<String>,
    /// Queue a processing job once the file is stored.
    pub process: Option<ProcessingOptions>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl UploadRequest {
    pub fn new(
        owner_id: Uuid,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            owner_id,
            project_id: None,
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
            tags: Vec::new(),
            process: None,
            ip_address: None,
            user_agent: None,
        }
    }
}
