use stashguard_core::models::extension_of;
use stashguard_core::SecurityPolicy;

/// Format validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Empty file")]
    EmptyFile,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Content type {content_type} does not match extension '{extension}'")]
    ExtensionMismatch {
        extension: String,
        content_type: String,
    },
}

impl FormatError {
    pub fn is_size_violation(&self) -> bool {
        matches!(self, FormatError::FileTooLarge { .. })
    }
}

/// Checks the declared shape of an upload: size, content type and filename.
pub struct FormatValidator {
    max_file_size: u64,
    allowed_content_types: Vec<String>,
}

impl FormatValidator {
    /// An empty `allowed_content_types` list accepts every type.
    pub fn new(max_file_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|ct| ct.to_lowercase())
                .collect(),
        }
    }

    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self::new(policy.max_file_size, policy.allowed_content_types.clone())
    }

    pub fn validate_file_size(&self, size: u64) -> Result<(), FormatError> {
        if size == 0 {
            return Err(FormatError::EmptyFile);
        }
        if size > self.max_file_size {
            return Err(FormatError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn validate_filename(&self, filename: &str) -> Result<(), FormatError> {
        let trimmed = filename.trim();
        if trimmed.is_empty()
            || trimmed.len() > 255
            || trimmed.contains(['/', '\\', '\0'])
            || trimmed == "."
            || trimmed == ".."
        {
            return Err(FormatError::InvalidFilename(filename.to_string()));
        }
        Ok(())
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), FormatError> {
        let normalized = normalize_content_type(content_type);
        if normalized.is_empty() || !normalized.contains('/') {
            return Err(FormatError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }
        if !self.allowed_content_types.is_empty()
            && !self.allowed_content_types.iter().any(|ct| *ct == normalized)
        {
            return Err(FormatError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }
        Ok(())
    }

    /// Reject content types that contradict a well-known extension.
    pub fn validate_extension_content_type_match(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<(), FormatError> {
        let Some(extension) = extension_of(filename) else {
            return Ok(());
        };
        let normalized = normalize_content_type(content_type);

        let Some(expected) = expected_content_types(&extension) else {
            tracing::debug!(
                extension = %extension,
                content_type = %content_type,
                "Unknown extension, skipping Content-Type/extension cross-validation"
            );
            return Ok(());
        };

        if !expected.iter().any(|ct| *ct == normalized) {
            return Err(FormatError::ExtensionMismatch {
                extension,
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }

    /// Collects every violation rather than stopping at the first one.
    pub fn validate(&self, filename: &str, content_type: &str, size: u64) -> Vec<FormatError> {
        [
            self.validate_file_size(size),
            self.validate_filename(filename),
            self.validate_content_type(content_type),
            self.validate_extension_content_type_match(filename, content_type),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }
}

/// `"Image/PNG; charset=x"` becomes `"image/png"`.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn expected_content_types(extension: &str) -> Option<&'static [&'static str]> {
    let types: &'static [&'static str] = match extension {
        // Images
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "webp" => &["image/webp"],
        "avif" => &["image/avif"],
        "svg" => &["image/svg+xml"],
        "bmp" => &["image/bmp"],
        "ico" => &["image/x-icon", "image/vnd.microsoft.icon"],
        // Videos
        "mp4" => &["video/mp4"],
        "webm" => &["video/webm"],
        "mov" => &["video/quicktime"],
        "avi" => &["video/x-msvideo"],
        "mkv" => &["video/x-matroska"],
        // Audio
        "mp3" => &["audio/mpeg", "audio/mp3"],
        "wav" => &["audio/wav", "audio/wave", "audio/x-wav"],
        "ogg" => &["audio/ogg", "application/ogg"],
        "m4a" => &["audio/mp4", "audio/x-m4a"],
        "flac" => &["audio/flac"],
        // Documents
        "pdf" => &["application/pdf"],
        "doc" => &["application/msword"],
        "docx" => &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        "xls" => &["application/vnd.ms-excel"],
        "xlsx" => &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        "ppt" => &["application/vnd.ms-powerpoint"],
        "pptx" => &["application/vnd.openxmlformats-officedocument.presentationml.presentation"],
        "txt" => &["text/plain"],
        "csv" => &["text/csv", "text/plain"],
        "json" => &["application/json"],
        "zip" => &["application/zip", "application/x-zip-compressed"],
        "tar" => &["application/x-tar"],
        "gz" => &["application/gzip", "application/x-gzip"],
        _ => return None,
    };
    Some(types)
}
