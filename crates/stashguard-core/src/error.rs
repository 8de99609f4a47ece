//! Error types module
//!
//! All failures that cross a component boundary are expressed as [`AppError`].
//! Callers that need to branch on the failure category switch on
//! [`AppError::kind`] instead of matching every variant.

use std::io;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ProcessingStatus, ThreatType};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "STORAGE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Plain discriminant of [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    SecurityThreat,
    RateLimitExceeded,
    UnauthorizedAccess,
    NotFound,
    InvalidStateTransition,
    InvalidProcessingState,
    Storage,
    Quarantine,
    ProcessingTimeout,
    ScanFailed,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Security validation failed: {details}")]
    SecurityThreat {
        threats: Vec<ThreatType>,
        details: String,
    },

    #[error("Rate limit exceeded: {remaining}/{limit} remaining, resets at {reset_at}")]
    RateLimitExceeded {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Unauthorized access: {0}")]
    UnauthorizedAccess(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error("File {file_id} cannot be processed while in status {status}")]
    InvalidProcessingState {
        file_id: Uuid,
        status: ProcessingStatus,
    },

    #[error("Storage operation '{operation}' failed for key '{key}': {message}")]
    Storage {
        operation: String,
        key: String,
        message: String,
    },

    #[error("Quarantine failed for {file_id}: {message}")]
    Quarantine { file_id: String, message: String },

    #[error("Processing timed out after {seconds}s")]
    ProcessingTimeout { seconds: u64 },

    #[error("Virus scan failed: {0}")]
    ScanFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Validation(_) => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::SecurityThreat { .. } => (
            422,
            "SECURITY_THREAT",
            false,
            Some("The file was rejected by security checks"),
            false,
            LogLevel::Warn,
        ),
        AppError::RateLimitExceeded { .. } => (
            429,
            "RATE_LIMIT_EXCEEDED",
            true,
            Some("Wait for the rate limit window to reset"),
            false,
            LogLevel::Warn,
        ),
        AppError::UnauthorizedAccess(_) => (
            403,
            "UNAUTHORIZED_ACCESS",
            false,
            Some("Check that you own this file"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidStateTransition { .. } => (
            409,
            "INVALID_STATE_TRANSITION",
            false,
            Some("Reload the file and check its processing status"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidProcessingState { .. } => (
            409,
            "INVALID_PROCESSING_STATE",
            false,
            Some("Only pending files can be queued for processing"),
            false,
            LogLevel::Debug,
        ),
        AppError::Storage { .. } => (
            502,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Quarantine { .. } => (
            500,
            "QUARANTINE_ERROR",
            false,
            Some("Contact support, the file could not be isolated"),
            true,
            LogLevel::Error,
        ),
        AppError::ProcessingTimeout { .. } => (
            504,
            "PROCESSING_TIMEOUT",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::ScanFailed(_) => (
            503,
            "SCAN_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::SecurityThreat { .. } => ErrorKind::SecurityThreat,
            AppError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AppError::UnauthorizedAccess(_) => ErrorKind::UnauthorizedAccess,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            AppError::InvalidProcessingState { .. } => ErrorKind::InvalidProcessingState,
            AppError::Storage { .. } => ErrorKind::Storage,
            AppError::Quarantine { .. } => ErrorKind::Quarantine,
            AppError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            AppError::ScanFailed(_) => ErrorKind::ScanFailed,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::SecurityThreat { .. } => "File failed security validation".to_string(),
            AppError::RateLimitExceeded {
                limit, reset_at, ..
            } => format!(
                "Rate limit of {} requests exceeded, retry after {}",
                limit,
                reset_at.to_rfc3339()
            ),
            AppError::UnauthorizedAccess(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::InvalidStateTransition { from, to } => {
                format!("Cannot move file from {} to {}", from, to)
            }
            AppError::InvalidProcessingState { status, .. } => {
                format!("File cannot be processed while {}", status)
            }
            AppError::Storage { operation, .. } => {
                format!("Storage operation '{}' failed", operation)
            }
            AppError::Quarantine { .. } => "Failed to isolate infected file".to_string(),
            AppError::ProcessingTimeout { seconds } => {
                format!("Processing timed out after {} seconds", seconds)
            }
            AppError::ScanFailed(_) => "Virus scan could not be completed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_rate_limit() {
        let err = AppError::RateLimitExceeded {
            limit: 10,
            remaining: 0,
            reset_at: Utc::now(),
        };
        assert_eq!(err.http_status_code(), 429);
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }

    #[test]
    fn test_security_threat_message_is_generic() {
        let err = AppError::SecurityThreat {
            threats: vec![ThreatType::SuspiciousContent],
            details: "backend exploded at 10.0.0.3".to_string(),
        };
        assert_eq!(err.client_message(), "File failed security validation");
        assert!(!err.client_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_storage_error_is_sensitive_and_keeps_context() {
        let err = AppError::Storage {
            operation: "upload".to_string(),
            key: "files/a/b.png".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
        assert!(err.to_string().contains("upload"));
        assert!(err.to_string().contains("files/a/b.png"));
        assert_eq!(err.client_message(), "Storage operation 'upload' failed");
    }

    #[test]
    fn test_invalid_transition_kind() {
        let err = AppError::InvalidStateTransition {
            from: ProcessingStatus::Completed,
            to: ProcessingStatus::Skipped,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(
            err.to_string(),
            "Invalid state transition from completed to skipped"
        );
    }

    #[test]
    fn test_quarantine_distinct_from_scan_failure() {
        let quarantine = AppError::Quarantine {
            file_id: "abc".to_string(),
            message: "copy failed".to_string(),
        };
        let scan = AppError::ScanFailed("daemon down".to_string());
        assert_ne!(quarantine.kind(), scan.kind());
        assert_ne!(quarantine.error_code(), scan.error_code());
    }
}
