use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOperation {
    Read,
    Write,
    Delete,
    Share,
    GenerateUrl,
    CreateVersion,
    RestoreVersion,
}

impl Display for FileOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            FileOperation::Read => "READ",
            FileOperation::Write => "WRITE",
            FileOperation::Delete => "DELETE",
            FileOperation::Share => "SHARE",
            FileOperation::GenerateUrl => "GENERATE_URL",
            FileOperation::CreateVersion => "CREATE_VERSION",
            FileOperation::RestoreVersion => "RESTORE_VERSION",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessResult {
    Success,
    Failure,
}

impl Display for AccessResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AccessResult::Success => write!(f, "SUCCESS"),
            AccessResult::Failure => write!(f, "FAILURE"),
        }
    }
}

/// One entry of a file's in-memory access log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccess {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub operation: FileOperation,
    pub result: AccessResult,
    pub accessed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub error: Option<String>,
}

impl FileAccess {
    pub fn success(file_id: Uuid, user_id: Uuid, operation: FileOperation) -> Self {
        Self {
            file_id,
            user_id,
            operation,
            result: AccessResult::Success,
            accessed_at: Utc::now(),
            ip_address: None,
            user_agent: None,
            error: None,
        }
    }

    pub fn failure(
        file_id: Uuid,
        user_id: Uuid,
        operation: FileOperation,
        error: impl Into<String>,
    ) -> Self {
        Self {
            result: AccessResult::Failure,
            error: Some(error.into()),
            ..Self::success(file_id, user_id, operation)
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
