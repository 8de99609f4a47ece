use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresignOperation {
    Get,
    Put,
}

impl PresignOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignOperation::Get => "GET",
            PresignOperation::Put => "PUT",
        }
    }
}

impl Display for PresignOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Input to the storage gateway's `presign`. The expiry is taken as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignOptions {
    pub key: String,
    pub operation: PresignOperation,
    pub expires_in_secs: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_user_agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    pub url: String,
    pub key: String,
    pub operation: PresignOperation,
    pub expires_in_secs: u64,
    pub expires_at: DateTime<Utc>,
    pub allowed_ips: Vec<String>,
    pub allowed_user_agents: Vec<String>,
}

/// Caller request for a presigned URL on a stored file.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PresignRequest {
    pub operation: PresignOperation,
    /// Requested lifetime; clamped against the policy ceiling.
    #[validate(range(min = 1, message = "Expiry must be at least 1 second"))]
    pub expires_in_secs: Option<u64>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_user_agents: Vec<String>,
}

impl PresignRequest {
    pub fn get() -> Self {
        Self {
            operation: PresignOperation::Get,
            expires_in_secs: None,
            allowed_ips: Vec::new(),
            allowed_user_agents: Vec::new(),
        }
    }

    pub fn with_expiry(mut self, secs: u64) -> Self {
        self.expires_in_secs = Some(secs);
        self
    }
}
