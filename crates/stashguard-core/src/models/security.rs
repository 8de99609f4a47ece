use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    InvalidFormat,
    MalwareDetected,
    SuspiciousContent,
    FileTooLarge,
    RateLimitExceeded,
    /// The scanner timed out or failed, so the file's safety is unknown.
    ScanIncomplete,
}

impl Display for ThreatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            ThreatType::InvalidFormat => "INVALID_FORMAT",
            ThreatType::MalwareDetected => "MALWARE_DETECTED",
            ThreatType::SuspiciousContent => "SUSPICIOUS_CONTENT",
            ThreatType::FileTooLarge => "FILE_TOO_LARGE",
            ThreatType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ThreatType::ScanIncomplete => "SCAN_INCOMPLETE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mitigation {
    FormatRejection,
    ContentSanitization,
    Quarantine,
    EnhancedMonitoring,
    SystemRejection,
    RateLimited,
    ManualReview,
}

/// Verdict of one pass through the security validation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityValidation {
    pub passed: bool,
    pub threats: Vec<ThreatType>,
    pub mitigations: Vec<Mitigation>,
    pub scan_id: Uuid,
    pub confidence_score: u8,
    pub risk_score: u32,
    pub scan_result: Option<VirusScanResult>,
    pub quarantine_key: Option<String>,
    pub details: BTreeMap<String, String>,
    pub validated_at: DateTime<Utc>,
}

impl SecurityValidation {
    pub fn has_threat(&self, threat: ThreatType) -> bool {
        self.threats.contains(&threat)
    }

    pub fn has_mitigation(&self, mitigation: Mitigation) -> bool {
        self.mitigations.contains(&mitigation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    /// The detector ran to completion; `clean` holds its answer.
    Completed,
    Disabled,
    /// Buffer above the scan ceiling; not inspected.
    Skipped,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirusScanResult {
    pub clean: bool,
    pub threats: Vec<String>,
    pub scan_id: Uuid,
    pub file_hash: String,
    pub scan_date: DateTime<Utc>,
    pub scan_duration_ms: u64,
    pub scanner_version: String,
    pub attempt: u32,
    pub outcome: ScanOutcome,
    pub skip_reason: Option<ThreatType>,
}

impl VirusScanResult {
    pub fn is_infected(&self) -> bool {
        self.outcome == ScanOutcome::Completed && !self.clean
    }

    pub fn was_inspected(&self) -> bool {
        self.outcome == ScanOutcome::Completed
    }
}
