//! Collaborator interfaces
//!
//! The pipeline talks to audit persistence, rate-limit counters, the task
//! queue and IP reputation only through these traits. Production backends and
//! the in-memory implementations in `stashguard-infra` / `stashguard-worker`
//! implement them.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AccessResult, DomainEvent, EnqueuedJob, FileOperation, JobOptions, PresignOptions,
    QueueStats, SecurityValidation,
};

/// Receives security verdicts and access records for permanent storage.
///
/// Implementations swallow their own persistence failures: an audit outage
/// must not change the outcome of the operation being audited.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_security_validation(&self, user_id: Uuid, validation: &SecurityValidation);

    async fn log_file_access(
        &self,
        user_id: Uuid,
        file_id: Uuid,
        operation: FileOperation,
        result: AccessResult,
        details: serde_json::Value,
    );

    async fn log_url_generation(&self, file_id: Uuid, user_id: Uuid, options: &PresignOptions);
}

/// Consumer of drained aggregate events (audit trail, notifications).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, events: Vec<DomainEvent>);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Windowed per-user counters.
///
/// `check_limit` must not consume quota; callers increment separately once the
/// guarded operation succeeded.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn check_limit(&self, user_id: Uuid, operation: &str) -> AppResult<RateLimitStatus>;

    async fn increment_counter(&self, user_id: Uuid, operation: &str) -> AppResult<()>;
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> AppResult<EnqueuedJob>;

    async fn stats(&self) -> AppResult<QueueStats>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip: IpAddr,
    pub threat_level: ThreatLevel,
    pub is_vpn: bool,
    pub is_tor: bool,
    pub is_proxy: bool,
    pub country: Option<String>,
    pub blocked: bool,
}

/// IP reputation lookups for request middleware in front of the pipeline.
#[async_trait]
pub trait IpIntelligence: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> AppResult<IpReputation>;

    async fn is_blocked(&self, ip: IpAddr) -> AppResult<bool> {
        Ok(self.lookup(ip).await?.blocked)
    }
}

/// Audit sink that drops everything
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn log_security_validation(&self, _user_id: Uuid, _validation: &SecurityValidation) {}

    async fn log_file_access(
        &self,
        _user_id: Uuid,
        _file_id: Uuid,
        _operation: FileOperation,
        _result: AccessResult,
        _details: serde_json::Value,
    ) {
    }

    async fn log_url_generation(&self, _file_id: Uuid, _user_id: Uuid, _options: &PresignOptions) {
    }
}

#[async_trait]
impl EventSink for NoOpAuditSink {
    async fn publish(&self, _events: Vec<DomainEvent>) {}
}
