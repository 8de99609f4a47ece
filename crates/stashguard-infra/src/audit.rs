//! Audit sink backed by `tracing`
//!
//! Every record becomes a structured event on the `stashguard::audit` target,
//! so a subscriber can route audit output separately from application logs.

use async_trait::async_trait;
use stashguard_core::models::{
    AccessResult, DomainEvent, FileOperation, PresignOptions, SecurityValidation,
};
use stashguard_core::{AuditSink, EventSink};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "stashguard::audit";

#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

fn joined<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_security_validation(&self, user_id: Uuid, validation: &SecurityValidation) {
        let threats = joined(&validation.threats);
        let mitigations = validation
            .mitigations
            .iter()
            .map(|m| format!("{:?}", m))
            .collect::<Vec<_>>()
            .join(",");

        if validation.passed {
            tracing::info!(
                target: AUDIT_TARGET,
                event = "security_validation",
                user_id = %user_id,
                scan_id = %validation.scan_id,
                passed = true,
                confidence_score = validation.confidence_score,
                risk_score = validation.risk_score,
                "Security validation recorded"
            );
        } else {
            tracing::warn!(
                target: AUDIT_TARGET,
                event = "security_validation",
                user_id = %user_id,
                scan_id = %validation.scan_id,
                passed = false,
                threats = %threats,
                mitigations = %mitigations,
                quarantine_key = ?validation.quarantine_key,
                risk_score = validation.risk_score,
                "Security validation recorded"
            );
        }
    }

    async fn log_file_access(
        &self,
        user_id: Uuid,
        file_id: Uuid,
        operation: FileOperation,
        result: AccessResult,
        details: serde_json::Value,
    ) {
        match result {
            AccessResult::Success => tracing::info!(
                target: AUDIT_TARGET,
                event = "file_access",
                user_id = %user_id,
                file_id = %file_id,
                operation = %operation,
                result = %result,
                details = %details,
                "File access recorded"
            ),
            AccessResult::Failure => tracing::warn!(
                target: AUDIT_TARGET,
                event = "file_access",
                user_id = %user_id,
                file_id = %file_id,
                operation = %operation,
                result = %result,
                details = %details,
                "File access recorded"
            ),
        }
    }

    async fn log_url_generation(&self, file_id: Uuid, user_id: Uuid, options: &PresignOptions) {
        tracing::info!(
            target: AUDIT_TARGET,
            event = "url_generation",
            user_id = %user_id,
            file_id = %file_id,
            operation = %options.operation.as_str(),
            expires_in_secs = options.expires_in_secs,
            ip_restricted = !options.allowed_ips.is_empty(),
            user_agent_restricted = !options.allowed_user_agents.is_empty(),
            "Presigned URL generation recorded"
        );
    }
}

#[async_trait]
impl EventSink for TracingAuditSink {
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            tracing::info!(
                target: AUDIT_TARGET,
                event = event.name(),
                file_id = %event.file_id(),
                payload = %payload,
                "Domain event"
            );
        }
    }
}
