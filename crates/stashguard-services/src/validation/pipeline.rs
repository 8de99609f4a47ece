//! Security validation pipeline
//!
//! An ordered list of [`ValidationStage`]s composed once at construction:
//!
//! 1. rate limit (terminal: raises `RateLimitExceeded` without consuming quota)
//! 2. format
//! 3. content
//! 4. virus scan, with synchronous quarantine on detection
//! 5. behavioural heuristics
//!
//! Non-terminal stages only add threats and mitigations to the shared
//! [`ValidationContext`], so the verdict lists every problem found. Every
//! verdict is audited. Quota is consumed only when the verdict passes.
//!
//! Unexpected stage errors fail closed: the verdict is rejected with
//! `SYSTEM_REJECTION`, audited, and the caller gets a generic
//! `SecurityThreat`. Rate-limit, authorization and quarantine errors are
//! returned as-is.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use stashguard_core::models::{
    Mitigation, ScanOutcome, SecurityValidation, ThreatType, UploadRequest, VirusScanResult,
};
use stashguard_core::{
    AppError, AppResult, AuditSink, ErrorKind, RateLimitBackend, SecurityPolicy,
};
use uuid::Uuid;

use super::content::ContentValidator;
use super::format::FormatValidator;
use super::heuristics::BehavioralHeuristics;
use crate::quarantine::QuarantineService;
use crate::scanner::VirusScanEngine;

pub const UPLOAD_OPERATION: &str = "upload";
pub const GENERIC_REJECTION: &str = "Security validation could not be completed";

const THREAT_PENALTY: u32 = 20;
const SKIPPED_SCAN_PENALTY: u32 = 20;
const FINDING_PENALTY: u32 = 5;

/// Working state of one validation pass.
pub struct ValidationContext<'a> {
    pub request: &'a UploadRequest,
    /// Key the upload will be stored under if it passes.
    pub target_key: &'a str,
    pub threats: Vec<ThreatType>,
    pub mitigations: Vec<Mitigation>,
    pub details: BTreeMap<String, String>,
    pub scan_result: Option<VirusScanResult>,
    pub quarantine_key: Option<String>,
    pub risk_score: u32,
    confidence_penalty: u32,
}

impl<'a> ValidationContext<'a> {
    pub fn new(request: &'a UploadRequest, target_key: &'a str) -> Self {
        Self {
            request,
            target_key,
            threats: Vec::new(),
            mitigations: Vec::new(),
            details: BTreeMap::new(),
            scan_result: None,
            quarantine_key: None,
            risk_score: 0,
            confidence_penalty: 0,
        }
    }

    pub fn flag(&mut self, threat: ThreatType, mitigation: Mitigation) {
        if !self.threats.contains(&threat) {
            self.threats.push(threat);
        }
        if !self.mitigations.contains(&mitigation) {
            self.mitigations.push(mitigation);
        }
    }

    pub fn note(&mut self, key: &str, value: impl Into<String>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// Lower confidence without recording a threat.
    pub fn penalize(&mut self, points: u32) {
        self.confidence_penalty = self.confidence_penalty.saturating_add(points);
    }

    pub fn is_clean(&self) -> bool {
        self.threats.is_empty()
    }

    pub fn confidence_score(&self) -> u8 {
        let penalty = (self.threats.len() as u32)
            .saturating_mul(THREAT_PENALTY)
            .saturating_add(self.confidence_penalty);
        100u32.saturating_sub(penalty) as u8
    }

    fn into_validation(self, force_fail: bool) -> SecurityValidation {
        let confidence_score = self.confidence_score();
        SecurityValidation {
            passed: !force_fail && self.threats.is_empty(),
            scan_id: self
                .scan_result
                .as_ref()
                .map(|r| r.scan_id)
                .unwrap_or_else(Uuid::new_v4),
            threats: self.threats,
            mitigations: self.mitigations,
            confidence_score,
            risk_score: self.risk_score,
            scan_result: self.scan_result,
            quarantine_key: self.quarantine_key,
            details: self.details,
            validated_at: Utc::now(),
        }
    }
}

/// One step of the pipeline. `Ok` continues; `Err` ends the pass.
#[async_trait]
pub trait ValidationStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()>;
}

pub struct RateLimitStage {
    limiter: Arc<dyn RateLimitBackend>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<dyn RateLimitBackend>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl ValidationStage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()> {
        let status = self
            .limiter
            .check_limit(ctx.request.owner_id, UPLOAD_OPERATION)
            .await?;
        ctx.note("rate_limit_remaining", status.remaining.to_string());

        if !status.allowed {
            tracing::warn!(
                user_id = %ctx.request.owner_id,
                limit = status.limit,
                reset_at = %status.reset_at,
                "Upload rate limit exceeded"
            );
            ctx.flag(ThreatType::RateLimitExceeded, Mitigation::RateLimited);
            return Err(AppError::RateLimitExceeded {
                limit: status.limit,
                remaining: status.remaining,
                reset_at: status.reset_at,
            });
        }
        Ok(())
    }
}

pub struct FormatStage {
    validator: FormatValidator,
}

impl FormatStage {
    pub fn new(validator: FormatValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl ValidationStage for FormatStage {
    fn name(&self) -> &'static str {
        "format"
    }

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()> {
        let errors = self.validator.validate(
            &ctx.request.filename,
            &ctx.request.content_type,
            ctx.request.data.len() as u64,
        );
        if errors.is_empty() {
            return Ok(());
        }

        ctx.flag(ThreatType::InvalidFormat, Mitigation::FormatRejection);
        if errors.iter().any(|e| e.is_size_violation()) {
            ctx.flag(ThreatType::FileTooLarge, Mitigation::FormatRejection);
        }
        let summary = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ctx.note("format", summary);
        Ok(())
    }
}

pub struct ContentStage {
    validator: ContentValidator,
}

impl ContentStage {
    pub fn new(validator: ContentValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl ValidationStage for ContentStage {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()> {
        let errors = self
            .validator
            .validate(&ctx.request.content_type, &ctx.request.data);
        if !errors.is_empty() {
            ctx.flag(ThreatType::SuspiciousContent, Mitigation::ContentSanitization);
            let summary = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            ctx.note("content", summary);
        }
        Ok(())
    }
}

pub struct VirusScanStage {
    engine: Arc<VirusScanEngine>,
    quarantine: Arc<QuarantineService>,
}

impl VirusScanStage {
    pub fn new(engine: Arc<VirusScanEngine>, quarantine: Arc<QuarantineService>) -> Self {
        Self { engine, quarantine }
    }
}

#[async_trait]
impl ValidationStage for VirusScanStage {
    fn name(&self) -> &'static str {
        "virus_scan"
    }

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()> {
        if !self.engine.is_enabled() {
            ctx.note("virus_scan", "disabled");
            return Ok(());
        }
        // Already reported by the format stage
        if ctx.request.data.is_empty() {
            ctx.note("virus_scan", "not run: empty file");
            return Ok(());
        }

        let result = self.engine.scan(&ctx.request.data).await?;
        ctx.note("scanner_version", result.scanner_version.clone());

        match result.outcome {
            ScanOutcome::Completed if !result.clean => {
                ctx.flag(ThreatType::MalwareDetected, Mitigation::Quarantine);
                ctx.note("malware", result.threats.join(","));
                let quarantine_key = self
                    .quarantine
                    .quarantine_bytes(
                        ctx.target_key,
                        ctx.request.data.clone(),
                        &ctx.request.content_type,
                        &result.threats,
                    )
                    .await;
                ctx.scan_result = Some(result);
                ctx.quarantine_key = Some(quarantine_key?);
            }
            ScanOutcome::Timeout | ScanOutcome::Error => {
                ctx.flag(ThreatType::ScanIncomplete, Mitigation::ManualReview);
                let label = if result.outcome == ScanOutcome::Timeout {
                    "timeout"
                } else {
                    "error"
                };
                ctx.note("virus_scan", label);
                ctx.scan_result = Some(result);
            }
            ScanOutcome::Skipped => {
                ctx.penalize(SKIPPED_SCAN_PENALTY);
                ctx.note("virus_scan", "skipped: file too large to scan");
                ctx.scan_result = Some(result);
            }
            _ => {
                ctx.note("virus_scan", "clean");
                ctx.scan_result = Some(result);
            }
        }
        Ok(())
    }
}

pub struct HeuristicStage {
    heuristics: BehavioralHeuristics,
}

impl HeuristicStage {
    pub fn new(heuristics: BehavioralHeuristics) -> Self {
        Self { heuristics }
    }
}

#[async_trait]
impl ValidationStage for HeuristicStage {
    fn name(&self) -> &'static str {
        "heuristics"
    }

    async fn run(&self, ctx: &mut ValidationContext<'_>) -> AppResult<()> {
        let report = self.heuristics.analyze(
            &ctx.request.filename,
            &ctx.request.content_type,
            ctx.request.data.len() as u64,
        );
        ctx.risk_score = report.risk_score;
        if report.findings.is_empty() {
            return Ok(());
        }

        let rules = report
            .findings
            .iter()
            .map(|f| f.rule)
            .collect::<Vec<_>>()
            .join(",");
        ctx.note("heuristics", rules);

        if self.heuristics.is_suspicious(&report) {
            ctx.flag(ThreatType::SuspiciousContent, Mitigation::EnhancedMonitoring);
        } else {
            ctx.penalize(FINDING_PENALTY * report.findings.len() as u32);
        }
        Ok(())
    }
}

pub struct SecurityValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
    rate_limiter: Arc<dyn RateLimitBackend>,
    audit: Arc<dyn AuditSink>,
}

impl SecurityValidationPipeline {
    /// The standard five-stage pipeline.
    pub fn new(
        policy: &SecurityPolicy,
        engine: Arc<VirusScanEngine>,
        quarantine: Arc<QuarantineService>,
        rate_limiter: Arc<dyn RateLimitBackend>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let stages: Vec<Box<dyn ValidationStage>> = vec![
            Box::new(RateLimitStage::new(rate_limiter.clone())),
            Box::new(FormatStage::new(FormatValidator::from_policy(policy))),
            Box::new(ContentStage::new(ContentValidator::new())),
            Box::new(VirusScanStage::new(engine, quarantine)),
            Box::new(HeuristicStage::new(BehavioralHeuristics::new(
                policy.risk_threshold,
            ))),
        ];
        Self::with_stages(stages, rate_limiter, audit)
    }

    pub fn with_stages(
        stages: Vec<Box<dyn ValidationStage>>,
        rate_limiter: Arc<dyn RateLimitBackend>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            stages,
            rate_limiter,
            audit,
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.owner_id, filename = %request.filename, size_bytes = request.data.len())
    )]
    pub async fn validate(
        &self,
        request: &UploadRequest,
        target_key: &str,
    ) -> AppResult<SecurityValidation> {
        let mut ctx = ValidationContext::new(request, target_key);

        for stage in &self.stages {
            if let Err(err) = stage.run(&mut ctx).await {
                return Err(self.reject(ctx, stage.name(), err).await);
            }
        }

        if ctx.is_clean() {
            if let Err(err) = self
                .rate_limiter
                .increment_counter(request.owner_id, UPLOAD_OPERATION)
                .await
            {
                return Err(self.reject(ctx, "rate_limit_increment", err).await);
            }
        }

        let validation = ctx.into_validation(false);
        self.audit
            .log_security_validation(request.owner_id, &validation)
            .await;

        if validation.passed {
            tracing::info!(
                scan_id = %validation.scan_id,
                confidence_score = validation.confidence_score,
                risk_score = validation.risk_score,
                "Security validation passed"
            );
        } else {
            tracing::warn!(
                scan_id = %validation.scan_id,
                threats = ?validation.threats,
                mitigations = ?validation.mitigations,
                "Security validation failed"
            );
        }
        Ok(validation)
    }

    async fn reject(&self, mut ctx: ValidationContext<'_>, stage: &str, err: AppError) -> AppError {
        let user_id = ctx.request.owner_id;

        match err.kind() {
            ErrorKind::RateLimitExceeded | ErrorKind::UnauthorizedAccess | ErrorKind::Quarantine => {
                let validation = ctx.into_validation(true);
                self.audit.log_security_validation(user_id, &validation).await;
                err
            }
            _ => {
                tracing::error!(
                    error = %err,
                    stage = %stage,
                    user_id = %user_id,
                    "Security validation aborted, rejecting upload"
                );
                ctx.flag(ThreatType::SuspiciousContent, Mitigation::SystemRejection);
                ctx.note("failed_stage", stage);
                ctx.note("error", err.to_string());
                let validation = ctx.into_validation(true);
                self.audit.log_security_validation(user_id, &validation).await;
                AppError::SecurityThreat {
                    threats: validation.threats,
                    details: GENERIC_REJECTION.to_string(),
                }
            }
        }
    }
}
