//! Test helpers: recording collaborators and a fully wired FileService over
//! local storage in a temp dir.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use stashguard_core::models::{
    AccessResult, DomainEvent, EnqueuedJob, FileOperation, JobOptions, PresignOptions,
    QueueStats, SecurityValidation,
};
use stashguard_core::{
    AppError, AppResult, AuditSink, EventSink, ProcessingConfig, RateLimitBackend,
    RateLimitStatus, ScanConfig, SecurityPolicy, TaskQueue,
};
use stashguard_infra::InMemoryFileRepository;
use stashguard_services::{
    AggregateStore, Detection, DetectorError, FileService, FileServiceDeps,
    ProcessingOrchestrator, QuarantineService, SecurityValidationPipeline, SignatureDetector,
    ThreatDetector, VirusScanEngine,
};
use stashguard_storage::{GatewaySettings, LocalBackend, ObjectStorageGateway, RetryPolicy};
use tempfile::TempDir;
use uuid::Uuid;

pub const QUARANTINE_PREFIX: &str = "quarantine";

/// Rate limiter whose verdict is set by the test; counts calls.
pub struct MockRateLimiter {
    pub allowed: Mutex<bool>,
    pub broken: Mutex<bool>,
    pub checks: AtomicU32,
    pub increments: AtomicU32,
}

impl Default for MockRateLimiter {
    fn default() -> Self {
        Self {
            allowed: Mutex::new(true),
            broken: Mutex::new(false),
            checks: AtomicU32::new(0),
            increments: AtomicU32::new(0),
        }
    }
}

impl MockRateLimiter {
    pub fn deny(&self) {
        *self.allowed.lock().unwrap() = false;
    }

    pub fn break_backend(&self) {
        *self.broken.lock().unwrap() = true;
    }

    pub fn increments(&self) -> u32 {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLimitBackend for MockRateLimiter {
    async fn check_limit(&self, _user_id: Uuid, _operation: &str) -> AppResult<RateLimitStatus> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if *self.broken.lock().unwrap() {
            return Err(AppError::Internal(
                "rate limit store unreachable at 10.0.0.7:6379".to_string(),
            ));
        }
        let allowed = *self.allowed.lock().unwrap();
        Ok(RateLimitStatus {
            allowed,
            limit: 100,
            remaining: if allowed { 42 } else { 0 },
            reset_at: Utc::now() + chrono::Duration::minutes(30),
        })
    }

    async fn increment_counter(&self, _user_id: Uuid, _operation: &str) -> AppResult<()> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessEntry {
    pub user_id: Uuid,
    pub file_id: Uuid,
    pub operation: FileOperation,
    pub result: AccessResult,
}

#[derive(Default)]
pub struct RecordingAudit {
    pub validations: Mutex<Vec<SecurityValidation>>,
    pub accesses: Mutex<Vec<AccessEntry>>,
    pub urls: Mutex<Vec<PresignOptions>>,
    pub events: Mutex<Vec<DomainEvent>>,
}

impl RecordingAudit {
    pub fn validations(&self) -> Vec<SecurityValidation> {
        self.validations.lock().unwrap().clone()
    }

    pub fn accesses(&self) -> Vec<AccessEntry> {
        self.accesses.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn log_security_validation(&self, _user_id: Uuid, validation: &SecurityValidation) {
        self.validations.lock().unwrap().push(validation.clone());
    }

    async fn log_file_access(
        &self,
        user_id: Uuid,
        file_id: Uuid,
        operation: FileOperation,
        result: AccessResult,
        _details: serde_json::Value,
    ) {
        self.accesses.lock().unwrap().push(AccessEntry {
            user_id,
            file_id,
            operation,
            result,
        });
    }

    async fn log_url_generation(&self, _file_id: Uuid, _user_id: Uuid, options: &PresignOptions) {
        self.urls.lock().unwrap().push(options.clone());
    }
}

#[async_trait]
impl EventSink for RecordingAudit {
    async fn publish(&self, events: Vec<DomainEvent>) {
        self.events.lock().unwrap().extend(events);
    }
}

#[derive(Default)]
pub struct MockQueue {
    pub jobs: Mutex<Vec<(String, serde_json::Value, JobOptions)>>,
    pub fail: Mutex<bool>,
}

impl MockQueue {
    pub fn jobs(&self) -> Vec<(String, serde_json::Value, JobOptions)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for MockQueue {
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> AppResult<EnqueuedJob> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::Internal("queue unavailable".to_string()));
        }
        self.jobs
            .lock()
            .unwrap()
            .push((job_name.to_string(), payload, options));
        Ok(EnqueuedJob {
            job_id: Uuid::new_v4(),
            job_name: job_name.to_string(),
        })
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        Ok(QueueStats {
            waiting: self.jobs.lock().unwrap().len(),
            ..QueueStats::default()
        })
    }
}

/// Wraps the signature detector, counting calls and optionally stalling.
pub struct CountingDetector {
    inner: SignatureDetector,
    pub calls: AtomicU32,
    pub delay: Mutex<Option<Duration>>,
}

impl CountingDetector {
    pub fn new() -> Self {
        Self {
            inner: SignatureDetector::new(),
            calls: AtomicU32::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Mutex::new(Some(delay)),
            ..Self::new()
        }
    }

    /// Make every later inspection stall for `delay`.
    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreatDetector for CountingDetector {
    async fn inspect(&self, data: Bytes) -> Result<Detection, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.inspect(data).await
    }

    fn version(&self) -> String {
        self.inner.version()
    }
}

pub struct HarnessOptions {
    pub scan_enabled: bool,
    pub detector: CountingDetector,
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub policy: SecurityPolicy,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            scan_enabled: true,
            detector: CountingDetector::new(),
            multipart_threshold: 100 * 1024 * 1024,
            part_size: 50 * 1024 * 1024,
            policy: SecurityPolicy::default(),
        }
    }
}

pub struct Harness {
    pub service: FileService,
    pub pipeline: Arc<SecurityValidationPipeline>,
    pub engine: Arc<VirusScanEngine>,
    pub gateway: Arc<ObjectStorageGateway>,
    pub quarantine: Arc<QuarantineService>,
    pub orchestrator: Arc<ProcessingOrchestrator>,
    pub repository: Arc<InMemoryFileRepository>,
    pub limiter: Arc<MockRateLimiter>,
    pub audit: Arc<RecordingAudit>,
    pub queue: Arc<MockQueue>,
    pub detector: Arc<CountingDetector>,
    pub policy: SecurityPolicy,
    _dir: TempDir,
}

impl Harness {
    pub async fn new(scan_enabled: bool) -> Self {
        Self::build(HarnessOptions {
            scan_enabled,
            ..HarnessOptions::default()
        })
        .await
    }

    pub async fn build(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(
            dir.path(),
            "http://localhost:3000/files".to_string(),
            b"test-presign-secret".to_vec(),
        )
        .await
        .unwrap();
        let gateway = Arc::new(ObjectStorageGateway::new(
            Arc::new(backend),
            GatewaySettings {
                multipart_threshold: options.multipart_threshold,
                part_size: options.part_size,
                part_concurrency: 2,
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                },
            },
        ));

        let detector = Arc::new(options.detector);
        let engine = Arc::new(VirusScanEngine::new(
            ScanConfig {
                enabled: options.scan_enabled,
                ..ScanConfig::default()
            },
            detector.clone(),
        ));

        let limiter = Arc::new(MockRateLimiter::default());
        let audit = Arc::new(RecordingAudit::default());
        let queue = Arc::new(MockQueue::default());
        let repository = Arc::new(InMemoryFileRepository::new());

        let quarantine = Arc::new(QuarantineService::new(gateway.clone(), QUARANTINE_PREFIX));
        let pipeline = Arc::new(SecurityValidationPipeline::new(
            &options.policy,
            engine.clone(),
            quarantine.clone(),
            limiter.clone(),
            audit.clone(),
        ));
        let processing = ProcessingConfig::default();
        let store = Arc::new(AggregateStore::new(
            repository.clone(),
            audit.clone(),
            processing.max_access_log,
        ));
        let orchestrator = Arc::new(ProcessingOrchestrator::new(
            store.clone(),
            queue.clone(),
            gateway.clone(),
            processing,
        ));

        let service = FileService::new(
            FileServiceDeps {
                pipeline: pipeline.clone(),
                engine: engine.clone(),
                gateway: gateway.clone(),
                quarantine: quarantine.clone(),
                store,
                orchestrator: orchestrator.clone(),
                audit: audit.clone(),
            },
            options.policy.clone(),
        );

        Self {
            service,
            pipeline,
            engine,
            gateway,
            quarantine,
            orchestrator,
            repository,
            limiter,
            audit,
            queue,
            detector,
            policy: options.policy,
            _dir: dir,
        }
    }
}

/// A JPEG-looking buffer of exactly `size` bytes.
pub fn jpeg_bytes(size: usize) -> Vec<u8> {
    let mut data = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    data.resize(size, 0x42);
    data
}

pub fn eicar_bytes() -> Vec<u8> {
    stashguard_services::EICAR_TEST_STRING.as_bytes().to_vec()
}
