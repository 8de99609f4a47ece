//! Service wiring for the `stashguard` binary.
//!
//! Builds the scan engine, storage gateway, validation pipeline and file
//! service from a [`Config`], backed by the in-memory repository, rate limiter
//! and task queue from `stashguard-infra` and `stashguard-worker`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use stashguard_core::Config;
use stashguard_infra::{InMemoryFileRepository, InMemoryRateLimiter, TracingAuditSink};
use stashguard_services::validation::content::sniff;
use stashguard_services::{
    AggregateStore, FileService, FileServiceDeps, ProcessingOrchestrator, QuarantineService,
    SecurityValidationPipeline, VirusScanEngine,
};
use stashguard_storage::{create_gateway, ObjectStorageGateway};
use stashguard_worker::InMemoryTaskQueue;

pub struct App {
    pub engine: Arc<VirusScanEngine>,
    pub gateway: Arc<ObjectStorageGateway>,
    pub pipeline: Arc<SecurityValidationPipeline>,
    pub files: FileService,
    pub queue: Arc<InMemoryTaskQueue>,
}

impl App {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let engine = Arc::new(
            VirusScanEngine::from_config(config.scan.clone())
                .context("Failed to create virus scan engine")?,
        );
        let gateway = Arc::new(
            create_gateway(&config.storage)
                .await
                .context("Failed to create storage gateway")?,
        );
        let quarantine = Arc::new(QuarantineService::new(
            gateway.clone(),
            config.storage.quarantine_prefix.clone(),
        ));
        let audit = Arc::new(TracingAuditSink::new());
        let rate_limiter = Arc::new(InMemoryRateLimiter::from_policy(&config.security));

        let pipeline = Arc::new(SecurityValidationPipeline::new(
            &config.security,
            engine.clone(),
            quarantine.clone(),
            rate_limiter,
            audit.clone(),
        ));
        let store = Arc::new(AggregateStore::new(
            Arc::new(InMemoryFileRepository::new()),
            audit.clone(),
            config.processing.max_access_log,
        ));
        let queue = Arc::new(InMemoryTaskQueue::new());
        let orchestrator = Arc::new(ProcessingOrchestrator::new(
            store.clone(),
            queue.clone(),
            gateway.clone(),
            config.processing.clone(),
        ));

        let files = FileService::new(
            FileServiceDeps {
                pipeline: pipeline.clone(),
                engine: engine.clone(),
                gateway: gateway.clone(),
                quarantine,
                store,
                orchestrator,
                audit,
            },
            config.security.clone(),
        );

        Ok(Self {
            engine,
            gateway,
            pipeline,
            files,
            queue,
        })
    }
}

/// Content type from magic bytes, falling back to the file extension.
pub fn guess_content_type(path: &Path, data: &[u8]) -> String {
    if let Some(sniffed) = sniff(data) {
        return sniffed.to_string();
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Read a file to upload, returning its file name and contents.
pub async fn read_input(path: &Path) -> anyhow::Result<(String, Bytes)> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Input path has no usable file name")?
        .to_string();
    Ok((filename, Bytes::from(data)))
}
