//! Processing orchestration
//!
//! Decides job priority, hands processing work to the external task queue and
//! snapshots a file into a new version before any destructive edit. Enqueue
//! failures are returned unchanged: retries belong to the queue, configured
//! through the job's `attempts`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stashguard_core::keys::version_storage_key;
use stashguard_core::models::{
    ChangeType, DocumentType, FileMetadata, FileVersion, JobOptions, NewVersion, ProcessingJob,
    ProcessingOptions, ProcessingStatus, QueueStats, QueuedProcessing, PROCESS_FILE_JOB,
};
use stashguard_core::{
    compute_checksums, AppError, AppResult, Checksums, FileAggregate, ProcessingConfig, TaskQueue,
};
use stashguard_storage::{ObjectMeta, ObjectStorageGateway};
use uuid::Uuid;

use crate::store::AggregateStore;

const MB: u64 = 1024 * 1024;
const MIN_PRIORITY: i32 = 1;
const MAX_PRIORITY: i32 = 20;
const URGENT_BOOST: i32 = 5;

/// Job priority: the requested level, boosted for urgency, small files and
/// quick-to-process types. Always within `1..=20`.
pub fn priority_score(metadata: &FileMetadata, options: &ProcessingOptions) -> i32 {
    let mut score = options.priority.as_i32();
    if options.urgent {
        score += URGENT_BOOST;
    }

    score += match metadata.size {
        s if s < MB => 3,
        s if s < 10 * MB => 2,
        s if s < 100 * MB => 1,
        _ => 0,
    };

    score += match metadata.document_type {
        DocumentType::Image => 2,
        DocumentType::Text | DocumentType::Pdf => 1,
        DocumentType::Video => -1,
        _ => 0,
    };

    score.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Rough processing time from document type and size.
pub fn estimated_duration(metadata: &FileMetadata) -> Duration {
    let (base_ms, per_mb_ms): (u64, u64) = match metadata.document_type {
        DocumentType::Image => (2_000, 500),
        DocumentType::Video => (30_000, 2_000),
        DocumentType::Audio => (10_000, 1_000),
        DocumentType::Pdf | DocumentType::Spreadsheet | DocumentType::Presentation => {
            (5_000, 300)
        }
        DocumentType::Text => (1_000, 100),
        DocumentType::Archive => (10_000, 500),
        DocumentType::Other => (3_000, 200),
    };
    let megabytes = metadata.size.div_ceil(MB);
    Duration::from_millis(base_ms.saturating_add(per_mb_ms.saturating_mul(megabytes)))
}

pub struct ProcessingOrchestrator {
    store: Arc<AggregateStore>,
    queue: Arc<dyn TaskQueue>,
    gateway: Arc<ObjectStorageGateway>,
    config: ProcessingConfig,
}

impl ProcessingOrchestrator {
    pub fn new(
        store: Arc<AggregateStore>,
        queue: Arc<dyn TaskQueue>,
        gateway: Arc<ObjectStorageGateway>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            store,
            queue,
            gateway,
            config,
        }
    }

    #[tracing::instrument(skip(self, options), fields(file_id = %file_id))]
    pub async fn queue_processing(
        &self,
        file_id: Uuid,
        options: ProcessingOptions,
    ) -> AppResult<QueuedProcessing> {
        let aggregate = self.store.load(file_id).await?;
        let metadata = aggregate.metadata();

        if metadata.processing_status != ProcessingStatus::Pending {
            return Err(AppError::InvalidProcessingState {
                file_id,
                status: metadata.processing_status,
            });
        }

        let priority = priority_score(metadata, &options);
        let job = ProcessingJob {
            file_id,
            owner_id: metadata.owner_id,
            priority,
            attempts: self.config.job_attempts,
            operations: options.operations.clone(),
        };
        let payload = serde_json::to_value(&job)?;

        let enqueued = self
            .queue
            .enqueue(
                PROCESS_FILE_JOB,
                payload,
                JobOptions {
                    priority,
                    attempts: self.config.job_attempts,
                },
            )
            .await?;

        let estimated = estimated_duration(metadata);
        tracing::info!(
            job_id = %enqueued.job_id,
            priority = priority,
            estimated_secs = estimated.as_secs(),
            "Processing job queued"
        );

        Ok(QueuedProcessing {
            job_id: enqueued.job_id,
            status: "queued".to_string(),
            priority,
            estimated_duration: estimated,
        })
    }

    pub async fn queue_stats(&self) -> AppResult<QueueStats> {
        self.queue.stats().await
    }

    /// Store new content for a file and record it as the next active version.
    pub async fn create_version(
        &self,
        aggregate: &mut FileAggregate,
        created_by: Uuid,
        data: Bytes,
        change_type: ChangeType,
    ) -> AppResult<FileVersion> {
        aggregate.ensure_editable()?;

        let key = self.next_version_key(aggregate);
        let checksums = compute_checksums(&data);
        let size = data.len() as u64;
        let meta = ObjectMeta::with_content_type(aggregate.metadata().content_type.clone());

        self.gateway.upload(&key, data, &meta).await?;
        self.push_version(aggregate, created_by, change_type, size, checksums, key)
            .await
    }

    /// Snapshot the current content into a new active version so an edit can
    /// overwrite it while earlier versions stay intact.
    #[tracing::instrument(skip(self), fields(file_id = %file_id, user_id = %user_id))]
    pub async fn prepare_destructive_edit(
        &self,
        file_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<FileVersion> {
        let mut aggregate = self.store.load(file_id).await?;
        aggregate.ensure_editable()?;

        let (source_key, size, checksums) = {
            let metadata = aggregate.metadata();
            (
                metadata.storage_key.clone(),
                metadata.size,
                Checksums {
                    md5: metadata.checksum_md5.clone(),
                    sha256: metadata.checksum_sha256.clone(),
                },
            )
        };
        let key = self.next_version_key(&aggregate);

        self.gateway.copy(&source_key, &key).await?;
        let version = self
            .push_version(
                &mut aggregate,
                user_id,
                ChangeType::Processed,
                size,
                checksums,
                key,
            )
            .await?;
        self.store.save(&mut aggregate).await?;
        Ok(version)
    }

    fn next_version_key(&self, aggregate: &FileAggregate) -> String {
        let original = aggregate
            .versions()
            .first()
            .map(|v| v.storage_key.as_str())
            .unwrap_or(aggregate.metadata().storage_key.as_str());
        version_storage_key(original, aggregate.metadata().version_count + 1)
    }

    async fn push_version(
        &self,
        aggregate: &mut FileAggregate,
        created_by: Uuid,
        change_type: ChangeType,
        size: u64,
        checksums: Checksums,
        key: String,
    ) -> AppResult<FileVersion> {
        let result = aggregate.create_version(NewVersion {
            created_by,
            change_type,
            size,
            checksums,
            storage_key: key.clone(),
        });

        match result {
            Ok(version) => {
                tracing::info!(
                    file_id = %aggregate.id(),
                    version_number = version.version_number,
                    key = %key,
                    "File version created"
                );
                Ok(version)
            }
            Err(e) => {
                if let Err(cleanup) = self.gateway.delete(&key).await {
                    tracing::warn!(error = %cleanup, key = %key, "Failed to remove orphaned version object");
                }
                Err(e)
            }
        }
    }
}
