//! File use cases
//!
//! Upload runs the full data flow: security validation, checksums, object
//! storage, aggregate creation, persistence, audit and optional processing.
//! Every other use case loads the aggregate, checks access, mutates it and
//! saves it, publishing the drained domain events. Denied or failed
//! operations are audited with `result = FAILURE`.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use stashguard_core::keys::generate_storage_key;
use stashguard_core::models::{
    extension_of, AccessResult, ChangeType, FileAccess, FileMetadata, FileOperation, FileVersion,
    PresignOperation, PresignOptions, PresignRequest, PresignedUrl, ProcessingOptions,
    ProcessingStatus, QueuedProcessing, ScanOutcome, SecurityValidation, ThreatType,
    UploadRequest, VirusScanResult, VirusScanStatus,
};
use stashguard_core::{
    compute_checksums, AppError, AppResult, AuditSink, FileAggregate, FileFilters, NewFile,
    SecurityPolicy, StorageUsage,
};
use stashguard_storage::{ObjectMeta, ObjectStorageGateway, StoredObject};
use uuid::Uuid;
use validator::Validate;

use crate::orchestrator::ProcessingOrchestrator;
use crate::quarantine::QuarantineService;
use crate::scanner::VirusScanEngine;
use crate::store::AggregateStore;
use crate::validation::SecurityValidationPipeline;

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub file: FileMetadata,
    pub validation: SecurityValidation,
    pub stored: StoredObject,
    pub processing: Option<QueuedProcessing>,
}

/// Collaborators the file service is built from.
pub struct FileServiceDeps {
    pub pipeline: Arc<SecurityValidationPipeline>,
    pub engine: Arc<VirusScanEngine>,
    pub gateway: Arc<ObjectStorageGateway>,
    pub quarantine: Arc<QuarantineService>,
    pub store: Arc<AggregateStore>,
    pub orchestrator: Arc<ProcessingOrchestrator>,
    pub audit: Arc<dyn AuditSink>,
}

pub struct FileService {
    pipeline: Arc<SecurityValidationPipeline>,
    engine: Arc<VirusScanEngine>,
    gateway: Arc<ObjectStorageGateway>,
    quarantine: Arc<QuarantineService>,
    store: Arc<AggregateStore>,
    orchestrator: Arc<ProcessingOrchestrator>,
    audit: Arc<dyn AuditSink>,
    policy: SecurityPolicy,
}

fn scan_status(result: Option<&VirusScanResult>) -> VirusScanStatus {
    match result {
        Some(r) if r.is_infected() => VirusScanStatus::Infected,
        Some(r) if r.outcome == ScanOutcome::Completed => VirusScanStatus::Clean,
        Some(r) if matches!(r.outcome, ScanOutcome::Timeout | ScanOutcome::Error) => {
            VirusScanStatus::Error
        }
        _ => VirusScanStatus::Pending,
    }
}

impl FileService {
    pub fn new(deps: FileServiceDeps, policy: SecurityPolicy) -> Self {
        Self {
            pipeline: deps.pipeline,
            engine: deps.engine,
            gateway: deps.gateway,
            quarantine: deps.quarantine,
            store: deps.store,
            orchestrator: deps.orchestrator,
            audit: deps.audit,
            policy,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.owner_id, filename = %request.filename, size_bytes = request.data.len())
    )]
    pub async fn upload(&self, request: UploadRequest) -> AppResult<UploadOutcome> {
        request.validate()?;

        let file_id = Uuid::new_v4();
        let extension = extension_of(&request.filename);
        let storage_key =
            generate_storage_key(request.owner_id, file_id, extension.as_deref(), Utc::now());

        let validation = self.pipeline.validate(&request, &storage_key).await?;
        if !validation.passed {
            let names = validation
                .threats
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::SecurityThreat {
                threats: validation.threats.clone(),
                details: format!("Upload rejected: {}", names),
            });
        }

        let checksums = compute_checksums(&request.data);
        let mut meta = ObjectMeta::with_content_type(request.content_type.clone());
        meta.metadata
            .insert("file-id".to_string(), file_id.to_string());
        meta.metadata
            .insert("sha256".to_string(), checksums.sha256.clone());

        let stored = self
            .gateway
            .upload(&storage_key, request.data.clone(), &meta)
            .await?;

        let mut aggregate = FileAggregate::create(
            NewFile {
                id: file_id,
                owner_id: request.owner_id,
                project_id: request.project_id,
                filename: format!(
                    "{}{}",
                    file_id,
                    extension.as_ref().map(|e| format!(".{}", e)).unwrap_or_default()
                ),
                original_name: request.filename.clone(),
                content_type: request.content_type.clone(),
                size: stored.size,
                storage_key: storage_key.clone(),
                checksums,
                tags: request.tags.clone(),
                virus_scan_status: scan_status(validation.scan_result.as_ref()),
            },
            self.store.max_access_log(),
        )?;
        aggregate.record_access(
            FileAccess::success(file_id, request.owner_id, FileOperation::Write)
                .with_client(request.ip_address.clone(), request.user_agent.clone()),
        );

        if let Err(e) = self.store.insert(&mut aggregate).await {
            if let Err(cleanup) = self.gateway.delete(&storage_key).await {
                tracing::warn!(error = %cleanup, key = %storage_key, "Failed to remove orphaned upload");
            }
            return Err(e);
        }

        self.audit
            .log_file_access(
                request.owner_id,
                file_id,
                FileOperation::Write,
                AccessResult::Success,
                json!({
                    "storage_key": storage_key,
                    "size": stored.size,
                    "multipart": stored.multipart,
                    "scan_id": validation.scan_id,
                }),
            )
            .await;

        let processing = match request.process.clone() {
            Some(options) => match self.orchestrator.queue_processing(file_id, options).await {
                Ok(queued) => Some(queued),
                Err(e) => {
                    // The file is stored and stays PENDING; it can be queued again.
                    tracing::warn!(error = %e, file_id = %file_id, "Failed to queue processing after upload");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            file_id = %file_id,
            key = %storage_key,
            size_bytes = stored.size,
            "File uploaded"
        );

        Ok(UploadOutcome {
            file: aggregate.metadata().clone(),
            validation,
            stored,
            processing,
        })
    }

    async fn authorize(
        &self,
        aggregate: &mut FileAggregate,
        user_id: Uuid,
        operation: FileOperation,
    ) -> AppResult<()> {
        if aggregate.can_access(user_id, operation) {
            return Ok(());
        }
        let err = AppError::UnauthorizedAccess(format!(
            "User {} may not {} file {}",
            user_id,
            operation,
            aggregate.id()
        ));
        self.audit_failure(aggregate, user_id, operation, &err).await;
        Err(err)
    }

    async fn audit_failure(
        &self,
        aggregate: &mut FileAggregate,
        user_id: Uuid,
        operation: FileOperation,
        err: &AppError,
    ) {
        tracing::warn!(
            file_id = %aggregate.id(),
            user_id = %user_id,
            operation = %operation,
            error = %err,
            "File operation failed"
        );
        aggregate.record_access(FileAccess::failure(
            aggregate.id(),
            user_id,
            operation,
            err.to_string(),
        ));
        self.audit
            .log_file_access(
                user_id,
                aggregate.id(),
                operation,
                AccessResult::Failure,
                json!({ "error": err.to_string() }),
            )
            .await;
        self.store.publish(aggregate).await;
    }

    async fn audit_success(
        &self,
        aggregate: &mut FileAggregate,
        user_id: Uuid,
        operation: FileOperation,
        details: serde_json::Value,
    ) {
        aggregate.record_access(FileAccess::success(aggregate.id(), user_id, operation));
        self.audit
            .log_file_access(
                user_id,
                aggregate.id(),
                operation,
                AccessResult::Success,
                details,
            )
            .await;
    }

    /// Pass `result` through, auditing it as a failure when it is an error.
    async fn audited<T>(
        &self,
        aggregate: &mut FileAggregate,
        user_id: Uuid,
        operation: FileOperation,
        result: AppResult<T>,
    ) -> AppResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.audit_failure(aggregate, user_id, operation, &err).await;
                Err(err)
            }
        }
    }

    pub async fn get(&self, file_id: Uuid, user_id: Uuid) -> AppResult<FileMetadata> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Read)
            .await?;
        Ok(aggregate.metadata().clone())
    }

    pub async fn list(&self, user_id: Uuid, filters: &FileFilters) -> AppResult<Vec<FileMetadata>> {
        self.store
            .repository()
            .find_by_user_id(user_id, filters)
            .await
    }

    pub async fn storage_usage(&self, user_id: Uuid) -> AppResult<StorageUsage> {
        self.store
            .repository()
            .get_user_storage_usage(user_id)
            .await
    }

    pub async fn download(&self, file_id: Uuid, user_id: Uuid) -> AppResult<Bytes> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Read)
            .await?;

        let key = aggregate.metadata().storage_key.clone();
        let downloaded = self.gateway.download(&key).await;
        let data = self
            .audited(&mut aggregate, user_id, FileOperation::Read, downloaded)
            .await?;

        self.audit_success(
            &mut aggregate,
            user_id,
            FileOperation::Read,
            json!({ "size": data.len() }),
        )
        .await;
        self.store.publish(&mut aggregate).await;
        Ok(data)
    }

    /// Issue a presigned URL for the file's active content.
    ///
    /// The requested expiry is clamped to the policy ceiling before signing.
    pub async fn generate_presigned_url(
        &self,
        file_id: Uuid,
        user_id: Uuid,
        request: PresignRequest,
    ) -> AppResult<PresignedUrl> {
        request.validate()?;
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::GenerateUrl)
            .await?;

        if aggregate.metadata().is_deleted() {
            let err = AppError::NotFound(format!("File {} is deleted", file_id));
            self.audit_failure(&mut aggregate, user_id, FileOperation::GenerateUrl, &err)
                .await;
            return Err(err);
        }

        let expires_in_secs = self.policy.clamp_presign_expiry(request.expires_in_secs);
        if request.expires_in_secs.is_some_and(|secs| secs > expires_in_secs) {
            tracing::debug!(
                requested = ?request.expires_in_secs,
                granted = expires_in_secs,
                "Presigned URL expiry clamped to policy maximum"
            );
        }

        let options = PresignOptions {
            key: aggregate.metadata().storage_key.clone(),
            operation: request.operation,
            expires_in_secs,
            content_type: match request.operation {
                PresignOperation::Put => Some(aggregate.metadata().content_type.clone()),
                PresignOperation::Get => None,
            },
            allowed_ips: request.allowed_ips,
            allowed_user_agents: request.allowed_user_agents,
        };

        let presigned = self.gateway.presign(&options).await;
        let presigned = self
            .audited(&mut aggregate, user_id, FileOperation::GenerateUrl, presigned)
            .await?;

        self.audit.log_url_generation(file_id, user_id, &options).await;
        self.audit_success(
            &mut aggregate,
            user_id,
            FileOperation::GenerateUrl,
            json!({
                "operation": options.operation.as_str(),
                "expires_in_secs": expires_in_secs,
            }),
        )
        .await;
        self.store.publish(&mut aggregate).await;
        Ok(presigned)
    }

    /// Store new content as the next version. The content is virus scanned first.
    pub async fn create_version(
        &self,
        file_id: Uuid,
        user_id: Uuid,
        data: Bytes,
        change_type: ChangeType,
    ) -> AppResult<FileVersion> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::CreateVersion)
            .await?;

        let scan = self.engine.scan(&data).await;
        let scan = self
            .audited(&mut aggregate, user_id, FileOperation::CreateVersion, scan)
            .await?;
        let rejection = if scan.is_infected() {
            Some((ThreatType::MalwareDetected, "New version content failed virus scan"))
        } else if matches!(scan.outcome, ScanOutcome::Timeout | ScanOutcome::Error) {
            Some((ThreatType::ScanIncomplete, "New version content could not be scanned"))
        } else {
            None
        };
        if let Some((threat, details)) = rejection {
            let err = AppError::SecurityThreat {
                threats: vec![threat],
                details: details.to_string(),
            };
            self.audit_failure(&mut aggregate, user_id, FileOperation::CreateVersion, &err)
                .await;
            return Err(err);
        }

        let created = self
            .orchestrator
            .create_version(&mut aggregate, user_id, data, change_type)
            .await;
        let version = self
            .audited(&mut aggregate, user_id, FileOperation::CreateVersion, created)
            .await?;

        self.audit_success(
            &mut aggregate,
            user_id,
            FileOperation::CreateVersion,
            json!({ "version_number": version.version_number }),
        )
        .await;
        self.store.save(&mut aggregate).await?;
        Ok(version)
    }

    pub async fn restore_version(
        &self,
        file_id: Uuid,
        user_id: Uuid,
        version_number: u32,
    ) -> AppResult<FileVersion> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::RestoreVersion)
            .await?;

        let restored = aggregate.restore_version(version_number, user_id);
        let version = self
            .audited(&mut aggregate, user_id, FileOperation::RestoreVersion, restored)
            .await?;

        self.audit_success(
            &mut aggregate,
            user_id,
            FileOperation::RestoreVersion,
            json!({
                "restored_from": version_number,
                "version_number": version.version_number,
            }),
        )
        .await;
        self.store.save(&mut aggregate).await?;
        Ok(version)
    }

    pub async fn soft_delete(&self, file_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Delete)
            .await?;

        let deleted = aggregate.soft_delete(user_id);
        self.audited(&mut aggregate, user_id, FileOperation::Delete, deleted)
            .await?;

        self.audit_success(&mut aggregate, user_id, FileOperation::Delete, json!({}))
            .await;
        self.store.save(&mut aggregate).await
    }

    pub async fn restore(&self, file_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Write)
            .await?;

        let restored = aggregate.restore(user_id);
        self.audited(&mut aggregate, user_id, FileOperation::Write, restored)
            .await?;

        self.audit_success(
            &mut aggregate,
            user_id,
            FileOperation::Write,
            json!({ "restored": true }),
        )
        .await;
        self.store.save(&mut aggregate).await
    }

    pub async fn update_tags(
        &self,
        file_id: Uuid,
        user_id: Uuid,
        tags: Vec<String>,
    ) -> AppResult<FileMetadata> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Write)
            .await?;

        let updated = aggregate.update_tags(tags);
        self.audited(&mut aggregate, user_id, FileOperation::Write, updated)
            .await?;
        self.store.save(&mut aggregate).await?;
        Ok(aggregate.metadata().clone())
    }

    /// Completion callback for processing workers.
    pub async fn update_processing_status(
        &self,
        file_id: Uuid,
        status: ProcessingStatus,
    ) -> AppResult<FileMetadata> {
        let mut aggregate = self.store.load(file_id).await?;
        aggregate.update_processing_status(status)?;
        self.store.save(&mut aggregate).await?;
        tracing::info!(file_id = %file_id, status = %status, "Processing status updated");
        Ok(aggregate.metadata().clone())
    }

    pub async fn queue_processing(
        &self,
        file_id: Uuid,
        user_id: Uuid,
        options: ProcessingOptions,
    ) -> AppResult<QueuedProcessing> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Write)
            .await?;
        self.orchestrator.queue_processing(file_id, options).await
    }

    /// Re-scan stored content; infected objects are moved to quarantine.
    pub async fn rescan(&self, file_id: Uuid, user_id: Uuid) -> AppResult<VirusScanResult> {
        let mut aggregate = self.store.load(file_id).await?;
        self.authorize(&mut aggregate, user_id, FileOperation::Write)
            .await?;

        let key = aggregate.metadata().storage_key.clone();
        let data = self.gateway.download(&key).await;
        let data = self
            .audited(&mut aggregate, user_id, FileOperation::Write, data)
            .await?;
        let result = self.engine.scan(&data).await?;

        if result.is_infected() {
            let quarantine_key = self.quarantine.quarantine_object(&key).await?;
            tracing::warn!(
                file_id = %file_id,
                quarantine_key = %quarantine_key,
                threats = ?result.threats,
                "Stored file failed rescan"
            );
        }
        aggregate.mark_scan_status(scan_status(Some(&result)));
        self.store.save(&mut aggregate).await?;
        Ok(result)
    }
}
