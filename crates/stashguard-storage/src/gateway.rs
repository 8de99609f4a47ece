//! Object storage gateway
//!
//! Wraps a single-attempt [`ObjectBackend`] with:
//! - bounded exponential retry on every backend call ([`crate::retry`])
//! - transparent multipart routing for large uploads, with a bounded number
//!   of parts in flight and a manifest assembled in part-number order
//! - multipart session tracking so callers address parts by upload id only
//! - presign bookkeeping (expiry timestamp, IP / user-agent restrictions)
//!
//! Retry-exhausted failures surface as `AppError::Storage` carrying the
//! operation name and key.

use std::collections::HashMap;
use std::future::Future;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use stashguard_core::keys::validate_key;
use stashguard_core::models::{PresignOptions, PresignedUrl};
use stashguard_core::{AppError, AppResult, StorageConfig};

use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{
    CompletedPart, ObjectBackend, ObjectInfo, ObjectMeta, StorageError, StorageResult,
};
use crate::StorageBackend;

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Uploads strictly larger than this go through multipart.
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub part_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for GatewaySettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            multipart_threshold: config.multipart_threshold,
            part_size: config.part_size.max(1),
            part_concurrency: config.part_concurrency.max(1),
            retry: RetryPolicy {
                max_attempts: config.retry_attempts.max(1),
                base_delay: config.retry_base_delay,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub multipart: bool,
    pub parts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub key: String,
}

#[derive(Debug, Default)]
struct SessionState {
    key: String,
    part_sizes: HashMap<u32, u64>,
}

pub struct ObjectStorageGateway {
    backend: Arc<dyn ObjectBackend>,
    settings: GatewaySettings,
    sessions: Mutex<HashMap<String, SessionState>>,
}

/// Split `len` bytes into consecutive ranges of at most `part_size`.
pub fn plan_parts(len: usize, part_size: usize) -> Vec<Range<usize>> {
    let part_size = part_size.max(1);
    (0..len)
        .step_by(part_size)
        .map(|start| start..(start + part_size).min(len))
        .collect()
}

fn map_storage_error(operation: &str, key: &str, err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(_) => AppError::NotFound(format!("Object not found: {}", key)),
        StorageError::InvalidKey(msg) => {
            AppError::Validation(format!("Invalid storage key: {}", msg))
        }
        StorageError::InvalidExpiry(msg) => {
            AppError::Validation(format!("Invalid presign expiry: {}", msg))
        }
        other => AppError::Storage {
            operation: operation.to_string(),
            key: key.to_string(),
            message: other.to_string(),
        },
    }
}

impl ObjectStorageGateway {
    pub fn new(backend: Arc<dyn ObjectBackend>, settings: GatewaySettings) -> Self {
        Self {
            backend,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_type(&self) -> StorageBackend {
        self.backend.backend_type()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn should_use_multipart(&self, len: u64) -> bool {
        len > self.settings.multipart_threshold
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, key: &str, op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        with_retry(&self.settings.retry, operation, key, op)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    operation = %operation,
                    key = %key,
                    "Storage operation failed"
                );
                map_storage_error(operation, key, e)
            })
    }

    fn sessions(&self) -> AppResult<MutexGuard<'_, HashMap<String, SessionState>>> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Internal("Multipart session table poisoned".to_string()))
    }

    fn session_key(&self, upload_id: &str) -> AppResult<String> {
        self.sessions()?
            .get(upload_id)
            .map(|s| s.key.clone())
            .ok_or_else(|| AppError::NotFound(format!("Unknown multipart upload: {}", upload_id)))
    }

    /// Store `data` at `key`, switching to multipart above the threshold.
    #[tracing::instrument(skip(self, data, meta), fields(key = %key, size_bytes = data.len()))]
    pub async fn upload(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> AppResult<StoredObject> {
        validate_key(key)?;
        let size = data.len() as u64;

        if self.should_use_multipart(size) {
            return self.upload_multipart(key, data, meta).await;
        }

        let result = self
            .retrying("upload", key, || self.backend.put_object(key, data.clone(), meta))
            .await?;

        Ok(StoredObject {
            key: key.to_string(),
            size,
            etag: result.etag,
            multipart: false,
            parts: 1,
        })
    }

    async fn upload_multipart(
        &self,
        key: &str,
        data: Bytes,
        meta: &ObjectMeta,
    ) -> AppResult<StoredObject> {
        let start = std::time::Instant::now();
        let session = self.initiate_multipart(key, meta).await?;
        let ranges = plan_parts(data.len(), self.settings.part_size as usize);

        let uploaded: AppResult<Vec<CompletedPart>> = futures::stream::iter(
            ranges.into_iter().enumerate(),
        )
        .map(|(index, range)| {
            let chunk = data.slice(range);
            let upload_id = session.upload_id.as_str();
            async move { self.upload_part(upload_id, index as u32 + 1, chunk).await }
        })
        .buffer_unordered(self.settings.part_concurrency)
        .try_collect()
        .await;

        let outcome = match uploaded {
            Ok(mut parts) => {
                parts.sort_by_key(|p| p.part_number);
                self.complete_multipart(&session.upload_id, parts).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(stored) => {
                tracing::info!(
                    key = %key,
                    parts = stored.parts,
                    size_bytes = stored.size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Multipart upload successful"
                );
                Ok(stored)
            }
            Err(e) => {
                if let Err(abort_err) = self.abort_multipart(&session.upload_id).await {
                    tracing::warn!(
                        error = %abort_err,
                        key = %key,
                        upload_id = %session.upload_id,
                        "Failed to abort multipart upload after error"
                    );
                }
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn download(&self, key: &str) -> AppResult<Bytes> {
        validate_key(key)?;
        self.retrying("download", key, || self.backend.get_object(key))
            .await
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        self.retrying("delete", key, || self.backend.delete_object(key))
            .await
    }

    pub async fn stat(&self, key: &str) -> AppResult<ObjectInfo> {
        validate_key(key)?;
        self.retrying("stat", key, || self.backend.head_object(key))
            .await
    }

    pub async fn list(&self, prefix: &str, limit: usize) -> AppResult<Vec<ObjectInfo>> {
        self.retrying("list", prefix, || self.backend.list_objects(prefix, limit))
            .await
    }

    pub async fn initiate_multipart(
        &self,
        key: &str,
        meta: &ObjectMeta,
    ) -> AppResult<MultipartUpload> {
        validate_key(key)?;
        let upload_id = self
            .retrying("initiate_multipart", key, || {
                self.backend.create_multipart_upload(key, meta)
            })
            .await?;

        self.sessions()?.insert(
            upload_id.clone(),
            SessionState {
                key: key.to_string(),
                part_sizes: HashMap::new(),
            },
        );

        tracing::debug!(key = %key, upload_id = %upload_id, "Multipart upload initiated");
        Ok(MultipartUpload {
            upload_id,
            key: key.to_string(),
        })
    }

    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> AppResult<CompletedPart> {
        if part_number == 0 {
            return Err(AppError::Validation("Part numbers start at 1".to_string()));
        }
        let key = self.session_key(upload_id)?;
        let size = data.len() as u64;

        let part = self
            .retrying("upload_part", &key, || {
                self.backend
                    .upload_part(&key, upload_id, part_number, data.clone())
            })
            .await?;

        if let Some(session) = self.sessions()?.get_mut(upload_id) {
            session.part_sizes.insert(part_number, size);
        }
        Ok(part)
    }

    /// `parts` must already be in ascending part-number order.
    pub async fn complete_multipart(
        &self,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> AppResult<StoredObject> {
        if parts.is_empty() {
            return Err(AppError::Validation(
                "Multipart manifest must contain at least one part".to_string(),
            ));
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(AppError::Validation(
                "Multipart manifest must be in ascending part-number order".to_string(),
            ));
        }

        let key = self.session_key(upload_id)?;
        let result = self
            .retrying("complete_multipart", &key, || {
                self.backend
                    .complete_multipart_upload(&key, upload_id, &parts)
            })
            .await?;

        let size = self
            .sessions()?
            .remove(upload_id)
            .map(|s| {
                parts
                    .iter()
                    .filter_map(|p| s.part_sizes.get(&p.part_number))
                    .sum()
            })
            .unwrap_or_default();

        Ok(StoredObject {
            key,
            size,
            etag: result.etag,
            multipart: true,
            parts: parts.len(),
        })
    }

    pub async fn abort_multipart(&self, upload_id: &str) -> AppResult<()> {
        let key = self.session_key(upload_id)?;
        self.retrying("abort_multipart", &key, || {
            self.backend.abort_multipart_upload(&key, upload_id)
        })
        .await?;
        self.sessions()?.remove(upload_id);
        Ok(())
    }

    pub async fn copy(&self, src_key: &str, dst_key: &str) -> AppResult<()> {
        validate_key(src_key)?;
        validate_key(dst_key)?;
        self.retrying("copy", src_key, || self.backend.copy_object(src_key, dst_key))
            .await
    }

    /// Issue a presigned URL. The requested expiry is used as given; one that
    /// cannot be represented as a timestamp is a validation error.
    pub async fn presign(&self, options: &PresignOptions) -> AppResult<PresignedUrl> {
        validate_key(&options.key)?;
        if options.expires_in_secs == 0 {
            return Err(AppError::Validation(
                "Presigned URL expiry must be positive".to_string(),
            ));
        }

        let issued_at = Utc::now();
        let expires_at = i64::try_from(options.expires_in_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Presigned URL expiry of {}s is out of range",
                    options.expires_in_secs
                ))
            })?;
        let expires_in = Duration::from_secs(options.expires_in_secs);
        let url = self
            .retrying("presign", &options.key, || {
                self.backend.presign(
                    &options.key,
                    options.operation,
                    expires_in,
                    options.content_type.as_deref(),
                )
            })
            .await?;

        Ok(PresignedUrl {
            url,
            key: options.key.clone(),
            operation: options.operation,
            expires_in_secs: options.expires_in_secs,
            expires_at,
            allowed_ips: options.allowed_ips.clone(),
            allowed_user_agents: options.allowed_user_agents.clone(),
        })
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.retrying("ping", "", || self.backend.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stashguard_core::models::PresignOperation;
    use stashguard_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MemoryBackend {
        objects: Mutex<HashMap<String, Bytes>>,
        parts: Mutex<HashMap<(String, u32), Bytes>>,
        manifests: Mutex<Vec<Vec<u32>>>,
        put_calls: AtomicU32,
        part_calls: AtomicU32,
        aborts: AtomicU32,
        fail_puts: AtomicU32,
        fail_part: Option<u32>,
    }

    impl MemoryBackend {
        fn failing_puts(n: u32) -> Self {
            let backend = Self::default();
            backend.fail_puts.store(n, Ordering::SeqCst);
            backend
        }
    }

    #[async_trait]
    impl ObjectBackend for MemoryBackend {
        async fn put_object(
            &self,
            key: &str,
            data: Bytes,
            _meta: &ObjectMeta,
        ) -> StorageResult<crate::traits::PutResult> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::UploadFailed("connection reset".to_string()));
            }
            self.objects.lock().unwrap().insert(key.to_string(), data);
            Ok(crate::traits::PutResult {
                etag: Some("etag".to_string()),
            })
        }

        async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        async fn delete_object(&self, key: &str) -> StorageResult<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn head_object(&self, key: &str) -> StorageResult<ObjectInfo> {
            let size = self.get_object(key).await?.len() as u64;
            Ok(ObjectInfo {
                key: key.to_string(),
                size,
                content_type: None,
                etag: None,
                last_modified: None,
            })
        }

        async fn list_objects(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ObjectInfo>> {
            let mut keys: Vec<_> = self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys.truncate(limit);
            Ok(keys
                .into_iter()
                .map(|key| ObjectInfo {
                    key,
                    size: 0,
                    content_type: None,
                    etag: None,
                    last_modified: None,
                })
                .collect())
        }

        async fn create_multipart_upload(
            &self,
            key: &str,
            _meta: &ObjectMeta,
        ) -> StorageResult<String> {
            Ok(format!("upload-{}", key))
        }

        async fn upload_part(
            &self,
            _key: &str,
            upload_id: &str,
            part_number: u32,
            data: Bytes,
        ) -> StorageResult<CompletedPart> {
            self.part_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_part == Some(part_number) {
                return Err(StorageError::MultipartFailed("part rejected".to_string()));
            }
            self.parts
                .lock()
                .unwrap()
                .insert((upload_id.to_string(), part_number), data);
            Ok(CompletedPart {
                part_number,
                etag: format!("etag-{}", part_number),
            })
        }

        async fn complete_multipart_upload(
            &self,
            key: &str,
            upload_id: &str,
            parts: &[CompletedPart],
        ) -> StorageResult<crate::traits::PutResult> {
            self.manifests
                .lock()
                .unwrap()
                .push(parts.iter().map(|p| p.part_number).collect());
            let stored = self.parts.lock().unwrap();
            let mut body = Vec::new();
            for part in parts {
                let chunk = stored
                    .get(&(upload_id.to_string(), part.part_number))
                    .ok_or_else(|| StorageError::MultipartFailed("missing part".to_string()))?;
                body.extend_from_slice(chunk);
            }
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), Bytes::from(body));
            Ok(crate::traits::PutResult {
                etag: Some(format!("final-{}", parts.len())),
            })
        }

        async fn abort_multipart_upload(&self, _key: &str, _upload_id: &str) -> StorageResult<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn copy_object(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
            let data = self.get_object(from_key).await?;
            self.objects.lock().unwrap().insert(to_key.to_string(), data);
            Ok(())
        }

        async fn presign(
            &self,
            key: &str,
            operation: PresignOperation,
            expires_in: Duration,
            _content_type: Option<&str>,
        ) -> StorageResult<String> {
            Ok(format!(
                "mem://{}?op={}&ttl={}",
                key,
                operation,
                expires_in.as_secs()
            ))
        }

        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    fn small_settings() -> GatewaySettings {
        GatewaySettings {
            multipart_threshold: 10,
            part_size: 4,
            part_concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
            },
        }
    }

    #[test]
    fn test_plan_parts() {
        assert_eq!(plan_parts(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(plan_parts(8, 4), vec![0..4, 4..8]);
        assert!(plan_parts(0, 4).is_empty());
    }

    #[test]
    fn test_default_routing_threshold() {
        let gateway = ObjectStorageGateway::new(
            Arc::new(MemoryBackend::default()),
            GatewaySettings::default(),
        );
        let hundred_mb = 100 * 1024 * 1024;
        assert!(!gateway.should_use_multipart(hundred_mb));
        assert!(gateway.should_use_multipart(hundred_mb + 1));
        assert_eq!(gateway.settings().part_size, 50 * 1024 * 1024);
        assert_eq!(gateway.settings().part_concurrency, 4);
    }

    #[tokio::test]
    async fn test_small_upload_is_single_shot() {
        let backend = Arc::new(MemoryBackend::default());
        let gateway = ObjectStorageGateway::new(backend.clone(), small_settings());

        let stored = gateway
            .upload("files/a.txt", Bytes::from_static(b"0123456789"), &ObjectMeta::default())
            .await
            .unwrap();

        assert!(!stored.multipart);
        assert_eq!(stored.size, 10);
        assert_eq!(backend.put_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.part_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_large_upload_goes_multipart_in_order() {
        let backend = Arc::new(MemoryBackend::default());
        let gateway = ObjectStorageGateway::new(backend.clone(), small_settings());
        let body = Bytes::from_static(b"abcdefghijk");

        let stored = gateway
            .upload("files/big.bin", body.clone(), &ObjectMeta::default())
            .await
            .unwrap();

        assert!(stored.multipart);
        assert_eq!(stored.parts, 3);
        assert_eq!(stored.size, 11);
        assert_eq!(backend.put_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.manifests.lock().unwrap()[0], vec![1, 2, 3]);
        assert_eq!(gateway.download("files/big.bin").await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_failed_part_aborts_session() {
        let backend = Arc::new(MemoryBackend {
            fail_part: Some(2),
            ..MemoryBackend::default()
        });
        let mut settings = small_settings();
        settings.retry.base_delay = Duration::from_millis(1);
        let gateway = ObjectStorageGateway::new(backend.clone(), settings);

        let err = gateway
            .upload("files/big.bin", Bytes::from_static(b"abcdefghijk"), &ObjectMeta::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert!(backend.manifests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(MemoryBackend::failing_puts(2));
        let gateway = ObjectStorageGateway::new(backend.clone(), small_settings());

        gateway
            .upload("files/a.txt", Bytes::from_static(b"x"), &ObjectMeta::default())
            .await
            .unwrap();
        assert_eq!(backend.put_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_carry_operation_and_key() {
        let backend = Arc::new(MemoryBackend::failing_puts(10));
        let gateway = ObjectStorageGateway::new(backend.clone(), small_settings());

        let err = gateway
            .upload("files/a.txt", Bytes::from_static(b"x"), &ObjectMeta::default())
            .await
            .unwrap_err();

        assert_eq!(backend.put_calls.load(Ordering::SeqCst), 3);
        match err {
            AppError::Storage {
                operation,
                key,
                message,
            } => {
                assert_eq!(operation, "upload");
                assert_eq!(key, "files/a.txt");
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manual_multipart_rejects_unordered_manifest() {
        let gateway =
            ObjectStorageGateway::new(Arc::new(MemoryBackend::default()), small_settings());
        let session = gateway
            .initiate_multipart("files/m.bin", &ObjectMeta::default())
            .await
            .unwrap();
        let p1 = gateway
            .upload_part(&session.upload_id, 1, Bytes::from_static(b"ab"))
            .await
            .unwrap();
        let p2 = gateway
            .upload_part(&session.upload_id, 2, Bytes::from_static(b"cd"))
            .await
            .unwrap();

        let err = gateway
            .complete_multipart(&session.upload_id, vec![p2.clone(), p1.clone()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let stored = gateway
            .complete_multipart(&session.upload_id, vec![p1, p2])
            .await
            .unwrap();
        assert_eq!(stored.size, 4);
        assert_eq!(gateway.download("files/m.bin").await.unwrap(), Bytes::from_static(b"abcd"));

        let err = gateway
            .upload_part(&session.upload_id, 3, Bytes::from_static(b"ef"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_presign_carries_restrictions_and_expiry() {
        let gateway =
            ObjectStorageGateway::new(Arc::new(MemoryBackend::default()), small_settings());
        let before = Utc::now();

        let presigned = gateway
            .presign(&PresignOptions {
                key: "files/a.png".to_string(),
                operation: PresignOperation::Get,
                expires_in_secs: 600,
                content_type: None,
                allowed_ips: vec!["10.0.0.1".to_string()],
                allowed_user_agents: vec!["curl/8".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(presigned.expires_in_secs, 600);
        assert!(presigned.expires_at >= before + chrono::Duration::seconds(600));
        assert!(presigned.expires_at <= Utc::now() + chrono::Duration::seconds(600));
        assert_eq!(presigned.allowed_ips, vec!["10.0.0.1".to_string()]);
        assert_eq!(presigned.allowed_user_agents, vec!["curl/8".to_string()]);
        assert!(presigned.url.contains("ttl=600"));
    }

    #[tokio::test]
    async fn test_presign_rejects_out_of_range_expiry() {
        let gateway =
            ObjectStorageGateway::new(Arc::new(MemoryBackend::default()), small_settings());

        for expires_in_secs in [1u64 << 62, u64::MAX] {
            let err = gateway
                .presign(&PresignOptions {
                    key: "files/a.png".to_string(),
                    operation: PresignOperation::Get,
                    expires_in_secs,
                    content_type: None,
                    allowed_ips: Vec::new(),
                    allowed_user_agents: Vec::new(),
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_not_found() {
        let gateway =
            ObjectStorageGateway::new(Arc::new(MemoryBackend::default()), small_settings());
        let err = gateway.download("files/none").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = gateway.download("../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
