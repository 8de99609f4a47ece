//! Quarantine: isolating objects after a positive malware detection.
//!
//! Quarantined objects live under the configured prefix with the original key
//! appended, so they can be released back to where they came from. Every
//! failure is reported as `AppError::Quarantine`, never as a scan error.

use std::sync::Arc;

use bytes::Bytes;
use stashguard_core::keys::{quarantine_key, strip_quarantine_prefix};
use stashguard_core::{AppError, AppResult};
use stashguard_storage::{ObjectMeta, ObjectStorageGateway};

pub const QUARANTINE_METADATA_FLAG: &str = "quarantined";

pub struct QuarantineService {
    gateway: Arc<ObjectStorageGateway>,
    prefix: String,
}

impl QuarantineService {
    pub fn new(gateway: Arc<ObjectStorageGateway>, prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn quarantine_key_for(&self, storage_key: &str) -> String {
        quarantine_key(&self.prefix, storage_key)
    }

    pub fn is_quarantined(&self, key: &str) -> bool {
        strip_quarantine_prefix(&self.prefix, key).is_some()
    }

    fn error(storage_key: &str, action: &str, err: AppError) -> AppError {
        tracing::error!(
            error = %err,
            key = %storage_key,
            action = %action,
            "Quarantine operation failed"
        );
        AppError::Quarantine {
            file_id: storage_key.to_string(),
            message: format!("{} failed: {}", action, err),
        }
    }

    /// Write bytes that never reached normal storage straight into quarantine.
    pub async fn quarantine_bytes(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
        threats: &[String],
    ) -> AppResult<String> {
        let target = self.quarantine_key_for(storage_key);
        let mut meta = ObjectMeta::with_content_type(content_type);
        meta.metadata
            .insert(QUARANTINE_METADATA_FLAG.to_string(), "true".to_string());
        meta.metadata
            .insert("threats".to_string(), threats.join(","));

        self.gateway
            .upload(&target, data, &meta)
            .await
            .map_err(|e| Self::error(storage_key, "store", e))?;

        tracing::warn!(
            key = %storage_key,
            quarantine_key = %target,
            threats = ?threats,
            "File quarantined"
        );
        Ok(target)
    }

    /// Move an already stored object into quarantine (copy, then delete the original).
    pub async fn quarantine_object(&self, storage_key: &str) -> AppResult<String> {
        let target = self.quarantine_key_for(storage_key);
        self.gateway
            .copy(storage_key, &target)
            .await
            .map_err(|e| Self::error(storage_key, "copy", e))?;
        self.gateway
            .delete(storage_key)
            .await
            .map_err(|e| Self::error(storage_key, "delete original", e))?;

        tracing::warn!(
            key = %storage_key,
            quarantine_key = %target,
            "Stored object moved to quarantine"
        );
        Ok(target)
    }

    /// Move a quarantined object back to its original key.
    pub async fn release(&self, quarantined_key: &str) -> AppResult<String> {
        let original = strip_quarantine_prefix(&self.prefix, quarantined_key)
            .ok_or_else(|| {
                AppError::Validation(format!("{} is not a quarantined key", quarantined_key))
            })?
            .to_string();

        self.gateway
            .copy(quarantined_key, &original)
            .await
            .map_err(|e| Self::error(&original, "release copy", e))?;
        self.gateway
            .delete(quarantined_key)
            .await
            .map_err(|e| Self::error(&original, "release delete", e))?;

        tracing::info!(
            key = %original,
            quarantine_key = %quarantined_key,
            "Object released from quarantine"
        );
        Ok(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashguard_core::ErrorKind;
    use stashguard_storage::{GatewaySettings, LocalBackend};

    async fn service(dir: &tempfile::TempDir) -> QuarantineService {
        let backend = LocalBackend::new(
            dir.path(),
            "http://localhost/files".to_string(),
            b"secret".to_vec(),
        )
        .await
        .unwrap();
        let gateway = ObjectStorageGateway::new(Arc::new(backend), GatewaySettings::default());
        QuarantineService::new(Arc::new(gateway), "quarantine")
    }

    #[tokio::test]
    async fn test_quarantine_and_release_object() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let gateway = svc.gateway.clone();
        gateway
            .upload("files/o/a.bin", Bytes::from_static(b"bad"), &ObjectMeta::default())
            .await
            .unwrap();

        let q = svc.quarantine_object("files/o/a.bin").await.unwrap();
        assert_eq!(q, "quarantine/files/o/a.bin");
        assert!(svc.is_quarantined(&q));
        assert_eq!(
            gateway.download("files/o/a.bin").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let released = svc.release(&q).await.unwrap();
        assert_eq!(released, "files/o/a.bin");
        assert_eq!(
            gateway.download("files/o/a.bin").await.unwrap(),
            Bytes::from_static(b"bad")
        );
    }

    #[tokio::test]
    async fn test_quarantine_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;

        let q = svc
            .quarantine_bytes(
                "files/o/b.txt",
                Bytes::from_static(b"x"),
                "text/plain",
                &["Signature.deadbeef".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(svc.gateway.download(&q).await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_failures_are_quarantine_errors() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;

        let err = svc.quarantine_object("files/o/missing.bin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Quarantine);

        let err = svc.release("files/o/not-quarantined").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
