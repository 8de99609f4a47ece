#[cfg(feature = "storage-local")]
use crate::local::LocalBackend;
#[cfg(feature = "storage-s3")]
use crate::s3::S3Backend;
use crate::gateway::{GatewaySettings, ObjectStorageGateway};
use crate::traits::{ObjectBackend, StorageError, StorageResult};
use crate::StorageBackend;
use stashguard_core::StorageConfig;
use std::sync::Arc;

#[cfg(feature = "storage-local")]
const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:3000/files";

/// Create a storage backend based on configuration
pub async fn create_backend(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectBackend>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let backend = S3Backend::new(bucket, region, config.endpoint.clone()).await?;
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config
                .local_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_BASE_URL.to_string());
            let secret = match &config.presign_secret {
                Some(secret) => secret.as_bytes().to_vec(),
                None => {
                    tracing::warn!(
                        "PRESIGN_SECRET not set; using an ephemeral secret, presigned URLs will not survive restarts"
                    );
                    uuid::Uuid::new_v4().as_bytes().to_vec()
                }
            };

            let backend = LocalBackend::new(base_path, base_url, secret).await?;
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

/// Backend plus retry/multipart policy from the same configuration.
pub async fn create_gateway(config: &StorageConfig) -> StorageResult<ObjectStorageGateway> {
    let backend = create_backend(config).await?;
    tracing::info!(
        backend = %backend.backend_type(),
        multipart_threshold = config.multipart_threshold,
        part_size = config.part_size,
        "Object storage gateway ready"
    );
    Ok(ObjectStorageGateway::new(
        backend,
        GatewaySettings::from(config),
    ))
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_gateway_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_path: Some(dir.path().to_string_lossy().into_owned()),
            presign_secret: Some("secret".to_string()),
            ..StorageConfig::default()
        };

        let gateway = create_gateway(&config).await.unwrap();
        assert_eq!(gateway.backend_type(), StorageBackend::Local);
        gateway.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_requires_path() {
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_path: None,
            ..StorageConfig::default()
        };
        let err = create_backend(&config).await.err().unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
