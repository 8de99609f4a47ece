use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use stashguard_core::models::PresignOperation;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::signing;
use crate::traits::{
    CompletedPart, ObjectBackend, ObjectInfo, ObjectMeta, PutResult, StorageError, StorageResult,
};
use crate::StorageBackend;

/// Staging area for multipart uploads, relative to the storage root.
const MULTIPART_DIR: &str = ".multipart";
const UPLOAD_KEY_FILE: &str = "key";

/// Local filesystem backend
///
/// Objects are plain files under `base_path`. Multipart parts are staged in
/// `.multipart/{upload_id}/` and concatenated in manifest order on completion.
#[derive(Clone)]
pub struct LocalBackend {
    base_path: PathBuf,
    base_url: String,
    presign_secret: Vec<u8>,
}

impl LocalBackend {
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g., "/var/lib/stashguard")
    /// * `base_url` - Base URL the files are served under (e.g., "http://localhost:3000/files")
    /// * `presign_secret` - HMAC key for presigned URLs
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        presign_secret: Vec<u8>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(base_path.join(MULTIPART_DIR))
            .await
            .map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    base_path.display(),
                    e
                ))
            })?;

        if presign_secret.is_empty() {
            return Err(StorageError::ConfigError(
                "Presign secret must not be empty".to_string(),
            ));
        }

        Ok(LocalBackend {
            base_path,
            base_url,
            presign_secret,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Check a presigned URL's query parameters against this backend's secret.
    pub fn verify_presigned(
        &self,
        operation: PresignOperation,
        key: &str,
        expires_at: i64,
        signature: &str,
    ) -> bool {
        signing::verify_presigned_token(
            &self.presign_secret,
            operation,
            key,
            expires_at,
            signature,
            Utc::now().timestamp(),
        )
    }

    /// Map a storage key to a path, refusing anything that could leave the root.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty() || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        let relative = Path::new(storage_key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        if relative.starts_with(MULTIPART_DIR) {
            return Err(StorageError::InvalidKey(format!(
                "{} uses a reserved prefix",
                storage_key
            )));
        }
        Ok(self.base_path.join(relative))
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    fn staging_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        Uuid::parse_str(upload_id)
            .map_err(|_| StorageError::UnknownUpload(upload_id.to_string()))?;
        Ok(self.base_path.join(MULTIPART_DIR).join(upload_id))
    }

    async fn open_staging(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let dir = self.staging_dir(upload_id)?;
        let recorded = match fs::read_to_string(dir.join(UPLOAD_KEY_FILE)).await {
            Ok(recorded) => recorded,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(StorageError::UnknownUpload(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if recorded != key {
            return Err(StorageError::MultipartFailed(format!(
                "Upload {} belongs to a different key",
                upload_id
            )));
        }
        Ok(dir)
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write to a hidden sibling first so readers never see a partial object.
    async fn write_atomic(&self, path: &Path, chunks: &[Bytes]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{}.tmp-{}", file_name, Uuid::new_v4()));

        let mut file = fs::File::create(&tmp).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", tmp.display(), e))
        })?;
        for chunk in chunks {
            file.write_all(chunk).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to write file {}: {}", tmp.display(), e))
            })?;
        }
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", tmp.display(), e))
        })?;
        drop(file);

        fs::rename(&tmp, path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to move file into place {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

fn not_found_or(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == IoErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::IoError(e)
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[async_trait]
impl ObjectBackend for LocalBackend {
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        _meta: &ObjectMeta,
    ) -> StorageResult<PutResult> {
        let path = self.key_to_path(key)?;
        let size = data.len();
        let start = std::time::Instant::now();
        let etag = md5_hex(&data);

        self.write_atomic(&path, &[data]).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(PutResult { etag: Some(etag) })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let data = fs::read(&path).await.map_err(|e| not_found_or(key, e))?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectInfo> {
        let path = self.key_to_path(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| not_found_or(key, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.len(),
            content_type: None,
            etag: None,
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ObjectInfo>> {
        let mut found = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                // Staging area and in-flight temp files start with '.'.
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(key) = self.path_to_key(&entry.path()) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                let meta = entry.metadata().await?;
                found.push(ObjectInfo {
                    key,
                    size: meta.len(),
                    content_type: None,
                    etag: None,
                    last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        found.truncate(limit);
        Ok(found)
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        _meta: &ObjectMeta,
    ) -> StorageResult<String> {
        self.key_to_path(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.staging_dir(&upload_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(UPLOAD_KEY_FILE), key.as_bytes()).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        if part_number == 0 {
            return Err(StorageError::MultipartFailed(
                "Part numbers start at 1".to_string(),
            ));
        }
        let dir = self.open_staging(key, upload_id).await?;
        let etag = md5_hex(&data);
        fs::write(dir.join(format!("{:05}.part", part_number)), &data).await?;

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutResult> {
        let path = self.key_to_path(key)?;
        let dir = self.open_staging(key, upload_id).await?;
        let start = std::time::Instant::now();

        if parts.is_empty() {
            return Err(StorageError::MultipartFailed(
                "Completion manifest is empty".to_string(),
            ));
        }

        let mut chunks = Vec::with_capacity(parts.len());
        let mut digests = Vec::with_capacity(parts.len() * 16);
        let mut previous = 0u32;
        for part in parts {
            if part.part_number <= previous {
                return Err(StorageError::MultipartFailed(format!(
                    "Parts must be in ascending order, got {} after {}",
                    part.part_number, previous
                )));
            }
            previous = part.part_number;

            let data = fs::read(dir.join(format!("{:05}.part", part.part_number)))
                .await
                .map_err(|e| {
                    StorageError::MultipartFailed(format!(
                        "Part {} unavailable: {}",
                        part.part_number, e
                    ))
                })?;
            let digest = Md5::digest(&data);
            if hex::encode(digest) != part.etag.trim_matches('"') {
                return Err(StorageError::MultipartFailed(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            digests.extend_from_slice(&digest);
            chunks.push(Bytes::from(data));
        }

        let size: usize = chunks.iter().map(Bytes::len).sum();
        self.write_atomic(&path, &chunks).await?;
        fs::remove_dir_all(&dir).await?;

        tracing::info!(
            key = %key,
            upload_id = %upload_id,
            parts = parts.len(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart upload completed"
        );

        Ok(PutResult {
            etag: Some(format!("{}-{}", md5_hex(&digests), parts.len())),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let dir = self.open_staging(key, upload_id).await?;
        fs::remove_dir_all(&dir).await?;
        tracing::info!(key = %key, upload_id = %upload_id, "Local multipart upload aborted");
        Ok(())
    }

    async fn copy_object(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let from = self.key_to_path(from_key)?;
        let to = self.key_to_path(to_key)?;
        let data = fs::read(&from).await.map_err(|e| not_found_or(from_key, e))?;
        self.write_atomic(&to, &[Bytes::from(data)]).await?;

        tracing::info!(from_key = %from_key, to_key = %to_key, "Local storage copy successful");
        Ok(())
    }

    async fn presign(
        &self,
        key: &str,
        operation: PresignOperation,
        expires_in: Duration,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.key_to_path(key)?;
        let expires_at = i64::try_from(expires_in.as_secs())
            .ok()
            .and_then(|ttl| Utc::now().timestamp().checked_add(ttl))
            .ok_or_else(|| {
                StorageError::InvalidExpiry(format!("{}s is out of range", expires_in.as_secs()))
            })?;
        let signature = signing::sign(&self.presign_secret, operation, key, expires_at)?;
        Ok(format!(
            "{}?method={}&expires={}&signature={}",
            self.generate_url(key),
            operation,
            expires_at,
            urlencoding::encode(&signature)
        ))
    }

    async fn ping(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.base_path).await?;
        if !meta.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "{} is not a directory",
                self.base_path.display()
            )));
        }
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn backend() -> (TempDir, LocalBackend) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(
            dir.path(),
            "http://localhost:3000/files".to_string(),
            b"test-secret".to_vec(),
        )
        .await
        .unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, backend) = backend().await;
        let meta = ObjectMeta::with_content_type("text/plain");

        backend
            .put_object("files/a/hello.txt", Bytes::from_static(b"hello"), &meta)
            .await
            .unwrap();
        let data = backend.get_object("files/a/hello.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");

        let info = backend.head_object("files/a/hello.txt").await.unwrap();
        assert_eq!(info.size, 5);

        backend.delete_object("files/a/hello.txt").await.unwrap();
        assert!(matches!(
            backend.get_object("files/a/hello.txt").await,
            Err(StorageError::NotFound(_))
        ));
        // deleting twice is fine
        backend.delete_object("files/a/hello.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_reserved_keys() {
        let (_dir, backend) = backend().await;
        for key in ["../escape", "/etc/passwd", "a/../../b", ".multipart/x"] {
            assert!(
                matches!(backend.get_object(key).await, Err(StorageError::InvalidKey(_))),
                "{} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_list_skips_staging_and_respects_limit() {
        let (_dir, backend) = backend().await;
        let meta = ObjectMeta::default();
        for key in ["files/b.txt", "files/a.txt", "other/c.txt"] {
            backend
                .put_object(key, Bytes::from_static(b"x"), &meta)
                .await
                .unwrap();
        }
        backend.create_multipart_upload("files/big.bin", &meta).await.unwrap();

        let listed = backend.list_objects("files/", 10).await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["files/a.txt", "files/b.txt"]);

        let limited = backend.list_objects("", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_manifest_order() {
        let (_dir, backend) = backend().await;
        let key = "files/big.bin";
        let upload_id = backend
            .create_multipart_upload(key, &ObjectMeta::default())
            .await
            .unwrap();

        let p2 = backend
            .upload_part(key, &upload_id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let p1 = backend
            .upload_part(key, &upload_id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();

        let result = backend
            .complete_multipart_upload(key, &upload_id, &[p1, p2])
            .await
            .unwrap();
        assert!(result.etag.unwrap().ends_with("-2"));
        assert_eq!(&backend.get_object(key).await.unwrap()[..], b"hello world");
        assert!(matches!(
            backend.abort_multipart_upload(key, &upload_id).await,
            Err(StorageError::UnknownUpload(_))
        ));
    }

    #[tokio::test]
    async fn test_multipart_rejects_unordered_or_mismatched_manifest() {
        let (_dir, backend) = backend().await;
        let key = "files/big.bin";
        let upload_id = backend
            .create_multipart_upload(key, &ObjectMeta::default())
            .await
            .unwrap();
        let p1 = backend
            .upload_part(key, &upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let p2 = backend
            .upload_part(key, &upload_id, 2, Bytes::from_static(b"b"))
            .await
            .unwrap();

        let err = backend
            .complete_multipart_upload(key, &upload_id, &[p2.clone(), p1.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MultipartFailed(_)));

        let forged = CompletedPart {
            part_number: 2,
            etag: "deadbeef".to_string(),
        };
        let err = backend
            .complete_multipart_upload(key, &upload_id, &[p1, forged])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MultipartFailed(_)));

        backend.abort_multipart_upload(key, &upload_id).await.unwrap();
        assert!(matches!(
            backend.head_object(key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_presigned_url_verifies() {
        let (_dir, backend) = backend().await;
        let url = backend
            .presign("files/a.png", PresignOperation::Get, Duration::from_secs(60), None)
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/files/files/a.png?method=GET&expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0i64;
        let mut signature = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "signature" => signature = urlencoding::decode(v).unwrap().into_owned(),
                _ => {}
            }
        }
        assert!(backend.verify_presigned(PresignOperation::Get, "files/a.png", expires, &signature));
        assert!(!backend.verify_presigned(PresignOperation::Put, "files/a.png", expires, &signature));
    }

    #[tokio::test]
    async fn test_presign_rejects_out_of_range_expiry() {
        let (_dir, backend) = backend().await;
        let err = backend
            .presign("files/a.png", PresignOperation::Get, Duration::from_secs(u64::MAX), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidExpiry(_)));
        assert!(!err.is_transient());
    }
}
