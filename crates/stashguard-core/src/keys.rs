//! Storage key layout.
//!
//! Originals live at `files/{owner_id}/{yyyy}/{mm}/{file_id}.{ext}`. Later
//! versions sit beside them under `versions/{n}/`, and quarantined objects are
//! moved under a configurable prefix with their original key preserved.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const FILES_PREFIX: &str = "files";

/// Generate the storage key for a newly uploaded file.
pub fn generate_storage_key(
    owner_id: Uuid,
    file_id: Uuid,
    extension: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let base = format!(
        "{}/{}/{:04}/{:02}/{}",
        FILES_PREFIX,
        owner_id,
        now.year(),
        now.month(),
        file_id
    );
    match extension.map(sanitize_extension).filter(|e| !e.is_empty()) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

/// `files/o/2024/05/id.png` with n=3 becomes `files/o/2024/05/versions/3/id.png`.
pub fn version_storage_key(storage_key: &str, version_number: u32) -> String {
    match storage_key.rsplit_once('/') {
        Some((dir, name)) => format!("{}/versions/{}/{}", dir, version_number, name),
        None => format!("versions/{}/{}", version_number, storage_key),
    }
}

pub fn quarantine_key(prefix: &str, storage_key: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        storage_key.trim_start_matches('/')
    )
}

/// Inverse of [`quarantine_key`].
pub fn strip_quarantine_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// Reject keys that could escape the bucket root or a local storage directory.
pub fn validate_key(key: &str) -> AppResult<()> {
    if key.is_empty() {
        return Err(AppError::Validation("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(AppError::Validation(format!(
            "Invalid storage key: {}",
            key
        )));
    }
    if key.contains('\0') {
        return Err(AppError::Validation(
            "Storage key contains a null byte".to_string(),
        ));
    }
    Ok(())
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generate_storage_key_layout() {
        let owner = Uuid::nil();
        let file = Uuid::from_u128(7);
        let key = generate_storage_key(owner, file, Some("PNG"), fixed_now());
        assert_eq!(key, format!("files/{}/2024/05/{}.png", owner, file));
    }

    #[test]
    fn test_generate_storage_key_strips_hostile_extension() {
        let key = generate_storage_key(Uuid::nil(), Uuid::nil(), Some("../sh"), fixed_now());
        assert!(key.ends_with(".sh"));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_version_storage_key() {
        assert_eq!(
            version_storage_key("files/o/2024/05/id.png", 3),
            "files/o/2024/05/versions/3/id.png"
        );
        assert_eq!(version_storage_key("flat.bin", 2), "versions/2/flat.bin");
    }

    #[test]
    fn test_quarantine_key_roundtrip() {
        let key = quarantine_key("quarantine/", "files/o/a.exe");
        assert_eq!(key, "quarantine/files/o/a.exe");
        assert_eq!(strip_quarantine_prefix("quarantine", &key), Some("files/o/a.exe"));
        assert_eq!(strip_quarantine_prefix("quarantine", "files/o/a.exe"), None);
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("files/../../etc").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("files/a..b/c").is_ok());
    }
}
