//! HMAC signatures for presigned URLs served by the local backend.
//!
//! Signature = base64url(HMAC-SHA256(secret, "{METHOD}\n{key}\n{expires_unix}")).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stashguard_core::models::PresignOperation;

use crate::traits::{StorageError, StorageResult};

fn mac_for(
    secret: &[u8],
    operation: PresignOperation,
    key: &str,
    expires_at: i64,
) -> StorageResult<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| StorageError::ConfigError(format!("Invalid presign secret: {}", e)))?;
    mac.update(operation.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(key.as_bytes());
    mac.update(b"\n");
    mac.update(expires_at.to_string().as_bytes());
    Ok(mac)
}

pub fn sign(
    secret: &[u8],
    operation: PresignOperation,
    key: &str,
    expires_at: i64,
) -> StorageResult<String> {
    let tag = mac_for(secret, operation, key, expires_at)?
        .finalize()
        .into_bytes();
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag))
}

/// Check a signature produced by [`sign`] and that `now_unix` is not past expiry.
pub fn verify_presigned_token(
    secret: &[u8],
    operation: PresignOperation,
    key: &str,
    expires_at: i64,
    signature: &str,
    now_unix: i64,
) -> bool {
    if now_unix > expires_at {
        return false;
    }
    let Ok(tag) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    match mac_for(secret, operation, key, expires_at) {
        Ok(mac) => mac.verify_slice(&tag).is_ok(),
        Err(_) => false,
    }
}
