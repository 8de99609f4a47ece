//! Stashguard Storage Library
//!
//! Object storage for stored uploads: the [`ObjectBackend`] trait with S3 and
//! local filesystem implementations, and the [`ObjectStorageGateway`] that
//! adds retries, multipart routing and presign bookkeeping on top.
//!
//! # Storage key format
//!
//! Keys are owner-scoped: `files/{owner_id}/{yyyy}/{mm}/{file_id}.{ext}`.
//! Quarantined objects live under the configured quarantine prefix with the
//! original key appended. Keys must not contain `..` or a leading `/`; key
//! generation lives in `stashguard_core::keys` so every backend agrees.

pub mod factory;
pub mod gateway;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

pub use factory::{create_backend, create_gateway};
pub use gateway::{GatewaySettings, MultipartUpload, ObjectStorageGateway, StoredObject};
#[cfg(feature = "storage-local")]
pub use local::LocalBackend;
pub use retry::RetryPolicy;
#[cfg(feature = "storage-s3")]
pub use s3::S3Backend;
pub use stashguard_core::StorageBackend;
pub use traits::{
    CompletedPart, ObjectBackend, ObjectInfo, ObjectMeta, PutResult, StorageError, StorageResult,
};
