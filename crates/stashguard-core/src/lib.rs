//! Stashguard core
//!
//! Domain types shared by every crate in the workspace: configuration, the
//! unified error type, file models, the `FileAggregate`, and the collaborator
//! traits the pipeline is wired through.

pub mod aggregate;
pub mod checksum;
pub mod config;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod models;
pub mod repository;
pub mod storage_types;

pub use aggregate::{FileAggregate, NewFile};
pub use checksum::{compute_checksums, Checksums};
pub use config::{
    Config, ProcessingConfig, ScanBackendKind, ScanConfig, SecurityPolicy, StorageConfig,
};
pub use error::{AppError, AppResult, ErrorKind, ErrorMetadata, LogLevel};
pub use hooks::{
    AuditSink, EventSink, IpIntelligence, IpReputation, NoOpAuditSink, RateLimitBackend,
    RateLimitStatus, TaskQueue, ThreatLevel,
};
pub use repository::{FileFilters, FileRecord, FileRepository, StorageUsage};
pub use storage_types::StorageBackend;
