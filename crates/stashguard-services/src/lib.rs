//! Stashguard Services Layer
//!
//! The secure upload pipeline on top of `stashguard-core` and
//! `stashguard-storage`: virus scanning, validation, quarantine, processing
//! orchestration, and the [`FileService`] use cases that tie them together.
//! Collaborators (repository, queue, audit, rate limits) come in as trait
//! objects so the same services run against production or in-memory backends.

pub mod file_service;
pub mod orchestrator;
pub mod quarantine;
pub mod scanner;
pub mod store;
pub mod validation;

pub use file_service::{FileService, FileServiceDeps, UploadOutcome};
pub use orchestrator::{estimated_duration, priority_score, ProcessingOrchestrator};
pub use quarantine::QuarantineService;
#[cfg(feature = "clamav")]
pub use scanner::clamav::ClamAvDetector;
pub use scanner::{
    Detection, DetectorError, SignatureDetector, ThreatDetector, VirusScanEngine,
    EICAR_TEST_STRING,
};
pub use store::AggregateStore;
pub use validation::SecurityValidationPipeline;
