//! Stashguard Infrastructure Library
//!
//! In-process implementations of the collaborator traits defined in
//! `stashguard-core`, plus tracing setup shared by every binary:
//! - Telemetry initialization
//! - Rate limiting
//! - Audit logging
//! - File metadata repository
//! - IP intelligence

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "audit")]
pub mod audit;

#[cfg(feature = "repository")]
pub mod repository;

#[cfg(feature = "ip-intel")]
pub mod ip_intel;

// Re-export commonly used types
#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, LogFormat};

#[cfg(feature = "rate-limit")]
pub use rate_limit::InMemoryRateLimiter;

#[cfg(feature = "audit")]
pub use audit::{TracingAuditSink, AUDIT_TARGET};

#[cfg(feature = "repository")]
pub use repository::InMemoryFileRepository;

#[cfg(feature = "ip-intel")]
pub use ip_intel::StaticIpIntelligence;
