//! Virus scanning
//!
//! [`VirusScanEngine`] owns the scan protocol: the enable switch, the size
//! ceiling, a per-attempt timeout and retries with `2^attempt` second backoff.
//! The actual inspection is delegated to a [`ThreatDetector`] (built-in
//! signatures, or ClamAV behind the `clamav` feature).
//!
//! Infected, clean, timed-out and failed scans are all reported as a
//! [`VirusScanResult`]; only an empty buffer is an error.

#[cfg(feature = "clamav")]
pub mod clamav;
pub mod signatures;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use stashguard_core::checksum::sha256_hex;
use stashguard_core::models::{ScanOutcome, ThreatType, VirusScanResult};
use stashguard_core::{AppError, AppResult, ScanBackendKind, ScanConfig};
use uuid::Uuid;

pub use signatures::{SignatureDetector, EICAR_TEST_STRING};

pub const DISABLED_SCANNER_VERSION: &str = "disabled";
pub const SCAN_TIMEOUT_THREAT: &str = "SCAN_TIMEOUT";
pub const SCAN_ERROR_THREAT: &str = "SCAN_ERROR";

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Scanner unavailable: {0}")]
    Unavailable(String),

    #[error("Scan failed: {0}")]
    Failed(String),
}

/// Names of the threats found in one inspection; empty means clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub threats: Vec<String>,
}

impl Detection {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.threats.is_empty()
    }
}

#[async_trait]
pub trait ThreatDetector: Send + Sync {
    async fn inspect(&self, data: Bytes) -> Result<Detection, DetectorError>;

    fn version(&self) -> String;
}

pub struct VirusScanEngine {
    config: ScanConfig,
    detector: Arc<dyn ThreatDetector>,
}

impl VirusScanEngine {
    pub fn new(config: ScanConfig, detector: Arc<dyn ThreatDetector>) -> Self {
        Self { config, detector }
    }

    /// Build the engine with the detector selected in `config.backend`.
    pub fn from_config(config: ScanConfig) -> AppResult<Self> {
        let detector: Arc<dyn ThreatDetector> = match config.backend {
            ScanBackendKind::Signature => Arc::new(SignatureDetector::new()),
            #[cfg(feature = "clamav")]
            ScanBackendKind::ClamAv => Arc::new(clamav::ClamAvDetector::new(
                config.clamav_host.clone(),
                config.clamav_port,
            )),
            #[cfg(not(feature = "clamav"))]
            ScanBackendKind::ClamAv => {
                return Err(AppError::Internal(
                    "ClamAV scan backend not available (clamav feature not enabled)".to_string(),
                ))
            }
        };
        Ok(Self::new(config, detector))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn scanner_version(&self) -> String {
        self.detector.version()
    }

    pub async fn scan(&self, data: &Bytes) -> AppResult<VirusScanResult> {
        let scan_id = Uuid::new_v4();

        if !self.config.enabled {
            return Ok(VirusScanResult {
                clean: true,
                threats: Vec::new(),
                scan_id,
                file_hash: sha256_hex(data),
                scan_date: Utc::now(),
                scan_duration_ms: 0,
                scanner_version: DISABLED_SCANNER_VERSION.to_string(),
                attempt: 0,
                outcome: ScanOutcome::Disabled,
                skip_reason: None,
            });
        }

        if data.is_empty() {
            return Err(AppError::Validation("Cannot scan an empty buffer".to_string()));
        }

        let file_hash = sha256_hex(data);
        if data.len() as u64 > self.config.max_file_size {
            tracing::warn!(
                scan_id = %scan_id,
                size_bytes = data.len(),
                max_bytes = self.config.max_file_size,
                "Buffer exceeds scan ceiling, skipping virus scan"
            );
            return Ok(VirusScanResult {
                clean: true,
                threats: Vec::new(),
                scan_id,
                file_hash,
                scan_date: Utc::now(),
                scan_duration_ms: 0,
                scanner_version: self.detector.version(),
                attempt: 0,
                outcome: ScanOutcome::Skipped,
                skip_reason: Some(ThreatType::FileTooLarge),
            });
        }

        Ok(self.scan_with_retries(data, scan_id, file_hash).await)
    }

    async fn scan_with_retries(&self, data: &Bytes, scan_id: Uuid, file_hash: String) -> VirusScanResult {
        let start = Instant::now();
        let max_attempts = self.config.retries.saturating_add(1);
        let version = self.detector.version();

        let result = |clean: bool, threats: Vec<String>, attempt: u32, outcome: ScanOutcome| {
            VirusScanResult {
                clean,
                threats,
                scan_id,
                file_hash: file_hash.clone(),
                scan_date: Utc::now(),
                scan_duration_ms: start.elapsed().as_millis() as u64,
                scanner_version: version.clone(),
                attempt,
                outcome,
                skip_reason: None,
            }
        };

        for attempt in 1..=max_attempts {
            // The losing inspection future is dropped, which cancels it at its next await.
            match tokio::time::timeout(self.config.timeout, self.detector.inspect(data.clone()))
                .await
            {
                Err(_) => {
                    tracing::error!(
                        scan_id = %scan_id,
                        attempt = attempt,
                        timeout_secs = self.config.timeout.as_secs(),
                        "Virus scan timed out"
                    );
                    return result(
                        false,
                        vec![SCAN_TIMEOUT_THREAT.to_string()],
                        attempt,
                        ScanOutcome::Timeout,
                    );
                }
                Ok(Ok(detection)) => {
                    let clean = detection.is_clean();
                    if clean {
                        tracing::info!(
                            scan_id = %scan_id,
                            attempt = attempt,
                            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                            "File scan completed: clean"
                        );
                    } else {
                        tracing::warn!(
                            scan_id = %scan_id,
                            attempt = attempt,
                            threats = ?detection.threats,
                            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                            "File scan detected threats"
                        );
                    }
                    return result(clean, detection.threats, attempt, ScanOutcome::Completed);
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        scan_id = %scan_id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Virus scan attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff_after(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            scan_id = %scan_id,
            attempts = max_attempts,
            "Virus scan failed after all attempts"
        );
        result(
            false,
            vec![SCAN_ERROR_THREAT.to_string()],
            max_attempts,
            ScanOutcome::Error,
        )
    }

    /// Scan the EICAR test string; a working detector must flag it.
    ///
    /// Runs regardless of the enable switch so a disabled engine can still be probed.
    pub async fn health_check(&self) -> bool {
        let probe = Bytes::from_static(EICAR_TEST_STRING.as_bytes());
        let result = self
            .scan_with_retries(&probe, Uuid::new_v4(), sha256_hex(&probe))
            .await;
        let healthy = result.outcome == ScanOutcome::Completed && !result.clean;
        if !healthy {
            tracing::error!(
                outcome = ?result.outcome,
                scanner = %result.scanner_version,
                "Virus scanner health check failed"
            );
        }
        healthy
    }
}

fn backoff_after(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedDetector {
        calls: AtomicU32,
        failures_before_success: u32,
        delay: Option<Duration>,
    }

    impl ScriptedDetector {
        fn failing(n: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures_before_success: n,
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
                delay: Some(delay),
            })
        }
    }

    #[async_trait]
    impl ThreatDetector for ScriptedDetector {
        async fn inspect(&self, _data: Bytes) -> Result<Detection, DetectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if call <= self.failures_before_success {
                return Err(DetectorError::Unavailable("connection refused".to_string()));
            }
            Ok(Detection::clean())
        }

        fn version(&self) -> String {
            "scripted-1".to_string()
        }
    }

    fn config() -> ScanConfig {
        ScanConfig {
            enabled: true,
            timeout: Duration::from_secs(30),
            retries: 3,
            max_file_size: 1024,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_engine_reports_clean() {
        let detector = ScriptedDetector::failing(100);
        let engine = VirusScanEngine::new(
            ScanConfig {
                enabled: false,
                ..config()
            },
            detector.clone(),
        );

        for data in [Bytes::new(), Bytes::from_static(EICAR_TEST_STRING.as_bytes())] {
            let result = engine.scan(&data).await.unwrap();
            assert!(result.clean);
            assert_eq!(result.scanner_version, DISABLED_SCANNER_VERSION);
            assert_eq!(result.scan_duration_ms, 0);
            assert_eq!(result.outcome, ScanOutcome::Disabled);
        }
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_buffer_is_rejected() {
        let engine = VirusScanEngine::new(config(), Arc::new(SignatureDetector::new()));
        let err = engine.scan(&Bytes::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_oversized_buffer_is_skipped() {
        let detector = ScriptedDetector::failing(0);
        let engine = VirusScanEngine::new(config(), detector.clone());

        let result = engine.scan(&Bytes::from(vec![0u8; 1025])).await.unwrap();
        assert!(result.clean);
        assert_eq!(result.outcome, ScanOutcome::Skipped);
        assert_eq!(result.skip_reason, Some(ThreatType::FileTooLarge));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_eicar_is_detected() {
        let engine = VirusScanEngine::new(config(), Arc::new(SignatureDetector::new()));
        let result = engine
            .scan(&Bytes::from_static(EICAR_TEST_STRING.as_bytes()))
            .await
            .unwrap();

        assert!(!result.clean);
        assert!(result.is_infected());
        assert!(!result.threats.is_empty());
        assert_eq!(result.attempt, 1);
        assert_eq!(result.file_hash, sha256_hex(EICAR_TEST_STRING.as_bytes()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let detector = ScriptedDetector::slow(Duration::from_secs(120));
        let engine = VirusScanEngine::new(config(), detector.clone());

        let result = engine.scan(&Bytes::from_static(b"payload")).await.unwrap();

        assert_eq!(result.outcome, ScanOutcome::Timeout);
        assert!(!result.clean);
        assert_eq!(result.threats, vec![SCAN_TIMEOUT_THREAT.to_string()]);
        assert_eq!(result.attempt, 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_then_succeed() {
        let detector = ScriptedDetector::failing(2);
        let engine = VirusScanEngine::new(config(), detector.clone());
        let started = tokio::time::Instant::now();

        let result = engine.scan(&Bytes::from_static(b"payload")).await.unwrap();

        assert!(result.clean);
        assert_eq!(result.attempt, 3);
        // 2s after attempt 1, 4s after attempt 2
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_error_result() {
        let detector = ScriptedDetector::failing(100);
        let engine = VirusScanEngine::new(
            ScanConfig {
                retries: 2,
                ..config()
            },
            detector.clone(),
        );

        let result = engine.scan(&Bytes::from_static(b"payload")).await.unwrap();

        assert_eq!(result.outcome, ScanOutcome::Error);
        assert!(!result.clean);
        assert_eq!(result.threats, vec![SCAN_ERROR_THREAT.to_string()]);
        assert_eq!(result.attempt, 3);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_health_check() {
        let engine = VirusScanEngine::new(
            ScanConfig {
                enabled: false,
                ..config()
            },
            Arc::new(SignatureDetector::new()),
        );
        assert!(engine.health_check().await);

        let blind = VirusScanEngine::new(config(), ScriptedDetector::failing(0));
        assert!(!blind.health_check().await);
    }
}
