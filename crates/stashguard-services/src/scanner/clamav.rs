use async_trait::async_trait;
use bytes::Bytes;
use clamav_client::{clean, Tcp};
use std::str;
use std::time::Instant;

use super::{Detection, DetectorError, ThreatDetector};

/// ClamAV daemon detector. Timeouts and retries are applied by the engine.
#[derive(Clone)]
pub struct ClamAvDetector {
    host: String,
    port: u16,
}

impl ClamAvDetector {
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn virus_name(response: &[u8]) -> String {
    let response_str = str::from_utf8(response).map(str::trim).unwrap_or("unknown");
    if response_str.contains("FOUND") {
        response_str
            .split(':')
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string()
    } else {
        "unknown".to_string()
    }
}

#[async_trait]
impl ThreatDetector for ClamAvDetector {
    /// Uses the sync client inside spawn_blocking to avoid !Send tokio futures.
    async fn inspect(&self, data: Bytes) -> Result<Detection, DetectorError> {
        let start = Instant::now();
        let address = self.address();
        tracing::debug!(address = %address, "Starting ClamAV scan");

        let joined = tokio::task::spawn_blocking(move || {
            let connection = Tcp {
                host_address: address.as_str(),
            };
            let response = clamav_client::scan_buffer(data.as_ref(), connection, None)
                .map_err(|e| DetectorError::Unavailable(format!("ClamAV scan error: {}", e)))?;
            let is_clean = clean(&response).map_err(|e| {
                DetectorError::Failed(format!("Failed to parse ClamAV response: {}", e))
            })?;

            if is_clean {
                Ok(Detection::clean())
            } else {
                Ok(Detection {
                    threats: vec![virus_name(&response)],
                })
            }
        })
        .await;

        let detection = joined
            .map_err(|e| DetectorError::Failed(format!("ClamAV scan task join error: {}", e)))??;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis(),
            clean = detection.is_clean(),
            "ClamAV scan finished"
        );
        Ok(detection)
    }

    fn version(&self) -> String {
        format!("clamav@{}", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virus_name_parsing() {
        assert_eq!(
            virus_name(b"stream: Win.Test.EICAR_HDB-1 FOUND\0"),
            "Win.Test.EICAR_HDB-1"
        );
        assert_eq!(virus_name(b"stream: OK\0"), "unknown");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_an_error() {
        let detector = ClamAvDetector::new("127.0.0.1".to_string(), 1);
        let err = detector
            .inspect(Bytes::from_static(b"payload"))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::Unavailable(_)));
        assert_eq!(detector.version(), "clamav@127.0.0.1:1");
    }
}
