//! Built-in signature detector.
//!
//! Looks for a fixed list of malicious byte strings in the first 8KB and for
//! executable magic numbers at offset 0. Threat names are derived from a
//! digest of the matched pattern, so the same pattern always yields the same
//! name.

use async_trait::async_trait;
use bytes::Bytes;
use stashguard_core::checksum::sha256_hex;

use super::{Detection, DetectorError, ThreatDetector};

/// The standard antivirus test file body.
pub const EICAR_TEST_STRING: &str =
    r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

pub const INSPECT_WINDOW: usize = 8 * 1024;

const CONTENT_SIGNATURES: &[&[u8]] = &[
    EICAR_TEST_STRING.as_bytes(),
    b"<script",
    b"javascript:",
    b"vbscript:",
    b"<?php",
    b"eval(base64_decode(",
    b"powershell -enc",
    b"powershell.exe -",
    b"cmd.exe /c",
    b"WScript.Shell",
];

const EXECUTABLE_MAGIC: &[&[u8]] = &[
    // PE / DOS
    b"MZ",
    // ELF
    b"\x7fELF",
    // Mach-O 32/64, both byte orders
    b"\xfe\xed\xfa\xce",
    b"\xfe\xed\xfa\xcf",
    b"\xce\xfa\xed\xfe",
    b"\xcf\xfa\xed\xfe",
];

#[derive(Debug, Clone, Default)]
pub struct SignatureDetector;

impl SignatureDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, data: &[u8]) -> Detection {
        let window = &data[..data.len().min(INSPECT_WINDOW)];
        let mut threats = Vec::new();

        for pattern in CONTENT_SIGNATURES {
            if contains(window, pattern) {
                threats.push(threat_name("Signature", pattern));
            }
        }

        if let Some(magic) = EXECUTABLE_MAGIC.iter().find(|m| data.starts_with(m)) {
            threats.push(threat_name("Executable", magic));
        }

        Detection { threats }
    }
}

#[async_trait]
impl ThreatDetector for SignatureDetector {
    async fn inspect(&self, data: Bytes) -> Result<Detection, DetectorError> {
        Ok(self.detect(&data))
    }

    fn version(&self) -> String {
        format!("stashguard-signatures/{}", env!("CARGO_PKG_VERSION"))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn threat_name(family: &str, pattern: &[u8]) -> String {
    let digest = sha256_hex(pattern);
    format!("{}.{}", family, &digest[..8])
}
