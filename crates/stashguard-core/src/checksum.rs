//! Content digests recorded on every file and version.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub md5: String,
    pub sha256: String,
}

impl Checksums {
    pub fn is_complete(&self) -> bool {
        !self.md5.is_empty() && !self.sha256.is_empty()
    }
}

/// Lowercase hex MD5 and SHA-256 of `data`.
pub fn compute_checksums(data: &[u8]) -> Checksums {
    Checksums {
        md5: hex::encode(Md5::digest(data)),
        sha256: sha256_hex(data),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let sums = compute_checksums(b"abc");
        assert_eq!(sums.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sums.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sums.is_complete());
    }

    #[test]
    fn test_empty_input_still_has_digests() {
        let sums = compute_checksums(&[]);
        assert_eq!(sums.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(sums.is_complete());
    }
}
