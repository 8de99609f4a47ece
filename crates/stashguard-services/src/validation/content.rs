//! Content checks on the uploaded bytes themselves.
//!
//! The declared content type is compared against the magic number actually
//! present, text payloads must look like text, and SVG must not carry script.

use super::format::normalize_content_type;

const TEXT_WINDOW: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("Declared {declared} but content looks like {detected}")]
    SignatureMismatch {
        declared: String,
        detected: &'static str,
    },

    #[error("Declared {declared} but content lacks its file signature")]
    MissingSignature { declared: String },

    #[error("Executable content declared as {declared}")]
    DisguisedExecutable { declared: String },

    #[error("Binary data in {declared} payload")]
    BinaryInText { declared: String },

    #[error("Active content (script) embedded in {declared}")]
    ActiveContent { declared: String },
}

/// Identify well-known formats by their leading bytes.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"ID3", "audio/mpeg"),
        (b"fLaC", "audio/flac"),
        (b"OggS", "audio/ogg"),
        (b"\x1a\x45\xdf\xa3", "video/webm"),
        (b"MZ", "application/x-msdownload"),
        (b"\x7fELF", "application/x-elf"),
        (b"\xfe\xed\xfa\xce", "application/x-mach-binary"),
        (b"\xfe\xed\xfa\xcf", "application/x-mach-binary"),
        (b"\xce\xfa\xed\xfe", "application/x-mach-binary"),
        (b"\xcf\xfa\xed\xfe", "application/x-mach-binary"),
    ];

    if data.len() >= 12 && &data[..4] == b"RIFF" {
        return match &data[8..12] {
            b"WEBP" => Some("image/webp"),
            b"WAVE" => Some("audio/wav"),
            b"AVI " => Some("video/x-msvideo"),
            _ => None,
        };
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }

    MAGIC
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn is_executable(mime: &str) -> bool {
    matches!(
        mime,
        "application/x-msdownload" | "application/x-elf" | "application/x-mach-binary"
    )
}

/// Declared types whose content must begin with a known signature.
fn requires_signature(declared: &str) -> bool {
    matches!(
        declared,
        "image/jpeg" | "image/png" | "image/gif" | "image/webp" | "application/pdf"
    )
}

/// Formats that share a container and may legitimately sniff as each other.
fn compatible(declared: &str, detected: &str) -> bool {
    if declared == detected {
        return true;
    }
    match detected {
        // OOXML documents, jars, epubs...
        "application/zip" => {
            declared.starts_with("application/vnd.openxmlformats")
                || declared == "application/x-zip-compressed"
                || declared == "application/epub+zip"
        }
        "video/mp4" => matches!(
            declared,
            "video/quicktime" | "audio/mp4" | "audio/x-m4a" | "video/x-m4v" | "image/avif"
        ),
        "audio/ogg" => declared == "application/ogg",
        "audio/wav" => matches!(declared, "audio/wave" | "audio/x-wav"),
        "application/gzip" => declared == "application/x-gzip",
        "video/webm" => declared == "video/x-matroska" || declared == "audio/webm",
        _ => false,
    }
}

fn is_textual(declared: &str) -> bool {
    declared.starts_with("text/")
        || matches!(
            declared,
            "application/json" | "application/xml" | "image/svg+xml"
        )
}

#[derive(Debug, Clone, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, content_type: &str, data: &[u8]) -> Vec<ContentError> {
        let declared = normalize_content_type(content_type);
        let mut errors = Vec::new();
        if data.is_empty() {
            return errors;
        }

        match sniff(data) {
            Some(detected) if is_executable(detected) && !is_executable(&declared) => {
                errors.push(ContentError::DisguisedExecutable {
                    declared: declared.clone(),
                });
            }
            Some(detected) if !compatible(&declared, detected) && !is_textual(&declared) => {
                errors.push(ContentError::SignatureMismatch {
                    declared: declared.clone(),
                    detected,
                });
            }
            None if requires_signature(&declared) => {
                errors.push(ContentError::MissingSignature {
                    declared: declared.clone(),
                });
            }
            _ => {}
        }

        if is_textual(&declared) {
            let window = &data[..data.len().min(TEXT_WINDOW)];
            if !looks_like_text(window) {
                errors.push(ContentError::BinaryInText {
                    declared: declared.clone(),
                });
            }
            if declared == "image/svg+xml" && has_script(window) {
                errors.push(ContentError::ActiveContent { declared });
            }
        }

        errors
    }
}

fn looks_like_text(window: &[u8]) -> bool {
    if window.contains(&0) {
        return false;
    }
    match std::str::from_utf8(window) {
        Ok(_) => true,
        // A multi-byte character cut at the window edge is still text
        Err(e) => e.error_len().is_none(),
    }
}

fn has_script(window: &[u8]) -> bool {
    let lowered = window.to_ascii_lowercase();
    [b"<script".as_slice(), b"javascript:", b" onload=", b" onerror="]
        .iter()
        .any(|needle| lowered.windows(needle.len()).any(|w| w == *needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(JPEG), Some("image/jpeg"));
        assert_eq!(sniff(PNG), Some("image/png"));
        assert_eq!(sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff(b"\x00\x00\x00\x18ftypmp42"), Some("video/mp4"));
        assert_eq!(sniff(b"hello"), None);
    }

    #[test]
    fn test_matching_content_passes() {
        let v = ContentValidator::new();
        assert!(v.validate("image/jpeg", JPEG).is_empty());
        assert!(v.validate("text/plain; charset=utf-8", "héllo".as_bytes()).is_empty());
        assert!(v
            .validate(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                b"PK\x03\x04rest"
            )
            .is_empty());
    }

    #[test]
    fn test_mismatched_signature() {
        let errors = ContentValidator::new().validate("image/jpeg", PNG);
        assert_eq!(
            errors,
            vec![ContentError::SignatureMismatch {
                declared: "image/jpeg".to_string(),
                detected: "image/png",
            }]
        );
    }

    #[test]
    fn test_missing_signature() {
        let errors = ContentValidator::new().validate("image/png", b"not really a png");
        assert!(matches!(errors[0], ContentError::MissingSignature { .. }));
    }

    #[test]
    fn test_disguised_executable() {
        let errors = ContentValidator::new().validate("image/jpeg", b"MZ\x90\x00\x03\x00");
        assert!(matches!(errors[0], ContentError::DisguisedExecutable { .. }));
        let errors = ContentValidator::new().validate("text/plain", b"\x7fELF\x02\x01\x01\x00");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ContentError::DisguisedExecutable { .. })));
    }

    #[test]
    fn test_binary_in_text() {
        let errors = ContentValidator::new().validate("text/csv", b"a,b\x00c");
        assert_eq!(
            errors,
            vec![ContentError::BinaryInText {
                declared: "text/csv".to_string()
            }]
        );
    }

    #[test]
    fn test_svg_with_script() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"><SCRIPT>alert(1)</SCRIPT></svg>";
        let errors = ContentValidator::new().validate("image/svg+xml", svg);
        assert_eq!(
            errors,
            vec![ContentError::ActiveContent {
                declared: "image/svg+xml".to_string()
            }]
        );
    }
}
