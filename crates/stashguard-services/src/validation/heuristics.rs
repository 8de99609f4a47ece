//! Behavioural heuristics: cheap name/type/size signals that add up to a risk score.

use stashguard_core::models::DocumentType;

use super::format::normalize_content_type;

pub const DANGEROUS_EXTENSIONS: &[&str] =
    &["exe", "scr", "bat", "cmd", "com", "pif", "js", "vbs", "ps1"];

pub const DANGEROUS_EXTENSION_SCORE: u32 = 50;
pub const DOUBLE_EXTENSION_SCORE: u32 = 30;
pub const SIZE_MISMATCH_SCORE: u32 = 25;

const MB: u64 = 1024 * 1024;
const MIN_IMAGE_BYTES: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicFinding {
    pub rule: &'static str,
    pub score: u32,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeuristicReport {
    pub risk_score: u32,
    pub findings: Vec<HeuristicFinding>,
}

impl HeuristicReport {
    fn add(&mut self, rule: &'static str, score: u32, detail: String) {
        self.risk_score += score;
        self.findings.push(HeuristicFinding {
            rule,
            score,
            detail,
        });
    }
}

pub struct BehavioralHeuristics {
    threshold: u32,
}

impl BehavioralHeuristics {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_suspicious(&self, report: &HeuristicReport) -> bool {
        report.risk_score >= self.threshold
    }

    pub fn analyze(&self, filename: &str, content_type: &str, size: u64) -> HeuristicReport {
        let mut report = HeuristicReport::default();
        let name = filename.trim().to_lowercase();
        // Leading dots mark hidden files, not extensions
        let segments: Vec<&str> = name.trim_start_matches('.').split('.').collect();

        if let Some(ext) = segments.last().filter(|_| segments.len() > 1) {
            if DANGEROUS_EXTENSIONS.contains(ext) {
                report.add(
                    "dangerous_extension",
                    DANGEROUS_EXTENSION_SCORE,
                    format!(".{} files can execute on the client", ext),
                );
            }
        }

        if segments.len() > 2 && segments[1..].iter().all(|s| !s.is_empty()) {
            report.add(
                "double_extension",
                DOUBLE_EXTENSION_SCORE,
                format!("{} carries more than one extension", filename),
            );
        }

        if let Some(detail) = size_mismatch(content_type, size) {
            report.add("size_mismatch", SIZE_MISMATCH_SCORE, detail);
        }

        report
    }
}

fn size_ceiling(document_type: DocumentType) -> Option<u64> {
    match document_type {
        DocumentType::Image => Some(50 * MB),
        DocumentType::Audio => Some(200 * MB),
        DocumentType::Video => Some(2 * 1024 * MB),
        DocumentType::Text => Some(10 * MB),
        DocumentType::Pdf => Some(100 * MB),
        _ => None,
    }
}

fn size_mismatch(content_type: &str, size: u64) -> Option<String> {
    let document_type = DocumentType::from_content_type(content_type);
    if document_type == DocumentType::Image && size < MIN_IMAGE_BYTES {
        return Some(format!(
            "{} bytes is too small for {}",
            size,
            normalize_content_type(content_type)
        ));
    }
    size_ceiling(document_type)
        .filter(|ceiling| size > *ceiling)
        .map(|ceiling| {
            format!(
                "{} bytes exceeds the {} byte ceiling for {}",
                size,
                ceiling,
                normalize_content_type(content_type)
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristics() -> BehavioralHeuristics {
        BehavioralHeuristics::new(50)
    }

    #[test]
    fn test_ordinary_file_scores_zero() {
        let report = heuristics().analyze("holiday.jpg", "image/jpeg", 2048);
        assert_eq!(report.risk_score, 0);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_dangerous_extension_crosses_threshold() {
        let h = heuristics();
        let report = h.analyze("setup.EXE", "application/octet-stream", 4096);
        assert_eq!(report.risk_score, DANGEROUS_EXTENSION_SCORE);
        assert!(h.is_suspicious(&report));
    }

    #[test]
    fn test_double_extension_alone_is_below_threshold() {
        let h = heuristics();
        let report = h.analyze("invoice.pdf.zip", "application/zip", 4096);
        assert_eq!(report.risk_score, DOUBLE_EXTENSION_SCORE);
        assert!(!h.is_suspicious(&report));
    }

    #[test]
    fn test_double_dangerous_extension() {
        let report = heuristics().analyze("invoice.pdf.exe", "application/pdf", 4096);
        assert_eq!(
            report.risk_score,
            DANGEROUS_EXTENSION_SCORE + DOUBLE_EXTENSION_SCORE
        );
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn test_hidden_files_are_not_double_extensions() {
        let report = heuristics().analyze(".env.txt", "text/plain", 10);
        assert_eq!(report.risk_score, 0);
    }

    #[test]
    fn test_size_mismatches() {
        let h = heuristics();
        assert_eq!(
            h.analyze("tiny.png", "image/png", 40).risk_score,
            SIZE_MISMATCH_SCORE
        );
        assert_eq!(
            h.analyze("big.txt", "text/plain", 10 * MB + 1).risk_score,
            SIZE_MISMATCH_SCORE
        );
        assert_eq!(h.analyze("big.txt", "text/plain", 10 * MB).risk_score, 0);
        assert_eq!(
            h.analyze("movie.mp4", "video/mp4", 3 * 1024 * MB).risk_score,
            SIZE_MISMATCH_SCORE
        );
    }

    #[test]
    fn test_scores_accumulate() {
        let h = heuristics();
        let report = h.analyze("pic.jpg.js", "image/jpeg", 10);
        assert_eq!(report.risk_score, 50 + 30 + 25);
        assert!(h.is_suspicious(&report));
    }
}
