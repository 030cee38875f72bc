//! File selection validation
//!
//! Checks a candidate set against the count, type and size limits before it
//! becomes the active selection. Pure: the caller decides how to surface a
//! rejection.

use crate::models::{FileSelection, SelectedFile};
use jobscan_common::config::LimitsConfig;
use jobscan_common::human_size::format_file_size;

/// MIME types accepted for upload
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "application/pdf"];

/// Result of validating a candidate set
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// Every rule passed; order and length match the input
    Accepted(FileSelection),
    /// One message per violation found
    Rejected(Vec<String>),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }
}

/// Validator for candidate file sets
#[derive(Debug, Clone)]
pub struct FileValidator {
    limits: LimitsConfig,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

impl FileValidator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Validate a candidate set
    ///
    /// The count check short-circuits with a single message. Otherwise every
    /// type and size violation is reported, not just the first.
    pub fn validate(&self, candidates: &[SelectedFile]) -> ValidationOutcome {
        if candidates.len() > self.limits.max_files {
            return ValidationOutcome::Rejected(vec![format!(
                "At most {} files can be selected",
                self.limits.max_files
            )]);
        }

        let mut errors = Vec::new();
        for file in candidates {
            if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
                errors.push(format!("Unsupported file type: {}", file.name));
            }
            if file.size > self.limits.max_file_size_bytes {
                errors.push(format!(
                    "File {} exceeds the size limit ({})",
                    file.name,
                    format_file_size(self.limits.max_file_size_bytes)
                ));
            }
        }

        if let Some(max_total) = self.limits.max_total_size_bytes {
            let total: u64 = candidates.iter().map(|f| f.size).sum();
            if total > max_total {
                errors.push(format!(
                    "Total size {} exceeds the limit ({})",
                    format_file_size(total),
                    format_file_size(max_total)
                ));
            }
        }

        if errors.is_empty() {
            ValidationOutcome::Accepted(FileSelection::new(candidates.to_vec()))
        } else {
            ValidationOutcome::Rejected(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn file(name: &str, mime: &str, size: usize) -> SelectedFile {
        SelectedFile::in_memory(name, mime, vec![0u8; size])
    }

    #[test]
    fn test_count_limit_short_circuits() {
        let validator = FileValidator::default();
        // Oversized and wrongly typed too, but only the count is reported
        let candidates: Vec<_> = (0..11)
            .map(|i| file(&format!("f{i}.gif"), "image/gif", 17 * MB))
            .collect();

        match validator.validate(&candidates) {
            ValidationOutcome::Rejected(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("10"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_collects_every_violation() {
        let validator = FileValidator::default();
        let candidates = vec![
            file("ok.png", "image/png", MB),
            file("notes.txt", "text/plain", MB),
            file("huge.pdf", "application/pdf", 17 * MB),
            file("both.gif", "image/gif", 20 * MB),
        ];

        match validator.validate(&candidates) {
            ValidationOutcome::Rejected(errors) => {
                assert_eq!(errors.len(), 4);
                assert!(errors[0].contains("notes.txt"));
                assert!(errors[1].contains("huge.pdf"));
                assert!(errors[1].contains("16 MB"));
                assert!(errors.iter().filter(|e| e.contains("both.gif")).count() == 2);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_accepts_and_preserves_order() {
        let validator = FileValidator::new(LimitsConfig {
            max_files: 10,
            max_file_size_bytes: 16 * MB as u64,
            max_total_size_bytes: Some(200 * MB as u64),
        });
        let candidates = vec![
            file("a.png", "image/png", 2 * MB),
            file("b.png", "image/png", 3 * MB),
            file("c.png", "image/png", MB),
        ];

        match validator.validate(&candidates) {
            ValidationOutcome::Accepted(selection) => {
                let names: Vec<_> = selection.files().iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
                let stats = selection.stats();
                assert_eq!(stats.count, 3);
                assert_eq!(stats.total_display, "6 MB");
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_jpg_alias_accepted() {
        let validator = FileValidator::default();
        let outcome = validator.validate(&[file("scan.jpg", "image/jpg", 10)]);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_total_size_limit() {
        let validator = FileValidator::new(LimitsConfig {
            max_files: 10,
            max_file_size_bytes: 16 * MB as u64,
            max_total_size_bytes: Some(4 * MB as u64),
        });
        let candidates = vec![file("a.png", "image/png", 3 * MB), file("b.png", "image/png", 3 * MB)];

        match validator.validate(&candidates) {
            ValidationOutcome::Rejected(errors) => {
                assert_eq!(errors, vec!["Total size 6 MB exceeds the limit (4 MB)".to_string()]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_at_limits_passes() {
        let validator = FileValidator::default();
        let candidates: Vec<_> = (0..10)
            .map(|i| file(&format!("p{i}.png"), "image/png", 16 * MB))
            .collect();
        assert!(validator.validate(&candidates).is_accepted());
    }
}
