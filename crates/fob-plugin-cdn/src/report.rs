//! Outcome of one publishing pass.

use serde::Serialize;
use std::path::PathBuf;

use crate::matcher::MatchKind;

/// What happened to a published image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Uploaded,
    /// The key already existed and `skip_existing` is on
    Existing,
    /// Dry run, nothing was uploaded
    Planned,
}

/// An emitted image that now has a CDN URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedImage {
    pub filename: String,
    pub resource_path: PathBuf,
    pub key: String,
    pub url: String,
    pub matched_by: MatchKind,
    pub status: PublishStatus,
}

/// An emitted image whose upload failed. References to it stay local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedImage {
    pub filename: String,
    pub key: String,
    pub error: String,
}

/// Summary of one `generate_bundle` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: Vec<PublishedImage>,
    pub failed: Vec<FailedImage>,
    /// Emitted images not referenced through the module graph
    pub unmatched: Vec<String>,
    /// String literals rewritten across all scripts
    pub rewritten_references: usize,
    /// Scripts whose code changed
    pub rewritten_files: Vec<String>,
    /// Images removed from the local output
    pub removed: Vec<String>,
}

impl PublishReport {
    pub fn uploaded(&self) -> usize {
        self.count(PublishStatus::Uploaded)
    }

    pub fn existing(&self) -> usize {
        self.count(PublishStatus::Existing)
    }

    pub fn planned(&self) -> usize {
        self.count(PublishStatus::Planned)
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn url_for(&self, filename: &str) -> Option<&str> {
        self.published
            .iter()
            .find(|p| p.filename == filename)
            .map(|p| p.url.as_str())
    }

    fn count(&self, status: PublishStatus) -> usize {
        self.published.iter().filter(|p| p.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published(filename: &str, status: PublishStatus) -> PublishedImage {
        PublishedImage {
            filename: filename.to_string(),
            resource_path: PathBuf::from("/app/src").join(filename),
            key: filename.to_string(),
            url: format!("https://cdn.example.com/{}", filename),
            matched_by: MatchKind::Fingerprint,
            status,
        }
    }

    #[test]
    fn test_counts_by_status() {
        let report = PublishReport {
            published: vec![
                published("a.png", PublishStatus::Uploaded),
                published("b.png", PublishStatus::Uploaded),
                published("c.png", PublishStatus::Existing),
            ],
            ..Default::default()
        };

        assert_eq!(report.uploaded(), 2);
        assert_eq!(report.existing(), 1);
        assert_eq!(report.planned(), 0);
        assert!(report.is_success());
        assert_eq!(report.url_for("c.png"), Some("https://cdn.example.com/c.png"));
        assert_eq!(report.url_for("d.png"), None);
    }

    #[test]
    fn test_serializes_snake_case() {
        let report = PublishReport {
            published: vec![published("a.png", PublishStatus::Planned)],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["published"][0]["status"], "planned");
        assert_eq!(json["published"][0]["matched_by"], "fingerprint");
    }
}
