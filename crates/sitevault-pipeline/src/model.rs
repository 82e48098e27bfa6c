//! Domain models for pipeline jobs.
//!
//! # Design
//! - Descriptors are immutable inputs; records are the per-descriptor outputs.
//! - Paths in descriptors and records are relative to the archive root.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sitevault_config::ArchiveLayout;
use sitevault_events::{JobProgress, JobStage, OutcomeKind, ResourceKind};
use uuid::Uuid;

use crate::layout::destination_for;
use crate::quality::QualityReport;

/// One resource the pipeline should materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Absolute URL of the resource.
    #[serde(rename = "url")]
    pub source_url: String,
    /// Asset class the caller expects.
    #[serde(rename = "kind")]
    pub expected_kind: ResourceKind,
    /// Destination relative to the archive root.
    #[serde(rename = "destination")]
    pub destination_path: PathBuf,
}

impl ResourceDescriptor {
    /// Build a descriptor.
    #[must_use]
    pub fn new(
        source_url: impl Into<String>,
        expected_kind: ResourceKind,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            expected_kind,
            destination_path: destination_path.into(),
        }
    }
}

/// Manifest row as supplied by the enumerating collaborator.
///
/// The destination is optional; when absent it is derived from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Absolute URL of the resource.
    pub url: String,
    /// Asset class the caller expects.
    pub kind: ResourceKind,
    /// Optional destination relative to the archive root.
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

impl ManifestEntry {
    /// Resolve into a descriptor, deriving the destination when missing.
    #[must_use]
    pub fn into_descriptor(self, layout: &ArchiveLayout) -> ResourceDescriptor {
        let destination = self
            .destination
            .unwrap_or_else(|| destination_for(&self.url, self.kind, layout));
        ResourceDescriptor::new(self.url, self.kind, destination)
    }
}

/// Terminal outcome for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Descriptor this record belongs to.
    pub descriptor: ResourceDescriptor,
    /// How the descriptor ended.
    pub outcome: OutcomeKind,
    /// File written for this descriptor, relative to the archive root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_path: Option<PathBuf>,
    /// Human-readable detail (failure cause, substitute URL, alias source).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A file written somewhere other than its descriptor's destination.
///
/// Document rewriting uses these to update references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    /// Destination the descriptor asked for.
    pub from: PathBuf,
    /// Path actually written.
    pub to: PathBuf,
}

/// Inputs for one pipeline job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Job identifier used in logs and events.
    pub job_id: Uuid,
    /// Descriptors to process, in submission order.
    pub descriptors: Vec<ResourceDescriptor>,
    /// Archive root directory.
    pub destination_root: PathBuf,
    /// Rendered root document written before scoring.
    pub document: Option<String>,
}

impl JobRequest {
    /// Request with a fresh job id and no root document.
    #[must_use]
    pub fn new(descriptors: Vec<ResourceDescriptor>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            descriptors,
            destination_root: destination_root.into(),
            document: None,
        }
    }

    /// Attach the rendered root document.
    #[must_use]
    pub fn with_document(mut self, html: impl Into<String>) -> Self {
        self.document = Some(html.into());
        self
    }
}

/// Everything a finished job produced.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Job identifier.
    pub job_id: Uuid,
    /// Final progress snapshot.
    pub progress: JobProgress,
    /// Per-descriptor outcomes in submission order.
    pub records: Vec<ResourceRecord>,
    /// Files written at a different path than requested.
    pub relocations: Vec<Relocation>,
    /// Quality report, present when the job reached `done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

impl JobReport {
    /// Final stage of the job.
    #[must_use]
    pub const fn stage(&self) -> JobStage {
        self.progress.stage
    }

    /// Number of records with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: OutcomeKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == outcome)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_uses_short_field_names() -> Result<(), serde_json::Error> {
        let descriptor =
            ResourceDescriptor::new("https://a.test/site.css", ResourceKind::Css, "css/site.css");
        let json = serde_json::to_value(&descriptor)?;
        assert_eq!(json["url"], "https://a.test/site.css");
        assert_eq!(json["kind"], "css");
        assert_eq!(json["destination"], "css/site.css");
        Ok(())
    }

    #[test]
    fn manifest_entry_derives_missing_destination() -> Result<(), serde_json::Error> {
        let entry: ManifestEntry =
            serde_json::from_str(r#"{"url": "https://a.test/js/app.js?v=3", "kind": "js"}"#)?;
        let descriptor = entry.into_descriptor(&ArchiveLayout::default());
        assert_eq!(descriptor.destination_path, PathBuf::from("js/app.js"));
        Ok(())
    }

    #[test]
    fn manifest_entry_keeps_explicit_destination() -> Result<(), serde_json::Error> {
        let entry: ManifestEntry = serde_json::from_str(
            r#"{"url": "https://a.test/x.png", "kind": "image", "destination": "img/x.png"}"#,
        )?;
        let descriptor = entry.into_descriptor(&ArchiveLayout::default());
        assert_eq!(descriptor.destination_path, PathBuf::from("img/x.png"));
        Ok(())
    }

    #[test]
    fn report_counts_outcomes() {
        let record = |outcome| ResourceRecord {
            descriptor: ResourceDescriptor::new("https://a.test/a", ResourceKind::Other, "a"),
            outcome,
            written_path: None,
            detail: None,
        };
        let report = JobReport {
            job_id: Uuid::nil(),
            progress: JobProgress::queued(3),
            records: vec![
                record(OutcomeKind::Success),
                record(OutcomeKind::Omitted),
                record(OutcomeKind::Success),
            ],
            relocations: Vec::new(),
            quality: None,
        };
        assert_eq!(report.count(OutcomeKind::Success), 2);
        assert_eq!(report.count(OutcomeKind::Placeholder), 0);
        assert_eq!(report.stage(), JobStage::Queued);
    }
}
