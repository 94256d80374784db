//! Data models for the snapshot auditor.
//!
//! This module contains the records that flow through a run: raw inventory
//! records from a source, their classified form, and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bytes per megabyte used for size normalization.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// A snapshot as reported by a source, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshotRecord {
    /// Identifier of the management endpoint the record came from.
    pub source_id: String,
    /// Name of the VM owning the snapshot.
    pub vm_name: String,
    pub snapshot_name: String,
    pub snapshot_description: String,
    /// Size of the snapshot delta in bytes.
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Tags assigned to the owning VM (tags are VM-level, not per snapshot).
    pub tags: BTreeSet<String>,
}

/// Retention outcome of a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// VM name matches a template pattern; never reported.
    Excluded,
    /// VM carries the persistence tag.
    Protected,
    /// Older than the retention threshold.
    Eligible,
    /// Young enough to keep; never reported.
    Retained,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Excluded => write!(f, "Excluded"),
            Disposition::Protected => write!(f, "Protected"),
            Disposition::Eligible => write!(f, "Eligible"),
            Disposition::Retained => write!(f, "Retained"),
        }
    }
}

/// A snapshot with normalized size/age and its disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSnapshot {
    /// Provenance: the source this snapshot was discovered on.
    pub source_id: String,
    pub vm_name: String,
    pub snapshot_name: String,
    pub snapshot_description: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    /// Size in megabytes, rounded to two decimals.
    pub size_mb: f64,
    /// Whole days since creation (floor; negative under clock skew).
    pub age_days: i64,
    pub disposition: Disposition,
}

/// A source that could not be enumerated during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub reason: String,
}

/// Metadata about the audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Evaluation time every snapshot age was measured against.
    pub evaluated_at: DateTime<Utc>,
    pub retention_days: u32,
    pub protected_tag: String,
    pub template_patterns: Vec<String>,
    /// Source identifiers in processing order.
    pub sources: Vec<String>,
    pub source_failures: Vec<SourceFailure>,
    /// Records skipped because they could not be validated.
    pub malformed_records: usize,
    /// Snapshots of template VMs.
    pub excluded: usize,
    /// Snapshots within the retention threshold.
    pub retained: usize,
}

/// The audit report handed to a renderer.
///
/// Built once by the aggregator and never mutated afterwards; renderers only
/// get read access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    metadata: ReportMetadata,
    to_remove: Vec<ClassifiedSnapshot>,
    protected: Vec<ClassifiedSnapshot>,
}

impl Report {
    pub(crate) fn new(
        metadata: ReportMetadata,
        to_remove: Vec<ClassifiedSnapshot>,
        protected: Vec<ClassifiedSnapshot>,
    ) -> Self {
        Self {
            metadata,
            to_remove,
            protected,
        }
    }

    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }

    /// Snapshots eligible for removal, in discovery order.
    pub fn to_remove(&self) -> &[ClassifiedSnapshot] {
        &self.to_remove
    }

    /// Snapshots of VMs carrying the persistence tag, in discovery order.
    pub fn protected(&self) -> &[ClassifiedSnapshot] {
        &self.protected
    }

    /// Total size of the removal candidates in megabytes.
    pub fn reclaimable_mb(&self) -> f64 {
        total_size_mb(&self.to_remove)
    }

    /// Total size of the protected snapshots in megabytes.
    pub fn protected_mb(&self) -> f64 {
        total_size_mb(&self.protected)
    }

    pub fn has_source_failures(&self) -> bool {
        !self.metadata.source_failures.is_empty()
    }
}

/// Sum of snapshot sizes, computed from bytes and rounded once.
pub fn total_size_mb(snapshots: &[ClassifiedSnapshot]) -> f64 {
    let bytes: u64 = snapshots.iter().map(|s| s.size_bytes).sum();
    round_mb(bytes)
}

/// Convert a byte count to megabytes rounded to two decimals.
pub fn round_mb(bytes: u64) -> f64 {
    ((bytes as f64 / BYTES_PER_MB) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(size_bytes: u64, disposition: Disposition) -> ClassifiedSnapshot {
        ClassifiedSnapshot {
            source_id: "vc01".to_string(),
            vm_name: "web01".to_string(),
            snapshot_name: "before-upgrade".to_string(),
            snapshot_description: String::new(),
            size_bytes,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            tags: BTreeSet::new(),
            size_mb: round_mb(size_bytes),
            age_days: 30,
            disposition,
        }
    }

    #[test]
    fn test_round_mb() {
        assert_eq!(round_mb(0), 0.0);
        assert_eq!(round_mb(1_048_576), 1.0);
        assert_eq!(round_mb(1_572_864), 1.5);
        // 1234567 bytes = 1.17737... MB
        assert_eq!(round_mb(1_234_567), 1.18);
    }

    #[test]
    fn test_disposition_serializes_lowercase() {
        let json = serde_json::to_string(&Disposition::Eligible).unwrap();
        assert_eq!(json, "\"eligible\"");
    }

    #[test]
    fn test_report_size_totals() {
        let metadata = ReportMetadata {
            evaluated_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            retention_days: 14,
            protected_tag: "PersistantSnapshot".to_string(),
            template_patterns: vec!["VMT".to_string()],
            sources: vec!["vc01".to_string()],
            source_failures: vec![],
            malformed_records: 0,
            excluded: 0,
            retained: 0,
        };
        let report = Report::new(
            metadata,
            vec![
                snapshot(1_048_576, Disposition::Eligible),
                snapshot(524_288, Disposition::Eligible),
            ],
            vec![snapshot(2_097_152, Disposition::Protected)],
        );

        assert_eq!(report.reclaimable_mb(), 1.5);
        assert_eq!(report.protected_mb(), 2.0);
        assert!(!report.has_source_failures());
    }
}
