//! Report aggregation and statistics.
//!
//! The [`Aggregator`] collects classified snapshots from every source in
//! discovery order and freezes into a [`Report`]. The free functions below
//! compute per-source statistics from a finished report.

use crate::config::PolicyConfig;
use crate::models::{
    round_mb, ClassifiedSnapshot, Disposition, Report, ReportMetadata, SourceFailure,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Everything one source contributed to a run.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source_id: String,
    /// Classified snapshots in the order the source returned them.
    pub snapshots: Vec<ClassifiedSnapshot>,
    /// Records that failed validation and were skipped.
    pub malformed: usize,
    /// Set when the source could not be enumerated at all.
    pub failure: Option<String>,
}

impl SourceBatch {
    /// A batch for a source that could not be enumerated.
    pub fn failed(source_id: &str, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            snapshots: Vec::new(),
            malformed: 0,
            failure: Some(reason.into()),
        }
    }
}

/// Accumulates classified snapshots into the two report lists.
///
/// Single-phase: [`Aggregator::finalize`] consumes the aggregator, so nothing
/// can be recorded once the report exists.
#[derive(Debug)]
pub struct Aggregator {
    evaluated_at: DateTime<Utc>,
    policy: PolicyConfig,
    sources: Vec<String>,
    to_remove: Vec<ClassifiedSnapshot>,
    protected: Vec<ClassifiedSnapshot>,
    source_failures: Vec<SourceFailure>,
    malformed: usize,
    excluded: usize,
    retained: usize,
}

impl Aggregator {
    pub fn new(policy: &PolicyConfig, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            evaluated_at,
            policy: policy.clone(),
            sources: Vec::new(),
            to_remove: Vec::new(),
            protected: Vec::new(),
            source_failures: Vec::new(),
            malformed: 0,
            excluded: 0,
            retained: 0,
        }
    }

    /// Append a snapshot to the list matching its disposition.
    ///
    /// The snapshot's provenance is set to `source_id`. Excluded and retained
    /// snapshots are never listed, only counted.
    pub fn record(&mut self, source_id: &str, mut snapshot: ClassifiedSnapshot) {
        if snapshot.source_id != source_id {
            snapshot.source_id = source_id.to_string();
        }

        match snapshot.disposition {
            Disposition::Eligible => self.to_remove.push(snapshot),
            Disposition::Protected => self.protected.push(snapshot),
            Disposition::Excluded => self.excluded += 1,
            Disposition::Retained => self.retained += 1,
        }
    }

    /// Merge a whole source batch, keeping its internal order.
    pub fn merge(&mut self, batch: SourceBatch) {
        let SourceBatch {
            source_id,
            snapshots,
            malformed,
            failure,
        } = batch;

        if let Some(reason) = failure {
            self.source_failures.push(SourceFailure {
                source_id: source_id.clone(),
                reason,
            });
        }

        self.malformed += malformed;

        for snapshot in snapshots {
            self.record(&source_id, snapshot);
        }

        debug!(
            "Merged source {}: {} to remove, {} protected so far",
            source_id,
            self.to_remove.len(),
            self.protected.len()
        );
        self.sources.push(source_id);
    }

    /// Freeze the accumulated lists into a report.
    pub fn finalize(self) -> Report {
        let metadata = ReportMetadata {
            evaluated_at: self.evaluated_at,
            retention_days: self.policy.retention_days,
            protected_tag: self.policy.protected_tag,
            template_patterns: self.policy.template_patterns,
            sources: self.sources,
            source_failures: self.source_failures,
            malformed_records: self.malformed,
            excluded: self.excluded,
            retained: self.retained,
        };

        Report::new(metadata, self.to_remove, self.protected)
    }
}

/// Per-source totals of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub source_id: String,
    pub to_remove: usize,
    pub protected: usize,
    /// Size of this source's removal candidates in MB.
    pub reclaimable_mb: f64,
    pub failed: bool,
}

/// Summarize a report per source, in processing order.
pub fn summarize_by_source(report: &Report) -> Vec<SourceSummary> {
    let metadata = report.metadata();

    metadata
        .sources
        .iter()
        .map(|source_id| {
            let removable: Vec<&ClassifiedSnapshot> = report
                .to_remove()
                .iter()
                .filter(|s| &s.source_id == source_id)
                .collect();
            let reclaimable_bytes: u64 = removable.iter().map(|s| s.size_bytes).sum();

            SourceSummary {
                source_id: source_id.clone(),
                to_remove: removable.len(),
                protected: report
                    .protected()
                    .iter()
                    .filter(|s| &s.source_id == source_id)
                    .count(),
                reclaimable_mb: round_mb(reclaimable_bytes),
                failed: metadata
                    .source_failures
                    .iter()
                    .any(|f| &f.source_id == source_id),
            }
        })
        .collect()
}

/// The `n` largest snapshots, biggest first.
pub fn largest_snapshots(
    snapshots: &[ClassifiedSnapshot],
    n: usize,
) -> Vec<&ClassifiedSnapshot> {
    let mut sorted: Vec<&ClassifiedSnapshot> = snapshots.iter().collect();
    sorted.sort_by_key(|s| std::cmp::Reverse(s.size_bytes));
    sorted.truncate(n);
    sorted
}
