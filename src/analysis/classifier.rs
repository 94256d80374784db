//! Snapshot classification.
//!
//! Rules are applied as a short-circuit in fixed order: template name,
//! then persistence tag, then age. A snapshot matching several rules gets
//! the disposition of the first one.

use crate::config::PolicyConfig;
use crate::models::{round_mb, ClassifiedSnapshot, Disposition, RawSnapshotRecord};
use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// Applies the retention policy to raw snapshot records.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Template patterns, lowercased once for case-insensitive matching.
    template_patterns: Vec<String>,
    protected_tag: String,
    retention_days: i64,
}

impl Classifier {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            template_patterns: policy
                .template_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            protected_tag: policy.protected_tag.clone(),
            retention_days: i64::from(policy.retention_days),
        }
    }

    /// Decide the disposition of a record as of `evaluated_at`.
    pub fn disposition(
        &self,
        record: &RawSnapshotRecord,
        evaluated_at: DateTime<Utc>,
    ) -> Disposition {
        if self.is_template(&record.vm_name) {
            Disposition::Excluded
        } else if record.tags.contains(&self.protected_tag) {
            Disposition::Protected
        } else if age_days(record.created_at, evaluated_at) > self.retention_days {
            Disposition::Eligible
        } else {
            Disposition::Retained
        }
    }

    /// Classify a record and normalize its size and age.
    pub fn classify(
        &self,
        record: RawSnapshotRecord,
        evaluated_at: DateTime<Utc>,
    ) -> ClassifiedSnapshot {
        let disposition = self.disposition(&record, evaluated_at);
        let age_days = age_days(record.created_at, evaluated_at);
        let size_mb = round_mb(record.size_bytes);

        ClassifiedSnapshot {
            source_id: record.source_id,
            vm_name: record.vm_name,
            snapshot_name: record.snapshot_name,
            snapshot_description: record.snapshot_description,
            size_bytes: record.size_bytes,
            created_at: record.created_at,
            tags: record.tags,
            size_mb,
            age_days,
            disposition,
        }
    }

    fn is_template(&self, vm_name: &str) -> bool {
        let name = vm_name.to_lowercase();
        self.template_patterns
            .iter()
            .any(|pattern| name.contains(pattern.as_str()))
    }
}

/// Whole days elapsed between `created_at` and `evaluated_at`, rounded down.
///
/// A snapshot created in the future (clock skew) gets a negative age.
pub fn age_days(created_at: DateTime<Utc>, evaluated_at: DateTime<Utc>) -> i64 {
    (evaluated_at - created_at)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}
