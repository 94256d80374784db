//! Audit pipeline.
//!
//! Every source is fetched and classified into its own [`SourceBatch`];
//! batches are merged into the [`Aggregator`] in configured source order no
//! matter which source finishes first.

use crate::analysis::{Aggregator, Classifier, SourceBatch};
use crate::config::PolicyConfig;
use crate::error::AuditError;
use crate::models::Report;
use crate::source::SourceConnector;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

/// Settings for one audit run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub policy: PolicyConfig,
    /// Time every snapshot age is measured against.
    pub evaluated_at: DateTime<Utc>,
    /// Sources fetched at the same time.
    pub concurrency: usize,
    pub show_progress: bool,
}

/// Run the audit over all connectors and produce the report.
///
/// A failing source contributes nothing and is listed in the report
/// metadata; the remaining sources are still processed.
pub async fn run<C: SourceConnector>(connectors: &[C], options: &PipelineOptions) -> Report {
    let classifier = Classifier::new(&options.policy);
    let mut aggregator = Aggregator::new(&options.policy, options.evaluated_at);

    let progress_bar = options
        .show_progress
        .then(|| create_progress_bar(connectors.len() as u64));

    let mut batches = stream::iter(connectors)
        .map(|connector| collect_batch(connector, &classifier, options.evaluated_at))
        .buffered(options.concurrency.max(1));

    while let Some(batch) = batches.next().await {
        if let Some(ref pb) = progress_bar {
            pb.set_message(batch.source_id.clone());
            pb.inc(1);
        }
        aggregator.merge(batch);
    }

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let report = aggregator.finalize();
    info!(
        "Audit complete: {} to remove, {} protected across {} sources",
        report.to_remove().len(),
        report.protected().len(),
        report.metadata().sources.len()
    );
    report
}

/// Fetch one source and classify everything it returned.
pub async fn collect_batch<C: SourceConnector>(
    connector: &C,
    classifier: &Classifier,
    evaluated_at: DateTime<Utc>,
) -> SourceBatch {
    let source_id = connector.source_id();

    let records = match connector.list_snapshots_with_context().await {
        Ok(records) => records,
        Err(AuditError::SourceUnavailable { reason, .. }) => {
            warn!("Skipping source {}: {}", source_id, reason);
            return SourceBatch::failed(source_id, reason);
        }
        Err(e) => {
            warn!("Skipping source {}: {}", source_id, e);
            return SourceBatch::failed(source_id, e.to_string());
        }
    };

    let mut snapshots = Vec::with_capacity(records.len());
    let mut malformed = 0;

    for record in records {
        match record {
            Ok(raw) => {
                let snapshot = classifier.classify(raw, evaluated_at);
                debug!(
                    "{}/{} '{}': {} ({} days)",
                    source_id,
                    snapshot.vm_name,
                    snapshot.snapshot_name,
                    snapshot.disposition,
                    snapshot.age_days
                );
                snapshots.push(snapshot);
            }
            Err(e) => {
                warn!("{}", e);
                malformed += 1;
            }
        }
    }

    debug!(
        "Source {}: {} snapshots classified, {} malformed",
        source_id,
        snapshots.len(),
        malformed
    );

    SourceBatch {
        source_id: source_id.to_string(),
        snapshots,
        malformed,
        failure: None,
    }
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
