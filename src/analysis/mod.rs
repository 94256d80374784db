//! Analysis modules.
//!
//! Classification of single snapshots and aggregation of classified
//! snapshots into a report.

pub mod aggregator;
pub mod classifier;

pub use aggregator::*;
pub use classifier::Classifier;
