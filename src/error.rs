//! Error taxonomy for an audit run.
//!
//! Source and record errors are recoverable at the pipeline level; only
//! render failures end the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// A configured source could not be enumerated.
    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A single inventory record was missing or had invalid fields.
    #[error("malformed record #{index} from source '{source_id}': {reason}")]
    MalformedRecord {
        source_id: String,
        index: usize,
        reason: String,
    },

    /// The report could not be written to its destination.
    #[error("failed to write report to {}: {source}", .path.display())]
    RenderFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    pub fn source_unavailable(source_id: &str, reason: impl Into<String>) -> Self {
        AuditError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(source_id: &str, index: usize, reason: impl Into<String>) -> Self {
        AuditError::MalformedRecord {
            source_id: source_id.to_string(),
            index,
            reason: reason.into(),
        }
    }
}
