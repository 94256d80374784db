//! Snapshot inventory sources.
//!
//! A source is one management endpoint. Connectors fetch its inventory as a
//! JSON array of snapshot records; every element is validated on its own so
//! that one bad record never hides the rest of the source.

pub mod file;
pub mod http;

pub use file::FileConnector;
pub use http::HttpConnector;

use crate::config::{SourceConfig, SourceKind};
use crate::error::AuditError;
use crate::models::RawSnapshotRecord;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;

/// A validated record, or the reason it was rejected.
pub type RecordResult = std::result::Result<RawSnapshotRecord, AuditError>;

/// Something that can enumerate the snapshots of one source.
pub trait SourceConnector {
    /// Identifier of the source, used as provenance.
    fn source_id(&self) -> &str;

    /// List every snapshot together with its VM name and VM tags.
    ///
    /// Fails with [`AuditError::SourceUnavailable`] when the source cannot be
    /// enumerated at all. Individual invalid records are returned in place as
    /// [`AuditError::MalformedRecord`].
    fn list_snapshots_with_context(
        &self,
    ) -> impl Future<Output = std::result::Result<Vec<RecordResult>, AuditError>> + Send;
}

/// A connector built from a `[[sources]]` entry.
#[derive(Debug)]
pub enum Connector {
    Http(HttpConnector),
    File(FileConnector),
}

impl Connector {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(match config.kind {
            SourceKind::Http => Connector::Http(HttpConnector::new(config)?),
            SourceKind::File => Connector::File(FileConnector::new(config)),
        })
    }
}

impl SourceConnector for Connector {
    fn source_id(&self) -> &str {
        match self {
            Connector::Http(c) => c.source_id(),
            Connector::File(c) => c.source_id(),
        }
    }

    async fn list_snapshots_with_context(
        &self,
    ) -> std::result::Result<Vec<RecordResult>, AuditError> {
        match self {
            Connector::Http(c) => c.list_snapshots_with_context().await,
            Connector::File(c) => c.list_snapshots_with_context().await,
        }
    }
}

/// Inventory document: either a bare array or `{"snapshots": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum InventoryDocument {
    Records(Vec<Value>),
    Wrapped { snapshots: Vec<Value> },
}

/// One inventory element as it appears on the wire.
#[derive(Debug, Deserialize)]
struct InventoryRecord {
    vm_name: Option<String>,
    snapshot_name: Option<String>,
    #[serde(alias = "snapshot_description")]
    description: Option<String>,
    size_bytes: Option<serde_json::Number>,
    created_at: Option<String>,
    tags: Option<Vec<String>>,
}

/// Decode an inventory body into its raw elements.
pub fn decode_inventory(body: &str) -> std::result::Result<Vec<Value>, String> {
    match serde_json::from_str::<InventoryDocument>(body) {
        Ok(InventoryDocument::Records(records)) => Ok(records),
        Ok(InventoryDocument::Wrapped { snapshots }) => Ok(snapshots),
        Err(e) => Err(format!("invalid inventory document: {}", e)),
    }
}

/// Validate raw elements into records, keeping their order.
pub fn validate_records(source_id: &str, values: Vec<Value>) -> Vec<RecordResult> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| validate_record(source_id, index, value))
        .collect()
}

fn validate_record(source_id: &str, index: usize, value: Value) -> RecordResult {
    let malformed = |reason: String| AuditError::malformed(source_id, index, reason);

    let record: InventoryRecord =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let vm_name = record
        .vm_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("missing vm_name".to_string()))?;

    let size = record
        .size_bytes
        .ok_or_else(|| malformed("missing size_bytes".to_string()))?;
    let size_bytes = size.as_u64().ok_or_else(|| {
        malformed(format!("size_bytes must be a non-negative integer, got {}", size))
    })?;

    let raw_created = record
        .created_at
        .ok_or_else(|| malformed("missing created_at".to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&raw_created)
        .map_err(|e| malformed(format!("invalid created_at '{}': {}", raw_created, e)))?
        .with_timezone(&Utc);

    Ok(RawSnapshotRecord {
        source_id: source_id.to_string(),
        vm_name,
        snapshot_name: record.snapshot_name.unwrap_or_default(),
        snapshot_description: record.description.unwrap_or_default(),
        size_bytes,
        created_at,
        tags: record
            .tags
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeSet<_>>(),
    })
}
