//! File inventory connector.
//!
//! Reads inventory exports from disk: either a single JSON file or a
//! directory whose `*.json` files are read in file name order.

use super::{decode_inventory, validate_records, RecordResult, SourceConnector};
use crate::config::SourceConfig;
use crate::error::AuditError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Connector for offline inventory exports.
#[derive(Debug, Clone)]
pub struct FileConnector {
    source_id: String,
    path: PathBuf,
}

impl FileConnector {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            source_id: config.id.clone(),
            path: PathBuf::from(&config.location),
        }
    }

    fn unavailable(&self, reason: String) -> AuditError {
        AuditError::source_unavailable(&self.source_id, reason)
    }
}

/// Export files making up a source, in read order.
///
/// Blocking: lists the directory with `WalkDir`, so callers run it on the
/// blocking pool.
fn list_exports(source_id: &str, path: &Path) -> Result<Vec<PathBuf>, AuditError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        return Err(AuditError::source_unavailable(
            source_id,
            format!("inventory path does not exist: {}", path.display()),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            AuditError::source_unavailable(
                source_id,
                format!("cannot list {}: {}", path.display(), e),
            )
        })?;
        if entry.file_type().is_file() && is_json(entry.path()) {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        warn!(
            "No inventory exports found in {} for source {}",
            path.display(),
            source_id
        );
    }

    Ok(files)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl SourceConnector for FileConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn list_snapshots_with_context(&self) -> Result<Vec<RecordResult>, AuditError> {
        info!(
            "Reading snapshot inventory for {} from {}",
            self.source_id,
            self.path.display()
        );

        let source_id = self.source_id.clone();
        let path = self.path.clone();
        let files = tokio::task::spawn_blocking(move || list_exports(&source_id, &path))
            .await
            .map_err(|e| self.unavailable(format!("listing task failed: {}", e)))??;

        let mut values = Vec::new();
        for file in files {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| self.unavailable(format!("cannot read {}: {}", file.display(), e)))?;

            let records = decode_inventory(&content)
                .map_err(|reason| self.unavailable(format!("{}: {}", file.display(), reason)))?;
            debug!("{}: {} records", file.display(), records.len());
            values.extend(records);
        }

        Ok(validate_records(&self.source_id, values))
    }
}
