//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SnapAudit - snapshot retention auditor
///
/// Collects snapshot inventory from one or more management endpoints,
/// classifies every snapshot against the retention policy and writes an
/// HTML, Markdown or JSON report of removal candidates and protected
/// snapshots. Nothing is ever deleted.
///
/// Examples:
///   snapaudit --config fleet.toml
///   snapaudit --source vc01=https://vc01.example.com/inventory
///   snapaudit --source lab=./exports/lab.json --retention-days 30 --format markdown
///   snapaudit --config fleet.toml --dry-run
///   snapaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .snapaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Additional source to audit, as ID=LOCATION (repeatable)
    ///
    /// http(s) locations are inventory endpoints, anything else is a JSON
    /// export file or directory.
    #[arg(short, long = "source", value_name = "ID=LOCATION")]
    pub sources: Vec<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (html, markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Age in days beyond which unprotected snapshots are flagged
    #[arg(long, value_name = "DAYS", env = "SNAPAUDIT_RETENTION_DAYS")]
    pub retention_days: Option<u32>,

    /// VM tag marking snapshots that must never be removed
    #[arg(long, value_name = "TAG")]
    pub protected_tag: Option<String>,

    /// VM name fragments identifying template VMs (comma-separated)
    ///
    /// Example: --template-patterns VMT,Template,Templ
    #[arg(long, value_name = "PATTERNS", value_delimiter = ',')]
    pub template_patterns: Option<Vec<String>>,

    /// Number of sources fetched concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Evaluate snapshot ages as of this RFC 3339 time instead of now
    #[arg(long, value_name = "TIME")]
    pub as_of: Option<DateTime<Utc>>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the resolved sources and policy without contacting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 2 when the report lists any removal candidate
    #[arg(long)]
    pub fail_on_eligible: bool,

    /// Dump the report as JSON to stderr if it cannot be written
    #[arg(long)]
    pub dump_on_failure: bool,

    /// Generate a default .snapaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// HTML page with one tab per list (default)
    #[default]
    Html,
    /// Markdown format
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if let Some(ref config_path) = self.config {
            if !config_path.is_file() {
                return Err(format!(
                    "Config file does not exist: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }

    /// The time snapshot ages are measured against.
    pub fn evaluation_time(&self) -> DateTime<Utc> {
        self.as_of.unwrap_or_else(Utc::now)
    }
}
