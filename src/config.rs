//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration from
//! `.snapaudit.toml` files.

use crate::cli::{Args, OutputFormat};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".snapaudit.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Retention policy parameters.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Management endpoints to audit, in processing order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of sources fetched at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "snapshot_report.html".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Parameters of the fixed classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// VM name fragments marking template VMs (case-insensitive).
    #[serde(default = "default_template_patterns")]
    pub template_patterns: Vec<String>,

    /// VM tag that protects all of the VM's snapshots (case-sensitive).
    #[serde(default = "default_protected_tag")]
    pub protected_tag: String,

    /// Snapshots strictly older than this many days are removal candidates.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            template_patterns: default_template_patterns(),
            protected_tag: default_protected_tag(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_template_patterns() -> Vec<String> {
    vec!["VMT", "Template", "Templ"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_protected_tag() -> String {
    "PersistantSnapshot".to_string()
}

fn default_retention_days() -> u32 {
    14
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Title shown at the top of the report.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            title: default_title(),
        }
    }
}

fn default_title() -> String {
    "Snapshot Audit Report".to_string()
}

/// How a source is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Inventory HTTP endpoint.
    #[default]
    Http,
    /// JSON export file or directory of exports.
    File,
}

/// A single management endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Identifier used as provenance in the report.
    pub id: String,

    #[serde(default)]
    pub kind: SourceKind,

    /// Base URL for HTTP sources, path for file sources.
    pub location: String,

    /// Basic auth user name (HTTP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Environment variable holding the basic auth password (HTTP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Request timeout in seconds (HTTP only).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    60
}

impl SourceConfig {
    /// Parse a `ID=LOCATION` command-line source.
    ///
    /// `http://` and `https://` locations become HTTP sources, anything else
    /// is treated as a file path.
    pub fn from_arg(arg: &str) -> Result<Self> {
        let (id, location) = arg
            .split_once('=')
            .with_context(|| format!("Invalid source '{}': expected ID=LOCATION", arg))?;

        let id = id.trim();
        let location = location.trim();
        if id.is_empty() || location.is_empty() {
            bail!("Invalid source '{}': ID and LOCATION must not be empty", arg);
        }

        let kind = if is_http_url(location) {
            SourceKind::Http
        } else {
            SourceKind::File
        };

        Ok(Self {
            id: id.to_string(),
            kind,
            location: location.to_string(),
            username: None,
            password_env: None,
            timeout_seconds: default_timeout(),
        })
    }
}

fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &Args) -> Result<()> {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref patterns) = args.template_patterns {
            self.policy.template_patterns = patterns.clone();
        }
        if let Some(ref tag) = args.protected_tag {
            self.policy.protected_tag = tag.clone();
        }
        if let Some(days) = args.retention_days {
            self.policy.retention_days = days;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }

        // Command-line sources are appended after the configured ones
        for arg in &args.sources {
            self.sources.push(SourceConfig::from_arg(arg)?);
        }

        Ok(())
    }

    /// Log level for the run, once the CLI flags have been merged in.
    ///
    /// `--quiet` wins over a `verbose` setting from either source.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Check the merged configuration before a run.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("No sources configured. Add [[sources]] to the config file or use --source ID=LOCATION");
        }

        if self.general.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        if self
            .policy
            .template_patterns
            .iter()
            .any(|p| p.trim().is_empty())
        {
            bail!("Template patterns must not be empty");
        }

        if self.policy.protected_tag.is_empty() {
            bail!("Protected tag name must not be empty");
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                bail!("Source id must not be empty");
            }
            if !seen.insert(source.id.as_str()) {
                bail!("Duplicate source id: {}", source.id);
            }
            if source.kind == SourceKind::Http && !is_http_url(&source.location) {
                bail!(
                    "Source '{}' location must start with 'http://' or 'https://'",
                    source.id
                );
            }
            if source.timeout_seconds == 0 {
                bail!("Source '{}' timeout must be at least 1 second", source.id);
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.sources.push(SourceConfig {
            id: "vcenter-01".to_string(),
            kind: SourceKind::Http,
            location: "https://vcenter-01.example.com/inventory".to_string(),
            username: Some("auditor".to_string()),
            password_env: Some("SNAPAUDIT_VCENTER_01_PASSWORD".to_string()),
            timeout_seconds: default_timeout(),
        });
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn file_source(id: &str) -> SourceConfig {
        SourceConfig::from_arg(&format!("{}=./inventory/{}.json", id, id)).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy.retention_days, 14);
        assert_eq!(config.policy.protected_tag, "PersistantSnapshot");
        assert_eq!(
            config.policy.template_patterns,
            vec!["VMT", "Template", "Templ"]
        );
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.report.format, OutputFormat::Html);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.html"
verbose = true

[policy]
retention_days = 30
protected_tag = "KeepForever"

[report]
format = "markdown"

[[sources]]
id = "vc-east"
location = "https://vc-east.example.com/inventory"
username = "auditor"
password_env = "VC_EAST_PASSWORD"

[[sources]]
id = "lab"
kind = "file"
location = "exports/lab.json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.html");
        assert!(config.general.verbose);
        assert_eq!(config.policy.retention_days, 30);
        assert_eq!(config.policy.protected_tag, "KeepForever");
        // Unset policy fields keep their defaults
        assert_eq!(config.policy.template_patterns.len(), 3);
        assert_eq!(config.report.format, OutputFormat::Markdown);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].kind, SourceKind::Http);
        assert_eq!(config.sources[0].timeout_seconds, 60);
        assert_eq!(config.sources[1].kind, SourceKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_from_arg() {
        let http = SourceConfig::from_arg("vc01=https://vc01.local/api").unwrap();
        assert_eq!(http.id, "vc01");
        assert_eq!(http.kind, SourceKind::Http);

        let file = SourceConfig::from_arg("lab = exports/lab.json").unwrap();
        assert_eq!(file.id, "lab");
        assert_eq!(file.kind, SourceKind::File);
        assert_eq!(file.location, "exports/lab.json");

        assert!(SourceConfig::from_arg("no-separator").is_err());
        assert!(SourceConfig::from_arg("=exports/lab.json").is_err());
    }

    #[test]
    fn test_validation_rejects_bad_config() {
        let mut config = Config::default();
        assert!(config.validate().is_err(), "no sources");

        config.sources.push(file_source("a"));
        assert!(config.validate().is_ok());

        config.sources.push(file_source("a"));
        assert!(config.validate().is_err(), "duplicate id");
        config.sources.pop();

        config.policy.template_patterns.push("  ".to_string());
        assert!(config.validate().is_err(), "blank pattern");
        config.policy.template_patterns.pop();

        config.policy.protected_tag.clear();
        assert!(config.validate().is_err(), "empty tag");
        config.policy.protected_tag = default_protected_tag();

        config.general.concurrency = 0;
        assert!(config.validate().is_err(), "zero concurrency");
        config.general.concurrency = 1;

        config.sources.push(SourceConfig {
            kind: SourceKind::Http,
            ..file_source("b")
        });
        assert!(config.validate().is_err(), "http source with file path");
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "snapaudit",
            "--source",
            "vc02=https://vc02.local",
            "--retention-days",
            "7",
            "--template-patterns",
            "gold,base",
            "--format",
            "json",
        ]);

        let mut config = Config::default();
        config.sources.push(file_source("vc01"));
        config.merge_with_args(&args).unwrap();

        assert_eq!(config.policy.retention_days, 7);
        assert_eq!(config.policy.template_patterns, vec!["gold", "base"]);
        assert_eq!(config.policy.protected_tag, "PersistantSnapshot");
        assert_eq!(config.report.format, OutputFormat::Json);
        let ids: Vec<_> = config.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["vc01", "vc02"]);
    }

    #[test]
    fn test_log_level_follows_verbose_setting() {
        let mut from_file: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::parse_from(["snapaudit", "--source", "a=x.json"]);

        from_file.merge_with_args(&args).unwrap();
        assert_eq!(from_file.log_level(false), tracing::Level::DEBUG);
        assert_eq!(from_file.log_level(true), tracing::Level::ERROR);

        let mut plain = Config::default();
        plain.merge_with_args(&args).unwrap();
        assert_eq!(plain.log_level(false), tracing::Level::INFO);

        let verbose_args = Args::parse_from(["snapaudit", "-v", "--source", "a=x.json"]);
        plain.merge_with_args(&verbose_args).unwrap();
        assert_eq!(plain.log_level(false), tracing::Level::DEBUG);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[policy]"));
        assert!(toml_str.contains("[[sources]]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.policy, PolicyConfig::default());
        assert!(parsed.validate().is_ok());
    }
}
