//! SnapAudit - Snapshot retention auditor
//!
//! A CLI tool that collects snapshot inventory from virtualization
//! management endpoints, classifies every snapshot against a fixed
//! retention policy and writes a report of removal candidates and
//! protected snapshots. It never deletes anything.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, report could not be written, etc.)
//!   2 - Removal candidates found and --fail-on-eligible set

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod source;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, SourceKind, DEFAULT_CONFIG_FILE};
use models::Report;
use pipeline::PipelineOptions;
use source::Connector;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The merged configuration decides the log level, so it is loaded first
    let (config, origin) = match prepare_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(config.log_level(args.quiet));

    info!("SnapAudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run_audit(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Audit failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .snapaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to add your sources and adjust the retention policy.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete audit workflow. Returns the process exit code.
async fn run_audit(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let quiet = args.quiet;

    config.validate()?;

    let evaluated_at = args.evaluation_time();
    info!(
        "Evaluating {} sources as of {}",
        config.sources.len(),
        evaluated_at.to_rfc3339()
    );

    // Handle --dry-run: show what would be audited and exit
    if args.dry_run {
        return handle_dry_run(&config);
    }

    // Step 1: Build connectors
    let connectors = config
        .sources
        .iter()
        .map(Connector::from_config)
        .collect::<Result<Vec<_>>>()?;

    // Step 2: Fetch, classify and aggregate
    if !quiet {
        println!(
            "🔎 Auditing {} source(s), retention threshold {} days...",
            connectors.len(),
            config.policy.retention_days
        );
    }

    let options = PipelineOptions {
        policy: config.policy.clone(),
        evaluated_at,
        concurrency: config.general.concurrency,
        show_progress: !quiet,
    };
    let report = pipeline::run(&connectors, &options).await;

    // Step 3: Render and write the report
    if !quiet {
        println!("\n📝 Generating report...");
    }
    let output_path = save_report(
        &report,
        &config,
        args.dump_on_failure,
        &mut std::io::stderr(),
    )?;

    if !quiet {
        print_summary(&report, &connectors);
        println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
        println!(
            "\n✅ Audit complete! Report saved to: {}",
            output_path.display()
        );
    }

    let code = exit_code(&report, args.fail_on_eligible);
    if code == 2 {
        eprintln!(
            "\n⛔ {} snapshot(s) past the retention threshold. Failing (exit code 2).",
            report.to_remove().len()
        );
    }

    Ok(code)
}

/// Exit code of a run that produced a report.
fn exit_code(report: &Report, fail_on_eligible: bool) -> i32 {
    if fail_on_eligible && !report.to_remove().is_empty() {
        2
    } else {
        0
    }
}

/// Render the report and write it to the configured output.
///
/// When the write fails and `dump_on_failure` is set, the full report is
/// written as JSON to `diagnostics` before the error is returned.
fn save_report(
    report: &Report,
    config: &Config,
    dump_on_failure: bool,
    diagnostics: &mut impl Write,
) -> Result<PathBuf> {
    let output_path = PathBuf::from(&config.general.output);
    let content = report::render(report, config.report.format, &config.report.title)?;

    if let Err(e) = report::write_report(&content, &output_path) {
        if dump_on_failure {
            if let Err(dump_err) = dump_report(report, diagnostics) {
                error!("Failed to dump report for diagnostics: {:#}", dump_err);
            }
        }
        return Err(e.into());
    }

    Ok(output_path)
}

/// Write the full report as JSON.
fn dump_report(report: &Report, out: &mut impl Write) -> Result<()> {
    let json = report::generator::generate_json_report(report)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

/// Print the console summary of a finished run.
fn print_summary(report: &Report, connectors: &[Connector]) {
    let metadata = report.metadata();

    println!("\n📊 Audit Summary:");
    println!(
        "   Sources audited: {}/{}",
        connectors.len() - metadata.source_failures.len(),
        connectors.len()
    );
    println!(
        "   🗑️  To remove: {} ({:.2} MB)",
        report.to_remove().len(),
        report.reclaimable_mb()
    );
    println!(
        "   🔒 Protected: {} ({:.2} MB)",
        report.protected().len(),
        report.protected_mb()
    );
    println!(
        "   Skipped: {} template, {} within retention, {} malformed",
        metadata.excluded, metadata.retained, metadata.malformed_records
    );

    let largest = analysis::largest_snapshots(report.to_remove(), 3);
    if !largest.is_empty() {
        println!("   Largest removal candidates:");
        for snapshot in largest {
            println!(
                "     - {}/{} \"{}\" {:.2} MB, {} days old",
                snapshot.source_id,
                snapshot.vm_name,
                snapshot.snapshot_name,
                snapshot.size_mb,
                snapshot.age_days
            );
        }
    }

    if report.has_source_failures() {
        println!("   ⚠️  Sources not audited:");
        for failure in &metadata.source_failures {
            println!("     - {}: {}", failure.source_id, failure.reason);
        }
    }
}

/// Handle --dry-run: print the resolved sources and policy, contact nothing.
fn handle_dry_run(config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: no sources will be contacted.\n");

    println!("   Policy:");
    println!(
        "     Template patterns: {}",
        config.policy.template_patterns.join(", ")
    );
    println!("     Protected tag: {}", config.policy.protected_tag);
    println!(
        "     Retention threshold: {} days",
        config.policy.retention_days
    );

    println!("\n   Sources ({}):", config.sources.len());
    for source in &config.sources {
        let kind = match source.kind {
            SourceKind::Http => "http",
            SourceKind::File => "file",
        };
        println!("     📡 {} [{}] {}", source.id, kind, source.location);
    }

    println!(
        "\n   Report: {} ({:?})",
        config.general.output, config.report.format
    );
    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Where the configuration came from, logged once tracing is set up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    /// The default file exists but could not be loaded.
    Fallback(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => {
                info!("Loaded default config from {}", DEFAULT_CONFIG_FILE)
            }
            ConfigOrigin::Builtin => debug!("No config file found, using defaults"),
            ConfigOrigin::Fallback(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load the configuration and apply the command-line overrides.
fn prepare_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    let (mut config, origin) = load_config(args)?;
    config.merge_with_args(args)?;
    Ok((config, origin))
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Builtin)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Fallback(e))),
    }
}
