//! Report rendering.
//!
//! Renders a finished [`Report`] as an HTML page, Markdown or JSON. The
//! renderers only display what the report holds; they never re-classify.

use crate::analysis::summarize_by_source;
use crate::cli::OutputFormat;
use crate::error::AuditError;
use crate::models::{ClassifiedSnapshot, Report, ReportMetadata};
use anyhow::Result;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render the report in the requested format.
pub fn render(report: &Report, format: OutputFormat, title: &str) -> Result<String> {
    Ok(match format {
        OutputFormat::Html => generate_html_report(report, title),
        OutputFormat::Markdown => generate_markdown_report(report, title),
        OutputFormat::Json => generate_json_report(report)?,
    })
}

/// Write rendered report content to `path`.
pub fn write_report(content: &str, path: &Path) -> Result<(), AuditError> {
    std::fs::write(path, content).map_err(|source| AuditError::RenderFailure {
        path: path.to_path_buf(),
        source,
    })
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a self-contained HTML page with one tab per list.
pub fn generate_html_report(report: &Report, title: &str) -> String {
    let title = escape_html(title);
    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; color: #333; }}
        .metadata {{ background-color: #f5f5f5; padding: 10px 20px; border-radius: 5px; }}
        .warning {{ background-color: #fff3cd; border: 1px solid #ffe08a; padding: 10px 20px; border-radius: 5px; margin-top: 20px; }}
        .tabs input[type="radio"] {{ display: none; }}
        .tabs label {{ display: inline-block; padding: 10px 20px; margin-top: 30px; cursor: pointer; border: 1px solid #ddd; border-bottom: none; background-color: #f2f2f2; }}
        .tabs .panel {{ display: none; border-top: 1px solid #ddd; padding-top: 10px; }}
        #tab-remove:checked ~ #panel-remove, #tab-protected:checked ~ #panel-protected {{ display: block; }}
        #tab-remove:checked + label, #tab-protected:checked + label {{ background-color: #fff; font-weight: bold; }}
        table {{ border-collapse: collapse; width: 100%; }}
        th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
        th {{ background-color: #f2f2f2; }}
        td.num {{ text-align: right; }}
        footer {{ margin-top: 30px; font-size: 0.8em; color: #777; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
"#
    );

    html.push_str(&generate_html_metadata(report));
    html.push_str(&generate_html_failures(report.metadata()));

    html.push_str("    <div class=\"tabs\">\n");
    html.push_str("        <input type=\"radio\" name=\"tabs\" id=\"tab-remove\" checked>\n");
    html.push_str(&format!(
        "        <label for=\"tab-remove\">To Remove ({})</label>\n",
        report.to_remove().len()
    ));
    html.push_str("        <input type=\"radio\" name=\"tabs\" id=\"tab-protected\">\n");
    html.push_str(&format!(
        "        <label for=\"tab-protected\">Protected ({})</label>\n",
        report.protected().len()
    ));
    html.push_str(&generate_html_panel(
        "panel-remove",
        report.to_remove(),
        "No snapshots are past the retention threshold.",
    ));
    html.push_str(&generate_html_panel(
        "panel-protected",
        report.protected(),
        "No protected snapshots were found.",
    ));
    html.push_str("    </div>\n");

    html.push_str(&format!(
        "    <footer>Generated by snapaudit v{}</footer>\n</body>\n</html>\n",
        env!("CARGO_PKG_VERSION")
    ));

    html
}

fn generate_html_metadata(report: &Report) -> String {
    let metadata = report.metadata();
    let mut section = String::from("    <div class=\"metadata\">\n");

    let rows = [
        (
            "Evaluated at",
            metadata.evaluated_at.format(TIMESTAMP_FORMAT).to_string(),
        ),
        (
            "Retention threshold",
            format!("{} days", metadata.retention_days),
        ),
        ("Protected tag", metadata.protected_tag.clone()),
        ("Template patterns", metadata.template_patterns.join(", ")),
        ("Sources", metadata.sources.join(", ")),
        (
            "Reclaimable",
            format!(
                "{:.2} MB in {} snapshots",
                report.reclaimable_mb(),
                report.to_remove().len()
            ),
        ),
        (
            "Protected",
            format!(
                "{:.2} MB in {} snapshots",
                report.protected_mb(),
                report.protected().len()
            ),
        ),
        (
            "Skipped",
            format!(
                "{} template, {} within retention, {} malformed",
                metadata.excluded, metadata.retained, metadata.malformed_records
            ),
        ),
    ];

    for (label, value) in rows {
        section.push_str(&format!(
            "        <p><strong>{}:</strong> {}</p>\n",
            label,
            escape_html(&value)
        ));
    }

    section.push_str("    </div>\n");
    section
}

fn generate_html_failures(metadata: &ReportMetadata) -> String {
    if metadata.source_failures.is_empty() {
        return String::new();
    }

    let mut section = String::from("    <div class=\"warning\">\n");
    section.push_str("        <p><strong>Sources that could not be audited:</strong></p>\n");
    section.push_str("        <ul>\n");
    for failure in &metadata.source_failures {
        section.push_str(&format!(
            "            <li>{}: {}</li>\n",
            escape_html(&failure.source_id),
            escape_html(&failure.reason)
        ));
    }
    section.push_str("        </ul>\n    </div>\n");
    section
}

fn generate_html_panel(
    id: &str,
    snapshots: &[ClassifiedSnapshot],
    empty_message: &str,
) -> String {
    let mut panel = format!("        <div class=\"panel\" id=\"{}\">\n", id);

    if snapshots.is_empty() {
        panel.push_str(&format!("            <p>{}</p>\n        </div>\n", empty_message));
        return panel;
    }

    panel.push_str("            <table>\n");
    panel.push_str(
        "                <tr><th>Source</th><th>VM</th><th>Snapshot</th><th>Description</th>\
         <th>Size (MB)</th><th>Created</th><th>Age (days)</th></tr>\n",
    );

    for snapshot in snapshots {
        panel.push_str(&format!(
            "                <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td class=\"num\">{:.2}</td><td>{}</td><td class=\"num\">{}</td></tr>\n",
            escape_html(&snapshot.source_id),
            escape_html(&snapshot.vm_name),
            escape_html(&snapshot.snapshot_name),
            escape_html(&snapshot.snapshot_description),
            snapshot.size_mb,
            snapshot.created_at.format(TIMESTAMP_FORMAT),
            snapshot.age_days
        ));
    }

    panel.push_str("            </table>\n        </div>\n");
    panel
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, title: &str) -> String {
    let mut output = format!("# {}\n\n", title);

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_sources_section(report));
    output.push_str(&generate_snapshot_section(
        "To Remove",
        report.to_remove(),
        "No snapshots are past the retention threshold.",
    ));
    output.push_str(&generate_snapshot_section(
        "Protected",
        report.protected(),
        "No protected snapshots were found.",
    ));

    output.push_str("---\n\n");
    output.push_str(&format!(
        "*Report generated by snapaudit v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &Report) -> String {
    let metadata = report.metadata();
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Evaluated At:** {}\n",
        metadata.evaluated_at.format(TIMESTAMP_FORMAT)
    ));
    section.push_str(&format!(
        "- **Retention Threshold:** {} days\n",
        metadata.retention_days
    ));
    section.push_str(&format!("- **Protected Tag:** `{}`\n", metadata.protected_tag));
    section.push_str(&format!(
        "- **Template Patterns:** {}\n",
        metadata
            .template_patterns
            .iter()
            .map(|p| format!("`{}`", p))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    section.push_str(&format!(
        "- **Reclaimable:** {:.2} MB in {} snapshots\n",
        report.reclaimable_mb(),
        report.to_remove().len()
    ));
    section.push_str(&format!(
        "- **Protected:** {:.2} MB in {} snapshots\n",
        report.protected_mb(),
        report.protected().len()
    ));
    if metadata.malformed_records > 0 {
        section.push_str(&format!(
            "- **Malformed Records Skipped:** {}\n",
            metadata.malformed_records
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-source table and failure notice.
fn generate_sources_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Sources\n\n");
    section.push_str("| Source | To Remove | Protected | Reclaimable (MB) | Status |\n");
    section.push_str("|:---|:---:|:---:|---:|:---|\n");

    for summary in summarize_by_source(report) {
        section.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} |\n",
            escape_markdown_cell(&summary.source_id),
            summary.to_remove,
            summary.protected,
            summary.reclaimable_mb,
            if summary.failed { "failed" } else { "ok" }
        ));
    }
    section.push('\n');

    let failures = &report.metadata().source_failures;
    if !failures.is_empty() {
        section.push_str("> **Warning:** some sources could not be audited:\n");
        for failure in failures {
            section.push_str(&format!(
                "> - `{}`: {}\n",
                escape_markdown_cell(&failure.source_id),
                escape_markdown_cell(&failure.reason)
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate one snapshot list section.
fn generate_snapshot_section(
    heading: &str,
    snapshots: &[ClassifiedSnapshot],
    empty_message: &str,
) -> String {
    let mut section = format!("## {} ({})\n\n", heading, snapshots.len());

    if snapshots.is_empty() {
        section.push_str(empty_message);
        section.push_str("\n\n");
        return section;
    }

    section.push_str("| Source | VM | Snapshot | Description | Size (MB) | Created | Age (days) |\n");
    section.push_str("|:---|:---|:---|:---|---:|:---|---:|\n");

    for snapshot in snapshots {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {:.2} | {} | {} |\n",
            escape_markdown_cell(&snapshot.source_id),
            escape_markdown_cell(&snapshot.vm_name),
            escape_markdown_cell(&snapshot.snapshot_name),
            escape_markdown_cell(&snapshot.snapshot_description),
            snapshot.size_mb,
            snapshot.created_at.format(TIMESTAMP_FORMAT),
            snapshot.age_days
        ));
    }
    section.push('\n');

    section
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Aggregator, SourceBatch};
    use crate::config::PolicyConfig;
    use crate::models::Disposition;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn snapshot(source: &str, vm: &str, disposition: Disposition) -> ClassifiedSnapshot {
        ClassifiedSnapshot {
            source_id: source.to_string(),
            vm_name: vm.to_string(),
            snapshot_name: "pre-upgrade".to_string(),
            snapshot_description: "Before <kernel> update | v2".to_string(),
            size_bytes: 1_610_612_736,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            tags: BTreeSet::new(),
            size_mb: 1536.0,
            age_days: 45,
            disposition,
        }
    }

    fn create_test_report() -> Report {
        let mut aggregator = Aggregator::new(&PolicyConfig::default(), now());
        aggregator.merge(SourceBatch::failed("vc-down", "connection refused"));
        aggregator.merge(SourceBatch {
            source_id: "vc01".to_string(),
            snapshots: vec![
                snapshot("vc01", "web01", Disposition::Eligible),
                snapshot("vc01", "db01", Disposition::Protected),
            ],
            malformed: 1,
            failure: None,
        });
        aggregator.finalize()
    }

    #[test]
    fn test_generate_html_report() {
        let html = generate_html_report(&create_test_report(), "Fleet <Audit>");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Fleet &lt;Audit&gt;</title>"));
        assert!(html.contains("To Remove (1)"));
        assert!(html.contains("Protected (1)"));
        assert!(html.contains("<td>web01</td>"));
        assert!(html.contains("<td>db01</td>"));
        assert!(html.contains("Before &lt;kernel&gt; update | v2"));
        assert!(html.contains("1536.00"));
        assert!(html.contains("2024-05-01 08:00:00 UTC"));
        assert!(html.contains("vc-down: connection refused"));
        assert!(html.contains("14 days"));
    }

    #[test]
    fn test_html_sections_follow_report_lists() {
        let html = generate_html_report(&create_test_report(), "Audit");
        let remove_panel = html.find("id=\"panel-remove\"").unwrap();
        let protected_panel = html.find("id=\"panel-protected\"").unwrap();
        let web = html.find("<td>web01</td>").unwrap();
        let db = html.find("<td>db01</td>").unwrap();

        assert!(remove_panel < web && web < protected_panel);
        assert!(protected_panel < db);
    }

    #[test]
    fn test_empty_report_renders_placeholders() {
        let report = Aggregator::new(&PolicyConfig::default(), now()).finalize();

        let html = generate_html_report(&report, "Audit");
        assert!(html.contains("No snapshots are past the retention threshold."));
        assert!(!html.contains("class=\"warning\""));

        let markdown = generate_markdown_report(&report, "Audit");
        assert!(markdown.contains("## To Remove (0)"));
        assert!(markdown.contains("No protected snapshots were found."));
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report(), "Snapshot Audit Report");

        assert!(markdown.contains("# Snapshot Audit Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Sources"));
        assert!(markdown.contains("| vc01 | 1 | 1 | 1536.00 | ok |"));
        assert!(markdown.contains("| vc-down | 0 | 0 | 0.00 | failed |"));
        assert!(markdown.contains("## To Remove (1)"));
        assert!(markdown.contains("Before <kernel> update \\| v2"));
        assert!(markdown.contains("Malformed Records Skipped:** 1"));
    }

    #[test]
    fn test_markdown_escapes_source_ids_and_reasons() {
        let mut aggregator = Aggregator::new(&PolicyConfig::default(), now());
        aggregator.merge(SourceBatch::failed("east|west", "HTTP 500\nbackend | down"));
        let markdown = generate_markdown_report(&aggregator.finalize(), "Audit");

        assert!(markdown.contains("| east\\|west | 0 | 0 | 0.00 | failed |"));
        assert!(markdown.contains("> - `east\\|west`: HTTP 500 backend \\| down\n"));
        assert!(!markdown.contains("HTTP 500\n"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["to_remove"][0]["vm_name"], "web01");
        assert_eq!(value["protected"][0]["disposition"], "protected");
        assert_eq!(value["metadata"]["retention_days"], 14);
        assert_eq!(
            value["metadata"]["source_failures"][0]["source_id"],
            "vc-down"
        );
    }

    #[test]
    fn test_write_report_failure_is_render_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("report.html");

        let err = write_report("<html></html>", &path).unwrap_err();
        assert!(matches!(err, AuditError::RenderFailure { .. }));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.md");
        let content = render(&create_test_report(), OutputFormat::Markdown, "Audit").unwrap();

        write_report(&content, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
