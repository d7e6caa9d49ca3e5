use crate::aggregate::GroupStats;
use crate::models::{Dimension, Report, SkippedEntry};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Write the report as pretty JSON, creating parent directories as needed
pub fn write_report(report: &Report, path: &Path) -> Result<()> {
    let json_content =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, json_content)
        .with_context(|| format!("Failed to write report to: {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

/// Print the report in the specified format
pub fn print_report(report: &Report, format: OutputFormat) {
    match format {
        OutputFormat::Plain => println!("{}", render_plain(report)),
        OutputFormat::Json => print_json(report),
    }
}

/// Render the report as plain text
fn render_plain(report: &Report) -> String {
    let mut out = String::new();

    out.push_str("=== SUMMARY ===\n");
    out.push_str(&format!(
        "Evaluated: {}  Skipped: {}  Failed: {}\n\n",
        report.results.len(),
        report.skipped.len() - report.failed_count(),
        report.failed_count()
    ));

    for (title, family) in [
        ("BY MODEL", &report.aggregates.by_model),
        ("BY PROMPT VERSION", &report.aggregates.by_prompt_version),
        ("BY MODEL AND PROMPT VERSION", &report.aggregates.by_model_and_prompt_version),
    ] {
        out.push_str(&format!("📊 {}\n", title));
        out.push_str(&render_family(family));
        out.push('\n');
    }

    if !report.results.is_empty() {
        out.push_str("📝 DETAILED RESULTS\n");
        for record in &report.results {
            out.push_str(&format!(
                "{} [{} / {}]\n",
                record.id, record.model, record.prompt_version
            ));
            for dimension in Dimension::ALL {
                let score = record.score(dimension);
                out.push_str(&format!(
                    "  • {}: {} - {}\n",
                    dimension,
                    score.value(),
                    score.reasoning()
                ));
            }
        }
        out.push('\n');
    }

    if !report.skipped.is_empty() {
        out.push_str("⚠️  SKIPPED\n");
        for entry in &report.skipped {
            let label = match entry {
                SkippedEntry::Invalid { index, .. } => format!("input #{}", index),
                SkippedEntry::Failed { id, stage, .. } => format!("{} (after {})", id, stage),
            };
            out.push_str(&format!("  {}: {}\n", label, entry.reason()));
        }
    }

    out
}

/// Render one bucket family as a table
fn render_family(family: &BTreeMap<String, GroupStats>) -> String {
    if family.is_empty() {
        return "No statistics available.\n".to_string();
    }

    let mut out = format!(
        "{:<40} {:<10} {:>6} {:>8} {:>6} {:>6}\n",
        "Group", "Dimension", "Count", "Mean", "Min", "Max"
    );
    out.push_str(&format!("{}\n", "-".repeat(81)));

    for (key, stats) in family {
        for dimension in Dimension::ALL {
            let dim = stats.dimension(dimension);
            out.push_str(&format!(
                "{:<40} {:<10} {:>6} {:>8.2} {:>6} {:>6}\n",
                key, dimension, dim.count, dim.mean, dim.min, dim.max
            ));
        }
    }

    out
}

/// Print the report in JSON format
fn print_json(report: &Report) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report to JSON: {}", e),
    }
}
