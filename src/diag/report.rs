//! Text and JSON rendering of diagnostic bundles

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use super::runner::DiagnosticBundle;

const HEADER_RULE_WIDTH: usize = 80;
const COMMAND_RULE_WIDTH: usize = 60;

/// Report writing errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => f.write_str("text"),
            ReportFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}' (expected text or json)", other)),
        }
    }
}

/// Fixed-layout ASCII report
pub fn render_text(bundle: &DiagnosticBundle) -> String {
    let header_rule = "=".repeat(HEADER_RULE_WIDTH);
    let command_rule = "#".repeat(COMMAND_RULE_WIDTH);

    let mut out = String::new();
    out.push_str(&header_rule);
    out.push('\n');
    out.push_str("Cisco Diagnostic Report\n");
    out.push_str(&format!("Device: {}\n", bundle.device()));
    out.push_str(&format!("Hostname: {}\n", bundle.hostname()));
    out.push_str(&format!("Generated: {}\n", bundle.timestamp()));
    out.push_str(&header_rule);
    out.push_str("\n\n");

    for (command, output) in bundle.diagnostics() {
        out.push_str(&format!("\n{}\n", command_rule));
        out.push_str(&format!("# Command: {}\n", command));
        out.push_str(&format!("{}\n\n", command_rule));
        out.push_str(output);
        out.push_str("\n\n");
    }

    out
}

/// The bundle as JSON with two-space indentation
pub fn render_json(bundle: &DiagnosticBundle) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(bundle)
}

pub fn render(bundle: &DiagnosticBundle, format: ReportFormat) -> Result<String, ReportError> {
    Ok(match format {
        ReportFormat::Text => render_text(bundle),
        ReportFormat::Json => render_json(bundle)?,
    })
}

fn file_safe(part: &str) -> String {
    part.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// `cisco_report_{hostname}_{timestamp}.{ext}`
pub fn default_filename(bundle: &DiagnosticBundle, format: ReportFormat) -> String {
    let hostname = if bundle.hostname().is_empty() {
        "unknown"
    } else {
        bundle.hostname()
    };
    format!(
        "cisco_report_{}_{}.{}",
        file_safe(hostname),
        file_safe(bundle.timestamp()),
        format.extension()
    )
}

/// Where a report goes: the explicit path, or the default file name inside
/// `dir` (current directory when `None`)
pub fn report_path(
    bundle: &DiagnosticBundle,
    format: ReportFormat,
    explicit: Option<&Path>,
    dir: Option<&Path>,
) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let name = default_filename(bundle, format);
            dir.map(|d| d.join(&name)).unwrap_or_else(|| PathBuf::from(name))
        }
    }
}

/// Render and write the report, creating parent directories as needed
pub async fn write_report(
    bundle: &DiagnosticBundle,
    format: ReportFormat,
    path: &Path,
) -> Result<PathBuf, ReportError> {
    let contents = render(bundle, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, contents).await?;

    match format {
        ReportFormat::Text => info!("Report saved to: {}", path.display()),
        ReportFormat::Json => info!("JSON report saved to: {}", path.display()),
    }
    Ok(path.to_path_buf())
}
