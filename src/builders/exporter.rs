use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::core::document::SettingsDocument;

/// File formats a settings document can be written to or read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Hgrc,
    Json,
    Yaml,
    Toml,
}

impl ExportFormat {
    /// Guesses the format from a file extension. `.rc` files and files without
    /// a known extension are treated as hgrc.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(ExportFormat::Hgrc)
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hgrc" | "rc" | "ini" => Ok(ExportFormat::Hgrc),
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "toml" => Ok(ExportFormat::Toml),
            other => bail!("Unknown format '{other}' (expected hgrc, json, yaml or toml)"),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Hgrc => write!(f, "hgrc"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Yaml => write!(f, "yaml"),
            ExportFormat::Toml => write!(f, "toml"),
        }
    }
}

/// Renders `doc` in `format`.
pub fn render_document(doc: &SettingsDocument, format: ExportFormat) -> Result<String> {
    let content = match format {
        ExportFormat::Hgrc => doc.to_hgrc_string(),
        ExportFormat::Json => serde_json::to_string_pretty(doc).context("Failed to serialize to JSON")?,
        ExportFormat::Yaml => serde_yaml::to_string(doc).context("Failed to serialize to YAML")?,
        ExportFormat::Toml => toml::to_string_pretty(doc).context("Failed to serialize to TOML")?,
    };
    Ok(content)
}

/// Writes `doc` to `output`, picking the format from its extension when none
/// is given.
pub fn export_document(doc: &SettingsDocument, output: &Path, format: Option<ExportFormat>) -> Result<ExportFormat> {
    let format = format.unwrap_or_else(|| ExportFormat::from_path(output));
    let content = render_document(doc, format)?;
    fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(format)
}
