use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::builders::exporter::ExportFormat;
use crate::core::document::SettingsDocument;
use crate::core::parser::parse_str;

/// A trait that defines the behavior for reading settings from an external
/// file into a `SettingsDocument`.
///
/// This allows different importers (files in other formats, or an existing
/// hgrc) to be used interchangeably by the `import` command.
pub trait SettingsImporter {
    /// Reads `file_path` and returns its settings.
    ///
    /// When `format` is `None` it is guessed from the file extension.
    fn import_from_file(&mut self, file_path: &Path, format: Option<ExportFormat>) -> Result<SettingsDocument>;
}

/// A concrete implementation of `SettingsImporter` for handling file-based imports.
pub struct FileImporter;

impl FileImporter {
    pub fn new() -> Self {
        Self
    }

    /// Structured formats hold a map of section names to maps of settings.
    /// Booleans and numbers are converted to their hgrc spelling.
    fn parse_content(&self, content: &str, origin: &Path, format: ExportFormat) -> Result<SettingsDocument> {
        let doc = match format {
            // %include paths resolve against the imported file.
            ExportFormat::Hgrc => parse_str(content, origin)?,
            ExportFormat::Json => serde_json::from_str(content).context("Failed to parse JSON settings")?,
            ExportFormat::Yaml => serde_yaml::from_str(content).context("Failed to parse YAML settings")?,
            ExportFormat::Toml => toml::from_str(content).context("Failed to parse TOML settings")?,
        };
        Ok(doc)
    }
}

impl Default for FileImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsImporter for FileImporter {
    fn import_from_file(&mut self, file_path: &Path, format: Option<ExportFormat>) -> Result<SettingsDocument> {
        let format = format.unwrap_or_else(|| ExportFormat::from_path(file_path));
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read import file {}", file_path.display()))?;
        self.parse_content(&content, file_path, format)
            .with_context(|| format!("Failed to import {}", file_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_json_converts_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"ui": {"username": "Jane <jane@example.com>", "verbose": true}, "blackbox": {"maxfiles": 30}}"#,
        )
        .unwrap();

        let doc = FileImporter::new().import_from_file(&path, None).unwrap();
        assert_eq!(doc.get("ui", "verbose"), Some("True"));
        assert_eq!(doc.get("blackbox", "maxfiles"), Some("30"));
        let sections: Vec<&str> = doc.sections().map(|s| s.name()).collect();
        assert_eq!(sections, vec!["ui", "blackbox"]);
    }

    #[test]
    fn test_import_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("settings.yaml");
        fs::write(&yaml, "diff:\n  showfunc: false\n  git: 'True'\n").unwrap();
        let doc = FileImporter::new().import_from_file(&yaml, None).unwrap();
        assert_eq!(doc.get("diff", "showfunc"), Some("False"));
        assert_eq!(doc.get("diff", "git"), Some("True"));

        let toml_path = dir.path().join("settings.toml");
        fs::write(&toml_path, "[pager]\npager = \"less -FRX\"\n").unwrap();
        let doc = FileImporter::new().import_from_file(&toml_path, None).unwrap();
        assert_eq!(doc.get("pager", "pager"), Some("less -FRX"));
    }

    #[test]
    fn test_import_hgrc_and_explicit_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.conf");
        fs::write(&path, "[extensions]\nrebase =\n").unwrap();

        let doc = FileImporter::new()
            .import_from_file(&path, Some(ExportFormat::Hgrc))
            .unwrap();
        assert_eq!(doc.get("extensions", "rebase"), Some(""));
    }

    #[test]
    fn test_import_rejects_nested_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"ui": {"nested": {"deep": 1}}}"#).unwrap();
        assert!(FileImporter::new().import_from_file(&path, None).is_err());
    }
}
