use anyhow::{Context, Result, bail};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::core::document::render_item;

/// What a line of an hgrc is, as far as editing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Header(String),
    /// An assignment in the given section.
    Item { section: String, key: String },
    /// An indented line continuing the preceding item.
    Continuation,
    /// Comments, blank lines, directives and anything else left untouched.
    Other,
}

/// Edits an hgrc file line by line so that comments, blank lines and
/// unrelated settings survive a `set` or `unset`.
#[derive(Debug)]
pub struct HgrcEditor {
    path: PathBuf,
    lines: Vec<String>,
}

impl HgrcEditor {
    /// Loads `path`; a missing file starts out empty.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        Ok(Self::from_text(path, &text))
    }

    pub fn from_text(path: &Path, text: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn classify(&self) -> Vec<LineKind> {
        let mut kinds = Vec::with_capacity(self.lines.len());
        let mut section: Option<String> = None;
        let mut in_item = false;

        for line in &self.lines {
            let trimmed = line.trim();
            let kind = if in_item && line.starts_with(char::is_whitespace) && !trimmed.is_empty() {
                LineKind::Continuation
            } else if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                LineKind::Other
            } else if let Some(rest) = trimmed.strip_prefix('[')
                && let Some(end) = rest.find(']')
            {
                let name = rest[..end].trim().to_string();
                section = Some(name.clone());
                LineKind::Header(name)
            } else if !trimmed.starts_with('%')
                && !line.starts_with(char::is_whitespace)
                && let (Some(name), Some((key, _))) = (&section, line.split_once('='))
            {
                LineKind::Item {
                    section: name.clone(),
                    key: key.trim().to_string(),
                }
            } else {
                LineKind::Other
            };

            in_item = match kind {
                LineKind::Item { .. } | LineKind::Continuation => true,
                // Column-0 comments do not end a continuation.
                LineKind::Other => in_item && (line.starts_with('#') || line.starts_with(';')),
                LineKind::Header(_) => false,
            };
            kinds.push(kind);
        }
        kinds
    }

    /// Index one past the item at `start` and its continuation lines.
    fn item_end(kinds: &[LineKind], start: usize) -> usize {
        let mut end = start + 1;
        while end < kinds.len() && kinds[end] == LineKind::Continuation {
            end += 1;
        }
        end
    }

    /// Sets `key` in `section`. The last existing assignment is rewritten in
    /// place; otherwise the key is added at the end of the section, or a new
    /// section is appended.
    ///
    /// Names that would read back as something else (a comment, a directive,
    /// a continuation or a different key) are refused.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        check_names(section, key)?;
        let kinds = self.classify();
        let rendered = render_item(key, value);
        let is_target =
            |kind: &LineKind| matches!(kind, LineKind::Item { section: s, key: k } if s == section && k == key);

        if let Some(start) = kinds.iter().rposition(is_target) {
            let end = Self::item_end(&kinds, start);
            self.lines.splice(start..end, rendered);
            return Ok(());
        }

        let last_header = kinds
            .iter()
            .rposition(|k| matches!(k, LineKind::Header(name) if name == section));
        if let Some(header) = last_header {
            let mut insert_at = header + 1;
            for (i, kind) in kinds.iter().enumerate().skip(header + 1) {
                match kind {
                    LineKind::Header(_) => break,
                    LineKind::Item { .. } | LineKind::Continuation => insert_at = i + 1,
                    LineKind::Other => {}
                }
            }
            self.lines.splice(insert_at..insert_at, rendered);
            return Ok(());
        }

        if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
            self.lines.push(String::new());
        }
        self.lines.push(format!("[{section}]"));
        self.lines.extend(rendered);
        Ok(())
    }

    /// Removes every assignment of `key` in `section`. Returns whether any
    /// line was removed.
    pub fn unset(&mut self, section: &str, key: &str) -> bool {
        let kinds = self.classify();
        let mut removed = false;
        let mut i = kinds.len();
        while i > 0 {
            i -= 1;
            if matches!(&kinds[i], LineKind::Item { section: s, key: k } if s == section && k == key) {
                let end = Self::item_end(&kinds, i);
                self.lines.drain(i..end);
                removed = true;
            }
        }
        removed
    }

    /// Writes the file atomically: a uniquely named temporary file next to the
    /// target is renamed over it.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "hgrc".to_string());
        let tmp = self.path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        fs::write(&tmp, self.text()).with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        debug!(path = %self.path.display(), "wrote config file");
        Ok(())
    }
}

/// Checks that `[section]` and `key = ...` parse back to the same names.
pub fn check_names(section: &str, key: &str) -> Result<()> {
    if section.is_empty()
        || section.trim() != section
        || section.contains(['[', ']', '\n', '\r'])
    {
        bail!("Invalid section name '{section}'");
    }
    if key.is_empty()
        || key.trim() != key
        || key.contains(['=', '\n', '\r'])
        || key.starts_with(['#', ';', '[', '%'])
    {
        bail!("Invalid key '{key}' in section [{section}]");
    }
    Ok(())
}
