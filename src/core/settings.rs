use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::builders::patterns::MergePatterns;
use crate::core::document::SettingsDocument;
use crate::core::hostsecurity::HostSecurity;
use crate::core::values::parse_list;

static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>[^<]*?)\s*<(?P<email>[^<>\s]+)>\s*$").expect("identity regex is valid")
});

/// The `ui.username` value split into its display name and email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: Option<String>,
}

impl Identity {
    /// Parses `Name <email>`. A value without an `<email>` part is kept as a
    /// bare name; an empty value yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match IDENTITY_RE.captures(value) {
            Some(caps) => Some(Self {
                name: caps["name"].to_string(),
                email: Some(caps["email"].to_string()),
            }),
            None => Some(Self {
                name: value.to_string(),
                email: None,
            }),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) if self.name.is_empty() => write!(f, "<{email}>"),
            Some(email) => write!(f, "{} <{email}>", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiSettings {
    pub username: Option<Identity>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSettings {
    pub showfunc: bool,
    pub git: bool,
    pub nodates: bool,
    pub ignorews: bool,
}

impl DiffSettings {
    /// Boolean keys of `[diff]` this view reads.
    pub const BOOLEAN_KEYS: [&'static str; 4] = ["showfunc", "git", "nodates", "ignorews"];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    /// Explicit module path, if the value named one.
    pub path: Option<String>,
    pub enabled: bool,
}

impl Extension {
    /// Interprets one `[extensions]` entry. An empty value enables the
    /// extension; a value starting with `!` disables it; anything else is the
    /// path to load it from.
    pub fn from_entry(key: &str, value: &str) -> Self {
        let name = key
            .strip_prefix("hgext.")
            .or_else(|| key.strip_prefix("hgext/"))
            .unwrap_or(key)
            .to_string();
        let value = value.trim();
        let (enabled, path) = match value.strip_prefix('!') {
            Some(rest) => (false, rest.trim()),
            None => (true, value),
        };
        Self {
            name,
            path: (!path.is_empty()).then(|| path.to_string()),
            enabled,
        }
    }
}

/// `[extensions]` in config order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    pub entries: Vec<Extension>,
}

impl Extensions {
    pub fn from_document(doc: &SettingsDocument) -> Self {
        Self {
            entries: doc
                .items("extensions")
                .map(|(k, v)| Extension::from_entry(k, v))
                .collect(),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Extension> {
        self.entries.iter().filter(|e| e.enabled)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled().any(|e| e.name == name)
    }
}

/// `[color]` label styles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorSettings {
    pub mode: Option<String>,
    pub styles: Vec<(String, Vec<String>)>,
}

impl ColorSettings {
    pub fn from_document(doc: &SettingsDocument) -> Self {
        let mode = doc
            .get("color", "mode")
            .or_else(|| doc.get("ui", "color"))
            .map(str::to_string);
        let styles = doc
            .items("color")
            .filter(|(label, _)| *label != "mode")
            .map(|(label, style)| {
                (
                    label.to_string(),
                    style.split_whitespace().map(str::to_string).collect(),
                )
            })
            .collect();
        Self { mode, styles }
    }

    pub fn style(&self, label: &str) -> Option<&[String]> {
        self.styles
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, effects)| effects.as_slice())
    }

    /// Styles for diff output labels (`diff.*`).
    pub fn diff_styles(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.styles
            .iter()
            .filter(|(label, _)| label.starts_with("diff."))
            .map(|(label, effects)| (label.as_str(), effects.as_slice()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagerSettings {
    pub command: Option<String>,
    /// Commands that never page.
    pub ignore: Vec<String>,
}

impl PagerSettings {
    pub fn from_document(doc: &SettingsDocument) -> Self {
        Self {
            command: doc.get("pager", "pager").map(str::to_string),
            ignore: doc.get("pager", "ignore").map(parse_list).unwrap_or_default(),
        }
    }
}

/// Typed view over the parts of an hgrc this crate understands.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub ui: UiSettings,
    pub diff: DiffSettings,
    pub extensions: Extensions,
    pub color: ColorSettings,
    pub pager: PagerSettings,
    pub merge_patterns: MergePatterns,
    pub host_security: HostSecurity,
}

impl Settings {
    pub fn from_document(doc: &SettingsDocument) -> Result<Self> {
        let ui = UiSettings {
            username: doc.get("ui", "username").and_then(Identity::parse),
            verbose: doc.get_bool("ui", "verbose", false)?,
        };
        let diff = DiffSettings {
            showfunc: doc.get_bool("diff", "showfunc", false)?,
            git: doc.get_bool("diff", "git", false)?,
            nodates: doc.get_bool("diff", "nodates", false)?,
            ignorews: doc.get_bool("diff", "ignorews", false)?,
        };
        let merge_patterns = MergePatterns::from_document(doc)?;
        let host_security = HostSecurity::from_document(doc).context("Invalid [hostsecurity] settings")?;

        Ok(Self {
            ui,
            diff,
            extensions: Extensions::from_document(doc),
            color: ColorSettings::from_document(doc),
            pager: PagerSettings::from_document(doc),
            merge_patterns,
            host_security,
        })
    }
}
