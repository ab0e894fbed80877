use anyhow::Result;
use std::fmt;

use crate::builders::patterns::MergePattern;
use crate::core::document::{Location, SettingsDocument};
use crate::core::hostsecurity::{Fingerprint, MinimumProtocol};
use crate::core::settings::{DiffSettings, Extension, Identity};
use crate::core::values::{parse_bool, parse_list};

/// Extensions shipped with Mercurial, loadable by name alone.
const BUNDLED_EXTENSIONS: &[&str] = &[
    "absorb", "acl", "amend", "automv", "beautifygraph", "blackbox", "bugzilla", "censor",
    "children", "churn", "clonebundles", "closehead", "color", "commitextras", "convert", "eol",
    "extdiff", "factotum", "fastannotate", "fetch", "fix", "fsmonitor", "githelp", "gpg",
    "graphlog", "hgk", "highlight", "histedit", "infinitepush", "journal", "keyword",
    "largefiles", "lfs", "logtoprocess", "mq", "narrow", "notify", "pager", "patchbomb",
    "phabricator", "purge", "rebase", "record", "releasenotes", "relink", "remotefilelog",
    "remotenames", "schemes", "share", "shelve", "show", "sparse", "split", "sqlitestore",
    "strip", "transplant", "uncommit", "win32mbcs", "win32text", "zeroconf",
];

const COLORS: &[&str] = &["black", "red", "green", "yellow", "blue", "magenta", "cyan", "white"];

const EFFECTS: &[&str] = &[
    "none", "bold", "italic", "underline", "inverse", "dim", "blink", "standout",
];

const INTERNAL_TOOLS: &[&str] = &[
    "dump", "fail", "forcedump", "local", "merge", "merge-local", "merge-other", "merge3",
    "mergediff", "other", "prompt", "tagmerge", "union",
];

/// Boolean settings checked wherever they appear.
const BOOLEAN_SETTINGS: &[(&str, &str)] = &[("ui", "verbose"), ("ui", "quiet"), ("ui", "debug")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single finding about a settings document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.location {
            Some(location) => write!(f, "{location}: {level}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// The `ConfigValidator` trait defines the interface for checking a
/// settings document for values its consumers would reject or misread.
pub trait ConfigValidator {
    /// Checks the whole document and returns every issue found.
    fn validate_config(&self, config: &SettingsDocument) -> Result<Vec<Issue>>;

    /// Checks one `[merge-patterns]` entry.
    fn validate_pattern(&self, config: &SettingsDocument, pattern: &str, tool: &str) -> Vec<String>;
}

/// The checks `validate` runs. Syntax errors have already been rejected by
/// the parser; this looks at what the values mean.
pub struct StandardValidator;

impl StandardValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_username(&self, value: &str) -> Option<(Severity, String)> {
        match Identity::parse(value) {
            None => Some((Severity::Error, "ui.username is empty".to_string())),
            Some(Identity { email: None, .. }) => Some((
                Severity::Warning,
                format!("ui.username '{value}' should have the form 'Name <email>'"),
            )),
            Some(_) => None,
        }
    }

    fn check_extension(&self, key: &str, value: &str) -> Option<String> {
        let extension = Extension::from_entry(key, value);
        if extension.path.is_some() || BUNDLED_EXTENSIONS.contains(&extension.name.as_str()) {
            return None;
        }
        Some(format!(
            "extension '{}' is not bundled with Mercurial and has no path",
            extension.name
        ))
    }

    fn is_known_effect(effect: &str) -> bool {
        if EFFECTS.contains(&effect) || COLORS.contains(&effect) {
            return true;
        }
        if let Some(base) = effect.strip_suffix("_background") {
            return Self::is_known_effect_color(base);
        }
        if let Some(n) = effect.strip_prefix("color") {
            return n.parse::<u8>().is_ok();
        }
        Self::is_known_effect_color(effect)
    }

    fn is_known_effect_color(name: &str) -> bool {
        COLORS.contains(&name) || name.strip_prefix("bright").is_some_and(|c| COLORS.contains(&c))
    }

    fn is_internal_tool(tool: &str) -> bool {
        let name = tool
            .strip_prefix("internal:")
            .or_else(|| tool.strip_prefix(':'));
        name.is_some_and(|n| INTERNAL_TOOLS.contains(&n))
    }

    fn tool_is_configured(config: &SettingsDocument, tool: &str) -> bool {
        let prefix = format!("{tool}.");
        config
            .section("merge-tools")
            .is_some_and(|s| s.keys().any(|k| k == tool || k.starts_with(&prefix)))
    }
}

impl Default for StandardValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator for StandardValidator {
    fn validate_config(&self, config: &SettingsDocument) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut push = |severity: Severity, section: &str, key: &str, message: String| {
            issues.push(Issue {
                severity,
                location: config.entry(section, key).and_then(|e| e.source.clone()),
                message,
            });
        };

        if let Some(value) = config.get("ui", "username")
            && let Some((severity, message)) = self.check_username(value)
        {
            push(severity, "ui", "username", message);
        }

        let diff_keys = DiffSettings::BOOLEAN_KEYS.iter().map(|k| ("diff", *k));
        for (section, key) in BOOLEAN_SETTINGS.iter().copied().chain(diff_keys) {
            if let Some(value) = config.get(section, key)
                && parse_bool(value).is_none()
            {
                push(
                    Severity::Error,
                    section,
                    key,
                    format!("{section}.{key} is not a boolean ('{value}')"),
                );
            }
        }

        for (key, value) in config.items("extensions") {
            if let Some(message) = self.check_extension(key, value) {
                push(Severity::Warning, "extensions", key, message);
            }
        }

        for (label, style) in config.items("color") {
            if label == "mode" {
                continue;
            }
            for effect in style.split_whitespace() {
                if !Self::is_known_effect(effect) {
                    push(
                        Severity::Warning,
                        "color",
                        label,
                        format!("ignoring unknown color/effect '{effect}' (configured in color.{label})"),
                    );
                }
            }
        }

        if let Some(pager) = config.get("pager", "pager")
            && pager.trim().is_empty()
        {
            push(Severity::Warning, "pager", "pager", "pager.pager is empty".to_string());
        }

        for (pattern, tool) in config.items("merge-patterns") {
            for message in self.validate_pattern(config, pattern, tool) {
                let severity = if message.starts_with("invalid") {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                push(severity, "merge-patterns", pattern, message);
            }
        }

        for (key, value) in config.items("hostsecurity") {
            match key.rsplit_once(':').map(|(_, option)| option).unwrap_or(key) {
                "fingerprints" => {
                    let pins = parse_list(value);
                    if pins.is_empty() {
                        push(
                            Severity::Error,
                            "hostsecurity",
                            key,
                            format!("hostsecurity.{key} lists no fingerprints"),
                        );
                    }
                    for pin in pins {
                        if let Err(e) = Fingerprint::parse(&pin) {
                            push(Severity::Error, "hostsecurity", key, e.to_string());
                        }
                    }
                }
                "minimumprotocol" => {
                    if let Err(e) = value.parse::<MinimumProtocol>() {
                        push(Severity::Error, "hostsecurity", key, e.to_string());
                    }
                }
                _ => {}
            }
        }

        for (host, value) in config.items("hostfingerprints") {
            push(
                Severity::Warning,
                "hostfingerprints",
                host,
                format!("[hostfingerprints] is deprecated; use hostsecurity.{host}:fingerprints"),
            );
            for pin in parse_list(value) {
                if let Err(e) = Fingerprint::parse_legacy(&pin) {
                    push(Severity::Error, "hostfingerprints", host, e.to_string());
                }
            }
        }

        Ok(issues)
    }

    fn validate_pattern(&self, config: &SettingsDocument, pattern: &str, tool: &str) -> Vec<String> {
        let mut issues = Vec::new();
        if let Err(e) = MergePattern::new(pattern, tool) {
            issues.push(format!("invalid merge pattern: {e:#}"));
        }
        if tool.trim().is_empty() {
            issues.push(format!("merge pattern '{pattern}' names no tool"));
        } else if !Self::is_internal_tool(tool) && !Self::tool_is_configured(config, tool) {
            issues.push(format!(
                "merge tool '{tool}' is not internal and not defined in [merge-tools]; it will be looked up on PATH"
            ));
        }
        issues
    }
}
