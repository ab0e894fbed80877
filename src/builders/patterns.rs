use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;

use crate::core::document::SettingsDocument;

/// How the left-hand side of a `[merge-patterns]` entry is interpreted.
///
/// The kind is chosen by an optional prefix on the pattern, the same prefixes
/// Mercurial accepts for file patterns. Without a prefix the pattern is a glob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `glob:` or no prefix. Rooted at the repository root.
    Glob,
    /// `re:`. A regular expression matched from the start of the path.
    Regex,
    /// `path:`. An exact path or any file below that directory.
    Path,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Glob => write!(f, "glob"),
            PatternKind::Regex => write!(f, "re"),
            PatternKind::Path => write!(f, "path"),
        }
    }
}

/// Decides whether a repository-relative path is covered by a pattern.
pub trait PatternMatcher {
    /// `path` uses `/` separators and is relative to the repository root.
    fn matches_path(&self, path: &str) -> bool;
}

/// One `pattern = tool` line of `[merge-patterns]`.
#[derive(Debug, Clone)]
pub struct MergePattern {
    /// The pattern exactly as written in the config, prefix included.
    pub specification: String,
    pub kind: PatternKind,
    pub tool: String,
    regex: Regex,
}

impl MergePattern {
    pub fn new(specification: &str, tool: &str) -> Result<Self> {
        let (kind, body) = split_kind(specification);
        let source = match kind {
            PatternKind::Glob => format!("^{}(?:/|$)", glob_to_regex(body)),
            PatternKind::Regex => format!("^(?:{body})"),
            PatternKind::Path => {
                let trimmed = body.trim_end_matches('/');
                if trimmed.is_empty() || trimmed == "." {
                    ".*".to_string()
                } else {
                    format!("^{}(?:/|$)", regex::escape(trimmed))
                }
            }
        };
        let regex = Regex::new(&source)
            .with_context(|| format!("Invalid merge pattern '{specification}'"))?;

        Ok(Self {
            specification: specification.to_string(),
            kind,
            tool: tool.to_string(),
            regex,
        })
    }
}

impl PatternMatcher for MergePattern {
    fn matches_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        self.regex.is_match(path)
    }
}

fn split_kind(specification: &str) -> (PatternKind, &str) {
    if let Some(rest) = specification.strip_prefix("glob:") {
        (PatternKind::Glob, rest)
    } else if let Some(rest) = specification.strip_prefix("re:") {
        (PatternKind::Regex, rest)
    } else if let Some(rest) = specification.strip_prefix("path:") {
        (PatternKind::Path, rest)
    } else {
        (PatternKind::Glob, specification)
    }
}

/// Translates a shell-style glob into a regular expression body (unanchored).
///
/// `**` crosses directory separators, `*` and `?` do not. `[...]` and `{a,b}`
/// are supported; an unclosed `[` is taken literally.
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::new();
    let mut group_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                if chars.get(i) == Some(&'*') {
                    i += 1;
                    if chars.get(i) == Some(&'/') {
                        i += 1;
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let mut j = i;
                if matches!(chars.get(j), Some('!') | Some('^')) {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                    continue;
                }
                let mut class: String = chars[i..j].iter().collect();
                class = class.replace('\\', r"\\").replace('[', r"\[");
                if let Some(rest) = class.strip_prefix('!') {
                    class = format!("^{rest}");
                }
                out.push('[');
                out.push_str(&class);
                out.push(']');
                i = j + 1;
            }
            '{' => {
                group_depth += 1;
                out.push_str("(?:");
            }
            '}' if group_depth > 0 => {
                group_depth -= 1;
                out.push(')');
            }
            ',' if group_depth > 0 => out.push('|'),
            '\\' => {
                if let Some(next) = chars.get(i) {
                    out.push_str(&regex::escape(&next.to_string()));
                    i += 1;
                } else {
                    out.push_str(r"\\");
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

/// The ordered `[merge-patterns]` section.
#[derive(Debug, Clone, Default)]
pub struct MergePatterns {
    patterns: Vec<MergePattern>,
}

impl MergePatterns {
    pub fn from_document(doc: &SettingsDocument) -> Result<Self> {
        let patterns = doc
            .items("merge-patterns")
            .map(|(pattern, tool)| MergePattern::new(pattern, tool))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The tool configured for `path`: the first pattern that matches, in
    /// config order.
    pub fn tool_for(&self, path: &str) -> Option<&MergePattern> {
        self.patterns.iter().find(|p| p.matches_path(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergePattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
