use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::core::document::{Location, SettingsDocument};

/// Maximum nesting of `%include` directives.
pub const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("config error at {location}: unterminated section header '{line}'")]
    UnterminatedSection { location: Location, line: String },

    #[error("config error at {location}: '{line}' appears before any [section]")]
    KeyOutsideSection { location: Location, line: String },

    #[error("config error at {location}: continuation line '{line}' has no item to continue")]
    UnexpectedContinuation { location: Location, line: String },

    #[error("config error at {location}: '{line}'")]
    InvalidLine { location: Location, line: String },

    #[error("config error at {location}: %include of {} forms a cycle", .path.display())]
    IncludeCycle { location: Location, path: PathBuf },

    #[error("config error at {location}: %include nested more than {depth} levels deep")]
    IncludeTooDeep { location: Location, depth: usize },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            ParseError::UnterminatedSection { location, .. }
            | ParseError::KeyOutsideSection { location, .. }
            | ParseError::UnexpectedContinuation { location, .. }
            | ParseError::InvalidLine { location, .. }
            | ParseError::IncludeCycle { location, .. }
            | ParseError::IncludeTooDeep { location, .. } => Some(location),
            ParseError::Io { .. } => None,
        }
    }
}

/// Reads hgrc text into a `SettingsDocument`.
///
/// One parser may read several files into the same document; each file starts
/// with no open section, and values from later files override earlier ones.
#[derive(Debug, Default)]
pub struct Parser {
    include_stack: Vec<PathBuf>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_file_into(&mut self, doc: &mut SettingsDocument, path: &Path) -> Result<(), ParseError> {
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_into(doc, &text, path)
    }

    /// Parses `text` as if it were the content of `origin`. `origin` is used
    /// for error locations and to resolve relative `%include` paths.
    pub fn parse_into(&mut self, doc: &mut SettingsDocument, text: &str, origin: &Path) -> Result<(), ParseError> {
        self.include_stack.push(canonical(origin));
        let result = self.parse_lines(doc, text, origin);
        self.include_stack.pop();
        result
    }

    fn parse_lines(&mut self, doc: &mut SettingsDocument, text: &str, origin: &Path) -> Result<(), ParseError> {
        let mut section: Option<String> = None;
        // The item an indented line would continue.
        let mut continuing: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = if index == 0 {
                raw.strip_prefix('\u{feff}').unwrap_or(raw)
            } else {
                raw
            };
            let location = || Location::new(origin, line_no);
            let trimmed = line.trim();

            if let (Some(key), Some(name)) = (&continuing, &section) {
                if line.starts_with('#') || line.starts_with(';') {
                    continue;
                }
                if line.starts_with(char::is_whitespace) && !trimmed.is_empty() {
                    if let Some(s) = doc.section_mut(name) {
                        s.append_line(key, trimmed);
                    }
                    continue;
                }
            }
            continuing = None;

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                return Err(ParseError::UnexpectedContinuation {
                    location: location(),
                    line: trimmed.to_string(),
                });
            }

            if let Some(target) = directive(trimmed, "%include") {
                self.include(doc, target, origin, location())?;
                continue;
            }
            if let Some(key) = directive(trimmed, "%unset") {
                match &section {
                    Some(name) => {
                        doc.unset(name, key);
                    }
                    None => {
                        return Err(ParseError::KeyOutsideSection {
                            location: location(),
                            line: trimmed.to_string(),
                        });
                    }
                }
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let Some(end) = rest.find(']') else {
                    return Err(ParseError::UnterminatedSection {
                        location: location(),
                        line: trimmed.to_string(),
                    });
                };
                let name = rest[..end].trim();
                if name.is_empty() || name.contains('[') {
                    return Err(ParseError::InvalidLine {
                        location: location(),
                        line: trimmed.to_string(),
                    });
                }
                doc.ensure_section(name);
                section = Some(name.to_string());
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    return Err(ParseError::InvalidLine {
                        location: location(),
                        line: trimmed.to_string(),
                    });
                }
                let Some(name) = &section else {
                    return Err(ParseError::KeyOutsideSection {
                        location: location(),
                        line: trimmed.to_string(),
                    });
                };
                doc.set(name, key, value.trim(), Some(location()));
                continuing = Some(key.to_string());
                continue;
            }

            return Err(ParseError::InvalidLine {
                location: location(),
                line: trimmed.to_string(),
            });
        }
        Ok(())
    }

    fn include(
        &mut self,
        doc: &mut SettingsDocument,
        target: &str,
        origin: &Path,
        location: Location,
    ) -> Result<(), ParseError> {
        let base = origin.parent().unwrap_or_else(|| Path::new("."));
        let path = base.join(expand_path(target));

        if self.include_stack.len() > MAX_INCLUDE_DEPTH {
            return Err(ParseError::IncludeTooDeep {
                location,
                depth: MAX_INCLUDE_DEPTH,
            });
        }
        if self.include_stack.contains(&canonical(&path)) {
            return Err(ParseError::IncludeCycle { location, path });
        }

        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), from = %location, "including config file");
                self.parse_into(doc, &text, &path)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), from = %location, "skipping missing include");
                Ok(())
            }
            Err(source) => Err(ParseError::Io { path, source }),
        }
    }
}

/// Parses a whole hgrc text. `origin` names the text in error messages.
pub fn parse_str(text: &str, origin: impl AsRef<Path>) -> Result<SettingsDocument, ParseError> {
    let mut doc = SettingsDocument::new();
    Parser::new().parse_into(&mut doc, text, origin.as_ref())?;
    Ok(doc)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<SettingsDocument, ParseError> {
    let mut doc = SettingsDocument::new();
    Parser::new().parse_file_into(&mut doc, path.as_ref())?;
    Ok(doc)
}

/// Matches `%name argument` and returns the trimmed argument.
fn directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = rest.trim();
    (!arg.is_empty()).then_some(arg)
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references. Unknown variables
/// are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut expanded = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            expanded.push(c);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }
        let closed = !braced || chars.next_if_eq(&'}').is_some();
        match std::env::var(&name) {
            Ok(value) if !name.is_empty() && closed => expanded.push_str(&value),
            _ => {
                expanded.push('$');
                if braced {
                    expanded.push('{');
                }
                expanded.push_str(&name);
                if braced && closed {
                    expanded.push('}');
                }
            }
        }
    }

    if expanded == "~" || expanded.starts_with("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            let rest = expanded.trim_start_matches('~').trim_start_matches('/');
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(expanded)
}
