use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The file and 1-based line a value was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// A single value held by a section, along with where it came from.
///
/// `source` is `None` for values that did not come from a file, such as
/// `--config` overrides or values set programmatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub source: Option<Location>,
}

/// A named `[section]` with its keys in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, Entry)>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entry(key).map(|e| e.value.as_str())
    }

    /// Assigns `key`. A key that already exists keeps its position and takes
    /// the new value (last write wins).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: Option<Location>) {
        let key = key.into();
        let entry = Entry {
            value: value.into(),
            source,
        };
        match self.position(&key) {
            Some(i) => self.entries[i].1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Appends a continuation line to an existing value.
    pub(crate) fn append_line(&mut self, key: &str, line: &str) -> bool {
        match self.position(key) {
            Some(i) => {
                let value = &mut self.entries[i].1.value;
                value.push('\n');
                value.push_str(line);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered collection of sections, the in-memory form of an hgrc.
///
/// Sections appear in the order they were first opened; reopening a section
/// later in a file (or in a later layer) adds to the existing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsDocument {
    sections: Vec<Section>,
}

impl SettingsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Returns the section named `name`, creating it at the end if needed.
    pub fn ensure_section(&mut self, name: &str) -> &mut Section {
        let index = match self.position(name) {
            Some(i) => i,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.position(name).map(|i| &self.sections[i])
    }

    pub(crate) fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.position(name).map(move |i| &mut self.sections[i])
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn entry(&self, section: &str, key: &str) -> Option<&Entry> {
        self.section(section).and_then(|s| s.entry(key))
    }

    pub fn set(
        &mut self,
        section: &str,
        key: impl Into<String>,
        value: impl Into<String>,
        source: Option<Location>,
    ) {
        self.ensure_section(section).set(key, value, source);
    }

    pub fn unset(&mut self, section: &str, key: &str) -> Option<Entry> {
        self.section_mut(section).and_then(|s| s.remove(key))
    }

    /// Iterates over `(key, value)` pairs of one section, empty if absent.
    pub fn items<'a>(&'a self, section: &str) -> impl Iterator<Item = (&'a str, &'a str)> + use<'a> {
        self.section(section)
            .into_iter()
            .flat_map(|s| s.iter().map(|(k, e)| (k, e.value.as_str())))
    }

    /// Total number of entries across all sections.
    pub fn len(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Layers `other` on top of `self`: sections and keys new to `self` are
    /// appended, existing keys take the value (and source) from `other`.
    pub fn merge(&mut self, other: &SettingsDocument) {
        for section in &other.sections {
            let target = self.ensure_section(&section.name);
            for (key, entry) in section.iter() {
                target.set(key, entry.value.clone(), entry.source.clone());
            }
        }
    }

    /// Renders the document in hgrc syntax.
    ///
    /// Multi-line values are written as indented continuation lines. Comments
    /// from the original file are not part of the document and are not emitted.
    pub fn to_hgrc_string(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section.name));
            for (key, entry) in section.iter() {
                for line in render_item(key, &entry.value) {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Splits a dotted `section.key` name at the first dot.
    ///
    /// Keys may contain dots themselves (`diff.deleted` in `[color]`), so only
    /// the first dot separates the section.
    pub fn split_name(name: &str) -> Option<(&str, &str)> {
        let (section, key) = name.split_once('.')?;
        if section.is_empty() || key.is_empty() {
            return None;
        }
        Some((section, key))
    }
}

/// Formats one assignment as hgrc lines.
pub fn render_item(key: &str, value: &str) -> Vec<String> {
    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or("");
    let mut rendered = vec![if first.is_empty() {
        format!("{key} =")
    } else {
        format!("{key} = {first}")
    }];
    rendered.extend(
        lines
            .filter(|l| !l.trim().is_empty())
            .map(|l| format!("    {}", l.trim())),
    );
    rendered
}

struct SectionValues<'a>(&'a Section);

impl Serialize for SectionValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, entry) in self.0.iter() {
            map.serialize_entry(key, &entry.value)?;
        }
        map.end()
    }
}

/// Serializes as a map of section name to a map of key to string value,
/// preserving order.
impl Serialize for SettingsDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            map.serialize_entry(section.name(), &SectionValues(section))?;
        }
        map.end()
    }
}

/// A scalar as it appears in JSON, YAML or TOML input.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Bool(b) => (if b { "True" } else { "False" }).to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

struct SectionVisitor;

impl<'de> Visitor<'de> for SectionVisitor {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of setting names to scalar values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::new();
        while let Some((key, value)) = access.next_entry::<String, Scalar>()? {
            items.push((key, value.into_text()));
        }
        Ok(items)
    }
}

struct SectionItems(Vec<(String, String)>);

impl<'de> Deserialize<'de> for SectionItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SectionVisitor).map(SectionItems)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = SettingsDocument;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of section names to settings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut doc = SettingsDocument::new();
        while let Some((name, SectionItems(items))) = access.next_entry::<String, SectionItems>()? {
            if name.is_empty() {
                return Err(de::Error::custom("section names cannot be empty"));
            }
            let section = doc.ensure_section(&name);
            for (key, value) in items {
                section.set(key, value, None);
            }
        }
        Ok(doc)
    }
}

impl<'de> Deserialize<'de> for SettingsDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SettingsDocument {
        let mut doc = SettingsDocument::new();
        doc.set("ui", "username", "Jane Doe <jane@example.com>", None);
        doc.set("ui", "verbose", "True", None);
        doc.set("extensions", "rebase", "", None);
        doc.set("color", "diff.deleted", "red", None);
        doc
    }

    #[test]
    fn test_duplicate_key_keeps_position_and_takes_last_value() {
        let mut doc = sample();
        doc.set("ui", "username", "Someone Else <else@example.com>", None);
        let keys: Vec<&str> = doc.section("ui").unwrap().keys().collect();
        assert_eq!(keys, vec!["username", "verbose"]);
        assert_eq!(doc.get("ui", "username"), Some("Someone Else <else@example.com>"));
    }

    #[test]
    fn test_empty_value_is_present() {
        let doc = sample();
        assert_eq!(doc.get("extensions", "rebase"), Some(""));
        assert_eq!(doc.get("extensions", "histedit"), None);
    }

    #[test]
    fn test_merge_layers_later_values() {
        let mut base = sample();
        let mut layer = SettingsDocument::new();
        layer.set("ui", "verbose", "False", None);
        layer.set("pager", "pager", "less -FRX", None);
        base.merge(&layer);

        assert_eq!(base.get("ui", "verbose"), Some("False"));
        let names: Vec<&str> = base.sections().map(Section::name).collect();
        assert_eq!(names, vec!["ui", "extensions", "color", "pager"]);
    }

    #[test]
    fn test_render_multiline_and_empty_values() {
        assert_eq!(render_item("rebase", ""), vec!["rebase ="]);
        assert_eq!(
            render_item("track", "command\ncommand_finish"),
            vec!["track = command", "    command_finish"]
        );
    }

    #[test]
    fn test_split_name_uses_first_dot() {
        assert_eq!(
            SettingsDocument::split_name("color.diff.deleted"),
            Some(("color", "diff.deleted"))
        );
        assert_eq!(SettingsDocument::split_name("ui"), None);
        assert_eq!(SettingsDocument::split_name(".key"), None);
    }

    #[test]
    fn test_json_keeps_section_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"ui":{"username":"Jane Doe <jane@example.com>","verbose":"True"},"extensions":{"rebase":""},"color":{"diff.deleted":"red"}}"#
        );
        let back: SettingsDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
