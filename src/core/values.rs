use anyhow::{Result, bail};

use crate::core::document::SettingsDocument;

/// Interprets a setting as a boolean, the way Mercurial does.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" | "always" => Some(true),
        "0" | "no" | "false" | "off" | "never" => Some(false),
        _ => None,
    }
}

pub fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Splits a list setting on commas and whitespace.
///
/// Double-quoted items may contain separators; `\"` inside quotes is a literal
/// quote. Empty items are dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ',' if !in_quotes => push_item(&mut items, &mut current),
            c if c.is_whitespace() && !in_quotes => push_item(&mut items, &mut current),
            c => current.push(c),
        }
    }
    push_item(&mut items, &mut current);
    items
}

fn push_item(items: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        items.push(std::mem::take(current));
    }
}

impl SettingsDocument {
    /// Reads `section.key` as a boolean. Absent keys yield `default`; present
    /// keys that are not booleans are an error.
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool> {
        match self.get(section, key) {
            None => Ok(default),
            Some(value) => match parse_bool(value) {
                Some(b) => Ok(b),
                None => bail!("{section}.{key} is not a boolean ('{value}')"),
            },
        }
    }

    pub fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64> {
        match self.get(section, key) {
            None => Ok(default),
            Some(value) => match parse_int(value) {
                Some(i) => Ok(i),
                None => bail!("{section}.{key} is not a valid integer ('{value}')"),
            },
        }
    }

    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get(section, key).map(parse_list).unwrap_or_default()
    }
}
