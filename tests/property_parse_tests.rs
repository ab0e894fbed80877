//! Property-based tests for the hgrc parser.
//!
//! These generate documents from random section and key names and check the
//! guarantees callers rely on: order is kept, the last duplicate wins, and
//! comments or blank lines never turn into settings.

use proptest::prelude::*;

use hgrc_settings::core::parser::parse_str;

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    // No leading/trailing whitespace: values are trimmed on read.
    prop_oneof![Just(String::new()), "[A-Za-z0-9<>@.:/*-]([A-Za-z0-9 <>@.:/*-]{0,20}[A-Za-z0-9<>@.:/*-])?"]
}

/// Sections with distinct names, each with distinct keys.
fn document_strategy() -> impl Strategy<Value = Vec<(String, Vec<(String, String)>)>> {
    prop::collection::vec(
        (
            name_strategy(),
            prop::collection::vec((name_strategy(), value_strategy()), 1..6),
        ),
        1..5,
    )
    .prop_map(|sections| {
        let mut seen = Vec::new();
        sections
            .into_iter()
            .filter(|(name, _)| {
                if seen.contains(name) {
                    return false;
                }
                seen.push(name.clone());
                true
            })
            .map(|(name, items)| {
                let mut keys = Vec::new();
                let items = items
                    .into_iter()
                    .filter(|(key, _)| {
                        if keys.contains(key) {
                            return false;
                        }
                        keys.push(key.clone());
                        true
                    })
                    .collect();
                (name, items)
            })
            .collect()
    })
}

fn render(sections: &[(String, Vec<(String, String)>)]) -> String {
    let mut out = String::new();
    for (name, items) in sections {
        out.push_str(&format!("[{name}]\n"));
        for (key, value) in items {
            out.push_str(&format!("{key} = {value}\n"));
        }
        out.push('\n');
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Sections and keys come back in the order they were written, and
    /// survive a render/parse cycle unchanged.
    #[test]
    fn test_order_is_preserved(sections in document_strategy()) {
        let doc = parse_str(&render(&sections), "hgrc").unwrap();

        let names: Vec<&str> = doc.sections().map(|s| s.name()).collect();
        let expected: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        prop_assert_eq!(names, expected);

        for (name, items) in &sections {
            let parsed: Vec<(&str, &str)> = doc.items(name).collect();
            let expected: Vec<(&str, &str)> = items.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            prop_assert_eq!(parsed, expected);
        }

        let again = parse_str(&doc.to_hgrc_string(), "hgrc").unwrap();
        prop_assert_eq!(again.to_hgrc_string(), doc.to_hgrc_string());
    }

    /// A key assigned several times resolves to its last value.
    #[test]
    fn test_last_duplicate_wins(key in name_strategy(), values in prop::collection::vec(value_strategy(), 1..6)) {
        let mut text = String::from("[section]\n");
        for value in &values {
            text.push_str(&format!("{key} = {value}\n"));
        }
        let doc = parse_str(&text, "hgrc").unwrap();

        prop_assert_eq!(doc.len(), 1);
        prop_assert_eq!(doc.get("section", &key), values.last().map(String::as_str));
    }

    /// Comment and blank lines never produce entries.
    #[test]
    fn test_comments_produce_no_entries(
        comments in prop::collection::vec(("[#;]", "[ -~]{0,30}"), 0..10),
        blanks in 0usize..5,
    ) {
        let mut text = String::from("[ui]\n");
        for (marker, body) in &comments {
            text.push_str(&format!("{marker}{body}\n"));
        }
        text.push_str(&"\n".repeat(blanks));
        let doc = parse_str(&text, "hgrc").unwrap();

        prop_assert!(doc.is_empty());
        prop_assert!(doc.has_section("ui"));
    }
}
