//! Language-specific vocabulary used by the intersection parser and by
//! geocoder candidate matching.
//!
//! Defaults target **Ukrainian** channel text; every table can be replaced
//! through the `locale` section of the config document.

use serde_json::Value;

/// Word that introduces a street intersection ("перехрестя X та Y").
pub const INTERSECTION_WORD: &str = "перехрестя";

/// Word conjunctions accepted between the two streets of an intersection.
/// The first entry is also used to join the composite geocoding query.
///
/// The symbol separators `/`, `&` and `+` are always accepted.
pub const CONJUNCTIONS: &[&str] = &["та", "і"];

/// Prefixes stripped from each street operand of an intersection.
/// Only one prefix is removed, and it must be followed by whitespace.
pub const STREET_PREFIXES: &[&str] = &[
    "вулиця",
    "вул.",
    "вул",
    "проспект",
    "просп.",
    "просп",
    "площа",
    "пл.",
    "пл",
];

/// Locative prefixes stripped from the primary name of a geocoder
/// candidate ("вулиця Шевченка" → "шевченка") before fuzzy comparison.
/// **Order matters**: the first prefix that matches wins.
pub const NAME_PREFIXES: &[&str] = &[
    "вулиця", "вул", "просп", "проспект", "площа", "пл", "село", "с",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Locale {
    pub intersection_word: String,
    pub conjunctions: Vec<String>,
    pub street_prefixes: Vec<String>,
    pub name_prefixes: Vec<String>,
}

impl Default for Locale {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| (*w).to_string()).collect()
        }

        Self {
            intersection_word: INTERSECTION_WORD.to_string(),
            conjunctions: owned(CONJUNCTIONS),
            street_prefixes: owned(STREET_PREFIXES),
            name_prefixes: owned(NAME_PREFIXES),
        }
    }
}

impl Locale {
    /// Build from the optional `locale` object of the config document.
    /// Missing or empty fields keep their Ukrainian defaults.
    pub fn from_value(raw: Option<&Value>) -> Self {
        let mut locale = Self::default();
        let Some(Value::Object(obj)) = raw else {
            return locale;
        };

        if let Some(word) = obj.get("intersection_word").and_then(crate::config::scalar) {
            if !word.is_empty() {
                locale.intersection_word = word;
            }
        }
        for (field, target) in [
            ("conjunctions", &mut locale.conjunctions),
            ("street_prefixes", &mut locale.street_prefixes),
            ("name_prefixes", &mut locale.name_prefixes),
        ] {
            let words = crate::config::word_list(obj.get(field));
            if !words.is_empty() {
                *target = words;
            }
        }
        locale
    }

    /// Conjunction used to join the two streets of a composite query.
    pub fn query_conjunction(&self) -> &str {
        self.conjunctions.first().map(String::as_str).unwrap_or("&")
    }

    /// Strip the first matching place-name prefix from a candidate name.
    /// Returns the name unchanged when no prefix applies.
    pub fn strip_name_prefix<'a>(&self, name: &'a str) -> &'a str {
        for prefix in &self.name_prefixes {
            if let Some(rest) = name
                .strip_prefix(prefix.as_str())
                .and_then(|r| r.strip_prefix(' '))
            {
                return rest;
            }
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_first_matching_prefix_only() {
        let locale = Locale::default();
        assert_eq!(locale.strip_name_prefix("вулиця шевченка"), "шевченка");
        assert_eq!(locale.strip_name_prefix("площа ринок"), "ринок");
        assert_eq!(locale.strip_name_prefix("с пасічна"), "пасічна");
        // prefix must be a separate word
        assert_eq!(locale.strip_name_prefix("селище"), "селище");
        assert_eq!(locale.strip_name_prefix("пасічна"), "пасічна");
    }

    #[test]
    fn overrides_from_config_object() {
        let locale = Locale::from_value(Some(&json!({
            "intersection_word": "Corner",
            "conjunctions": ["AND"],
            "name_prefixes": []
        })));
        assert_eq!(locale.intersection_word, "corner");
        assert_eq!(locale.conjunctions, vec!["and"]);
        assert_eq!(locale.query_conjunction(), "and");
        // empty list keeps the default
        assert_eq!(locale.name_prefixes, Locale::default().name_prefixes);
    }

    #[test]
    fn non_object_keeps_defaults() {
        assert_eq!(Locale::from_value(Some(&json!("uk"))), Locale::default());
        assert_eq!(Locale::from_value(None), Locale::default());
    }
}
