//! Word lists, location phrases and alias maps that drive classification
//! and location extraction.
//!
//! The raw document is JSON of loosely specified shape; [`Configuration::from_value`]
//! turns it into a canonical, lowercase form.  Anything missing or malformed
//! below the root falls back to a default – only a non-object root (or an
//! unreadable / unparseable file) is an error.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::locale::Locale;

pub const DEFAULT_MAX_DISTANCE_RATIO: f64 = 0.35;
pub const DEFAULT_MIN_LENGTH: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config root must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Fuzzy-match acceptance policy for geocoder candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyPolicy {
    /// Maximum `distance / query_len` accepted for queries of at least
    /// `min_length` characters.  Always within `[0, 1]`.
    pub max_distance_ratio: f64,
    /// Queries shorter than this only accept exact matches.
    pub min_length: usize,
}

impl Default for FuzzyPolicy {
    fn default() -> Self {
        Self {
            max_distance_ratio: DEFAULT_MAX_DISTANCE_RATIO,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

/// A canonical location label plus the surface forms that trigger it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPhrase {
    pub key: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    pub ignore_words: Vec<String>,
    pub green_words: Vec<String>,
    pub red_words: Vec<String>,
    pub fallback_tokens: Vec<String>,
    pub location_phrases: Vec<LocationPhrase>,
    /// Canonical term → aliases, in document order.
    pub corrections: Vec<(String, Vec<String>)>,
    pub fuzzy: FuzzyPolicy,
    pub city: String,
    pub locale: Locale,
}

impl Configuration {
    /// Read and normalize the JSON config document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg = Self::from_json(&raw)?;
        info!("Config loaded from {}: {cfg}", path.display());
        Ok(cfg)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Normalize a raw config value.  Lists default to empty, strings are
    /// lowercased and trimmed, empty entries are dropped.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(root) = value else {
            return Err(ConfigError::NotAnObject(kind_of(value)));
        };

        let location_phrases = match root.get("location_phrases") {
            Some(Value::Array(entries)) => entries.iter().filter_map(parse_phrase).collect(),
            _ => Vec::new(),
        };

        let corrections = match root.get("corrections_map") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(canon, aliases)| {
                    let canon = canon.trim().to_lowercase();
                    if canon.is_empty() {
                        return None;
                    }
                    Some((canon, word_list(Some(aliases))))
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            ignore_words: word_list(root.get("ignore_words")),
            green_words: word_list(root.get("green_words")),
            red_words: word_list(root.get("red_words")),
            fallback_tokens: word_list(root.get("fallback_tokens")),
            location_phrases,
            corrections,
            fuzzy: parse_fuzzy(root.get("fuzzy")),
            city: root.get("city").and_then(scalar).unwrap_or_default(),
            locale: Locale::from_value(root.get("locale")),
        })
    }

    pub fn is_ignore_word(&self, token: &str) -> bool {
        contains(&self.ignore_words, token)
    }

    pub fn is_fallback_token(&self, token: &str) -> bool {
        contains(&self.fallback_tokens, token)
    }

    /// `true` when `token` is exactly a green, red or ignore word.
    pub fn is_status_or_ignore_word(&self, token: &str) -> bool {
        contains(&self.green_words, token)
            || contains(&self.red_words, token)
            || self.is_ignore_word(token)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Configuration(city={:?}, green={}, red={}, ignore={}, fallback={}, phrases={}, corrections={}, fuzzy={}/{})",
            self.city,
            self.green_words.len(),
            self.red_words.len(),
            self.ignore_words.len(),
            self.fallback_tokens.len(),
            self.location_phrases.len(),
            self.corrections.len(),
            self.fuzzy.max_distance_ratio,
            self.fuzzy.min_length,
        )
    }
}

fn contains(list: &[String], token: &str) -> bool {
    list.iter().any(|w| w == token)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Lowercased, trimmed text of a scalar JSON value.  Arrays, objects and
/// null yield `None`.
pub(crate) fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(text.trim().to_lowercase())
}

/// Normalize an optional JSON array into a list of non-empty lowercase
/// words.  Anything that is not an array becomes an empty list.
pub(crate) fn word_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(scalar)
        .filter(|w| !w.is_empty())
        .collect()
}

fn parse_phrase(entry: &Value) -> Option<LocationPhrase> {
    let variants = word_list(entry.get("variants"));
    let key = entry
        .get("key")
        .and_then(scalar)
        .filter(|k| !k.is_empty())
        .or_else(|| variants.first().cloned())?;
    Some(LocationPhrase { key, variants })
}

fn parse_fuzzy(value: Option<&Value>) -> FuzzyPolicy {
    let mut policy = FuzzyPolicy::default();
    let Some(Value::Object(obj)) = value else {
        return policy;
    };

    if let Some(ratio) = obj.get("maxDistanceRatio").and_then(Value::as_f64) {
        if ratio.is_finite() {
            policy.max_distance_ratio = ratio.clamp(0.0, 1.0);
        }
    }
    if let Some(len) = obj.get("minLength").and_then(Value::as_f64) {
        if len.is_finite() {
            policy.min_length = (len.floor().max(1.0)) as usize;
        }
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_gets_defaults() {
        let cfg = Configuration::from_value(&json!({})).unwrap();
        assert!(cfg.green_words.is_empty());
        assert!(cfg.location_phrases.is_empty());
        assert!(cfg.corrections.is_empty());
        assert_eq!(cfg.fuzzy, FuzzyPolicy::default());
        assert_eq!(cfg.fuzzy.max_distance_ratio, 0.35);
        assert_eq!(cfg.fuzzy.min_length, 3);
        assert_eq!(cfg.city, "");
        assert_eq!(cfg.locale, Locale::default());
    }

    #[test]
    fn non_object_root_is_config_error() {
        for bad in [json!([]), json!("cfg"), json!(null), json!(3)] {
            let err = Configuration::from_value(&bad).unwrap_err();
            assert!(matches!(err, ConfigError::NotAnObject(_)), "{bad}");
        }
        assert!(matches!(
            Configuration::from_json("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Configuration::load("/definitely/not/here/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn lists_are_lowercased_and_cleaned() {
        let cfg = Configuration::from_value(&json!({
            "green_words": ["Чисто", " OK ", "", 7],
            "red_words": "not a list",
            "ignore_words": ["В", null, {"x": 1}],
            "city": " Івано-Франківськ "
        }))
        .unwrap();
        assert_eq!(cfg.green_words, vec!["чисто", "ok", "7"]);
        assert!(cfg.red_words.is_empty());
        assert_eq!(cfg.ignore_words, vec!["в"]);
        assert_eq!(cfg.city, "івано-франківськ");
    }

    #[test]
    fn phrases_and_corrections_keep_order() {
        let cfg = Configuration::from_value(&json!({
            "location_phrases": [
                {"key": "Ринок", "variants": ["Площа Ринок", "ринку"]},
                {"variants": ["Вокзал"]},
                {"key": "", "variants": []},
                "garbage"
            ],
            "corrections_map": {
                "Z Canon": ["B alias"],
                "A canon": ["Alias One", "alias two"],
                "empty": "nope"
            }
        }))
        .unwrap();

        assert_eq!(
            cfg.location_phrases,
            vec![
                LocationPhrase {
                    key: "ринок".into(),
                    variants: vec!["площа ринок".into(), "ринку".into()],
                },
                LocationPhrase {
                    key: "вокзал".into(),
                    variants: vec!["вокзал".into()],
                },
            ]
        );
        let canon: Vec<&str> = cfg.corrections.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(canon, vec!["z canon", "a canon", "empty"]);
        assert_eq!(cfg.corrections[1].1, vec!["alias one", "alias two"]);
        assert!(cfg.corrections[2].1.is_empty());
    }

    #[test]
    fn fuzzy_defaults_for_non_numeric_values() {
        let cfg = Configuration::from_value(&json!({
            "fuzzy": {"maxDistanceRatio": "high", "minLength": null}
        }))
        .unwrap();
        assert_eq!(cfg.fuzzy, FuzzyPolicy::default());

        let cfg = Configuration::from_value(&json!({
            "fuzzy": {"maxDistanceRatio": 0.2, "minLength": 5}
        }))
        .unwrap();
        assert_eq!(cfg.fuzzy.max_distance_ratio, 0.2);
        assert_eq!(cfg.fuzzy.min_length, 5);
    }

    #[test]
    fn fuzzy_values_are_clamped() {
        let cfg = Configuration::from_value(&json!({
            "fuzzy": {"maxDistanceRatio": 4.0, "minLength": 0}
        }))
        .unwrap();
        assert_eq!(cfg.fuzzy.max_distance_ratio, 1.0);
        assert_eq!(cfg.fuzzy.min_length, 1);
    }

    #[test]
    fn status_word_helpers() {
        let cfg = Configuration::from_value(&json!({
            "green_words": ["clear"],
            "red_words": ["fire"],
            "ignore_words": ["near"],
            "fallback_tokens": ["bridge"]
        }))
        .unwrap();
        assert!(cfg.is_status_or_ignore_word("clear"));
        assert!(cfg.is_status_or_ignore_word("fire"));
        assert!(cfg.is_status_or_ignore_word("near"));
        assert!(!cfg.is_status_or_ignore_word("bridge"));
        assert!(cfg.is_fallback_token("bridge"));
        assert!(cfg.is_ignore_word("near"));
    }
}
