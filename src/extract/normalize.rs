//! Text normalization: ignore-word stripping and alias substitution, plus
//! the small text helpers shared by the extraction stages.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use tracing::warn;

use crate::config::Configuration;

use super::trace::{Step, Trace};

/// Punctuation trimmed from both ends of a token before the ignore-list
/// check.
const EDGE_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '“', '”', '«', '»', '(', ')', '[', ']', '{', '}',
];

/// Word-like runs: letters, digits, hyphen, apostrophe.
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\d'-]+").unwrap());

/// A search term together with its compiled whole-word, case-insensitive
/// pattern.
#[derive(Debug, Clone)]
pub struct WordPattern {
    pub text: String,
    pub regex: Regex,
}

impl WordPattern {
    /// `None` when the term is empty or too large to compile.
    ///
    /// A boundary is only required on an edge that is a word character, so
    /// terms like `вул.` still match before a space.
    pub fn new(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        let lead = if text.starts_with(is_word_char) { r"\b" } else { "" };
        let tail = if text.ends_with(is_word_char) { r"\b" } else { "" };
        match Regex::new(&format!(r"(?i){lead}{}{tail}", regex::escape(text))) {
            Ok(regex) => Some(Self {
                text: text.to_string(),
                regex,
            }),
            Err(e) => {
                warn!("Skipping unusable term {text:?}: {e}");
                None
            }
        }
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Replace the first whole-word occurrence with a space and collapse
    /// whitespace.
    pub fn remove_first(&self, haystack: &str) -> String {
        collapse_whitespace(&self.regex.replace(haystack, " "))
    }
}

/// Compiled alias substitutions in application order.
#[derive(Debug, Clone, Default)]
pub struct Corrections {
    rules: Vec<(String, WordPattern)>,
}

impl Corrections {
    pub fn compile(cfg: &Configuration) -> Self {
        let rules = cfg
            .corrections
            .iter()
            .flat_map(|(canon, aliases)| {
                aliases
                    .iter()
                    .filter_map(|alias| WordPattern::new(alias))
                    .map(move |pat| (canon.clone(), pat))
            })
            .collect();
        Self { rules }
    }

    /// Apply every substitution in order; later rules see the output of
    /// earlier ones.
    pub fn apply(&self, text: &str, trace: &mut Trace) -> String {
        let mut out = text.to_string();
        for (canon, alias) in &self.rules {
            if !alias.is_match(&out) {
                continue;
            }
            out = alias.regex.replace_all(&out, NoExpand(canon.as_str())).into_owned();
            trace.push(Step::CorrectionApplied {
                from: alias.text.clone(),
                to: canon.clone(),
                text: out.clone(),
            });
        }
        collapse_whitespace(&out)
    }
}

/// Drop whitespace-separated tokens whose punctuation-trimmed form is an
/// ignore word.  Returns the kept text and the dropped tokens.
pub fn strip_ignore_words(text: &str, ignore_words: &[String]) -> (String, Vec<String>) {
    let mut kept: Vec<&str> = Vec::new();
    let mut removed: Vec<String> = Vec::new();

    for token in text.split_whitespace() {
        let cleaned = token.trim_matches(EDGE_PUNCTUATION).to_lowercase();
        if !cleaned.is_empty() && ignore_words.iter().any(|w| *w == cleaned) {
            removed.push(token.to_string());
        } else {
            kept.push(token);
        }
    }

    (kept.join(" "), removed)
}

/// Full normalization of lowercased message text: ignore words first, then
/// alias substitution.
pub fn normalize(
    lower: &str,
    cfg: &Configuration,
    corrections: &Corrections,
    trace: &mut Trace,
) -> String {
    let (text, removed) = strip_ignore_words(lower, &cfg.ignore_words);
    trace.push(Step::AfterIgnoreWords {
        text: text.clone(),
        removed,
    });

    let text = corrections.apply(&text, trace);
    trace.push(Step::AfterCorrections { text: text.clone() });
    text
}

/// Lowercased word-like tokens of `text`, in order.
pub fn tokens(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn strips_ignore_words_with_punctuation() {
        let ignore = words(&["в", "на", "увага"]);
        let (text, removed) = strip_ignore_words("увага! вибух на «вокзалі» (в центрі)", &ignore);
        assert_eq!(text, "вибух «вокзалі» центрі)");
        assert_eq!(removed, vec!["увага!", "на", "(в"]);
    }

    #[test]
    fn punctuation_only_tokens_are_kept() {
        let ignore = words(&["a"]);
        let (text, removed) = strip_ignore_words("fire -- ... a", &ignore);
        assert_eq!(text, "fire -- ...");
        assert_eq!(removed, vec!["a"]);
    }

    #[test]
    fn ignore_stripping_is_idempotent() {
        let ignore = words(&["near", "the", "at", "в"]);
        for input in [
            "fire near the bridge",
            "  fire   at   (the) market!! ",
            "вибух в центрі, біля the мосту",
            "",
            "near near near",
        ] {
            let (once, _) = strip_ignore_words(input, &ignore);
            let (twice, removed) = strip_ignore_words(&once, &ignore);
            assert_eq!(once, twice, "input {input:?}");
            assert!(removed.is_empty());
        }
    }

    #[test]
    fn alias_substitution_replaces_whole_words() {
        let cfg = Configuration::from_value(&json!({
            "corrections_map": {"central square": ["town square"]}
        }))
        .unwrap();
        let corrections = Corrections::compile(&cfg);
        let mut trace = Trace::default();

        let out = normalize("fire at town square", &cfg, &corrections, &mut trace);
        assert!(out.contains("central square"));
        assert!(!out.contains("town square"));

        // not a whole word
        let out = corrections.apply("downtown squares", &mut trace);
        assert_eq!(out, "downtown squares");
    }

    #[test]
    fn substitutions_compound_in_order() {
        let cfg = Configuration::from_value(&json!({
            "corrections_map": {
                "b": ["a"],
                "c": ["b"]
            }
        }))
        .unwrap();
        let corrections = Corrections::compile(&cfg);
        let mut trace = Trace::default();
        assert_eq!(corrections.apply("a and a", &mut trace), "c and c");
        assert_eq!(trace.steps().len(), 2);
    }

    #[test]
    fn canonical_with_dollar_is_literal() {
        let cfg = Configuration::from_value(&json!({
            "corrections_map": {"$1 market": ["bazaar"]}
        }))
        .unwrap();
        let corrections = Corrections::compile(&cfg);
        let mut trace = Trace::default();
        assert_eq!(corrections.apply("the bazaar", &mut trace), "the $1 market");
    }

    #[test]
    fn cyrillic_whole_word_matching() {
        let pat = WordPattern::new("ринок").unwrap();
        assert!(pat.is_match("вибух біля ринок"));
        assert!(!pat.is_match("вибух біля ринку"));
        assert_eq!(pat.remove_first("ринок і ринок"), "і ринок");
    }

    #[test]
    fn alias_ending_in_punctuation_matches() {
        let cfg = Configuration::from_value(&json!({
            "corrections_map": {"вулиця": ["вул."]}
        }))
        .unwrap();
        let corrections = Corrections::compile(&cfg);
        let mut trace = Trace::default();
        assert_eq!(
            corrections.apply("вибух вул. шевченка", &mut trace),
            "вибух вулиця шевченка"
        );
        // leading edge is still a whole-word boundary
        assert_eq!(corrections.apply("привул. шевченка", &mut trace), "привул. шевченка");

        let pat = WordPattern::new("пл.").unwrap();
        assert!(pat.is_match("пожежа пл. ринок"));
        assert_eq!(pat.remove_first("пожежа пл. ринок"), "пожежа ринок");
    }

    #[test]
    fn tokenizer_keeps_hyphen_and_apostrophe() {
        assert_eq!(
            tokens("Вибух: Івано-Франківськ, м'ясокомбінат 12!"),
            vec!["вибух", "івано-франківськ", "м'ясокомбінат", "12"]
        );
    }
}
