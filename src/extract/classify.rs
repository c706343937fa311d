//! Keyword gate deciding whether a message is worth extracting from.

use crate::config::Configuration;

use super::record::Status;

/// Outcome of the status-word scan over lowercased text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub has_green: bool,
    pub has_red: bool,
    pub status: Status,
}

/// Substring scan for green and red words.  Green wins over red; neither
/// yields [`Status::Unknown`].
pub fn classify(lower: &str, cfg: &Configuration) -> Classification {
    let has_green = cfg.green_words.iter().any(|w| lower.contains(w.as_str()));
    let has_red = cfg.red_words.iter().any(|w| lower.contains(w.as_str()));

    let status = if has_green {
        Status::Clean
    } else if has_red {
        Status::Alert
    } else {
        Status::Unknown
    };

    Classification {
        has_green,
        has_red,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Configuration {
        Configuration {
            green_words: vec!["чисто".into(), "clear".into()],
            red_words: vec!["вибух".into(), "fire".into()],
            ..Configuration::default()
        }
    }

    #[test]
    fn red_word_is_alert() {
        let c = classify("fire near bridge", &cfg());
        assert_eq!(c.status, Status::Alert);
        assert!(c.has_red);
        assert!(!c.has_green);
    }

    #[test]
    fn green_wins_over_red() {
        let c = classify("вибух був, зараз чисто", &cfg());
        assert_eq!(c.status, Status::Clean);
        assert!(c.has_red && c.has_green);
    }

    #[test]
    fn substring_match_counts() {
        // "вибухи" contains "вибух"
        assert_eq!(classify("чути вибухи", &cfg()).status, Status::Alert);
        assert_eq!(classify("all clearance", &cfg()).status, Status::Clean);
    }

    #[test]
    fn no_status_word_is_unknown() {
        assert_eq!(classify("just chatting", &cfg()).status, Status::Unknown);
        assert_eq!(classify("", &cfg()).status, Status::Unknown);
    }
}
