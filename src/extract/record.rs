use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::trace::Trace;

/// Classification / processing status of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unknown,
    Clean,
    Alert,
    SkippedNoText,
    SkippedNoStatusWords,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Clean => "clean",
            Self::Alert => "alert",
            Self::SkippedNoText => "skipped_no_text",
            Self::SkippedNoStatusWords => "skipped_no_status_words",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A resolved location attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

/// Where a message came from.  All fields are optional metadata; the
/// pipeline only looks at the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Source {
    pub channel_id: i64,
    pub channel_title: String,
    /// Unix timestamp of the channel post, `0` when unknown.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub source: Source,
    pub raw_text: String,
    pub status: Status,
    pub markers: Vec<Marker>,
    pub trace: Trace,
}

impl MessageRecord {
    pub fn new(raw_text: &str, source: Source) -> Self {
        Self {
            received_at: Utc::now(),
            source,
            raw_text: raw_text.to_string(),
            status: Status::Unknown,
            markers: Vec::new(),
            trace: Trace::default(),
        }
    }

    /// `no_markers_found` or `N_marker(s)_found`.
    pub fn outcome(&self) -> String {
        if self.markers.is_empty() {
            "no_markers_found".to_string()
        } else {
            format!("{}_marker(s)_found", self.markers.len())
        }
    }

    /// Message was classified clean/alert but no location was resolved.
    pub fn is_missed(&self) -> bool {
        matches!(self.status, Status::Clean | Status::Alert) && self.markers.is_empty()
    }
}

/// Result of running one message through the pipeline.
#[derive(Debug)]
pub enum Outcome {
    Finished(MessageRecord),
    /// The cancellation token fired mid-message; the partial record is
    /// discarded.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_strings() {
        let mut rec = MessageRecord::new("x", Source::default());
        rec.status = Status::Alert;
        assert_eq!(rec.outcome(), "no_markers_found");
        assert!(rec.is_missed());

        rec.markers.push(Marker {
            label: "a".into(),
            lat: 1.0,
            lon: 2.0,
        });
        rec.markers.push(Marker {
            label: "b".into(),
            lat: 1.0,
            lon: 2.0,
        });
        assert_eq!(rec.outcome(), "2_marker(s)_found");
        assert!(!rec.is_missed());
    }

    #[test]
    fn skipped_records_are_not_missed() {
        let mut rec = MessageRecord::new("hello", Source::default());
        rec.status = Status::SkippedNoStatusWords;
        assert!(!rec.is_missed());
    }

    #[test]
    fn serializes_status_snake_case() {
        let mut rec = MessageRecord::new("fire", Source::default());
        rec.status = Status::SkippedNoStatusWords;
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "skipped_no_status_words");
        assert_eq!(json["raw_text"], "fire");
        assert_eq!(json["channel_id"], 0);
        assert!(json["trace"].as_array().unwrap().is_empty());
    }
}
