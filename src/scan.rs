//! Batch driver: runs many messages through the [`Extractor`], emits each
//! finished record and keeps running totals.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::extract::Extractor;
use crate::extract::record::{MessageRecord, Outcome, Source, Status};
use crate::sink::RecordSink;

/// A channel message as captured by `dump` mode and read back by `replay`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub channel_id: i64,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub text: String,
}

impl InputMessage {
    pub fn source(&self) -> Source {
        Source {
            channel_id: self.channel_id,
            channel_title: self.channel_title.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub considered: usize,
    pub skipped_no_text: usize,
    pub skipped_no_status_words: usize,
    pub processed: usize,
    pub with_markers: usize,
    pub markers: usize,
    pub missed_clean: usize,
    pub missed_alert: usize,
}

impl ScanSummary {
    pub fn record(&mut self, rec: &MessageRecord) {
        self.considered += 1;
        match rec.status {
            Status::SkippedNoText => self.skipped_no_text += 1,
            Status::SkippedNoStatusWords => self.skipped_no_status_words += 1,
            Status::Clean | Status::Alert | Status::Unknown => {
                self.processed += 1;
                if !rec.markers.is_empty() {
                    self.with_markers += 1;
                    self.markers += rec.markers.len();
                } else if rec.status == Status::Clean {
                    self.missed_clean += 1;
                } else if rec.status == Status::Alert {
                    self.missed_alert += 1;
                }
            }
        }
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "considered={}, processed={}, skipped_no_text={}, skipped_no_status_words={}, with_markers={}, markers={}, missed_clean={}, missed_alert={}",
            self.considered,
            self.processed,
            self.skipped_no_text,
            self.skipped_no_status_words,
            self.with_markers,
            self.markers,
            self.missed_clean,
            self.missed_alert,
        )
    }
}

/// Feeds messages one at a time, so the same driver serves batch modes and
/// the live update loop.
pub struct Scanner<'a, S: RecordSink> {
    extractor: &'a Extractor,
    sink: &'a mut S,
    summary: ScanSummary,
}

impl<'a, S: RecordSink> Scanner<'a, S> {
    pub fn new(extractor: &'a Extractor, sink: &'a mut S) -> Self {
        Self {
            extractor,
            sink,
            summary: ScanSummary::default(),
        }
    }

    /// Process one message.  Returns `false` when cancellation interrupted
    /// it; nothing is emitted in that case.
    pub async fn feed(&mut self, msg: &InputMessage, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Ok(false);
        }

        let rec = match self.extractor.process(&msg.text, msg.source(), cancel).await {
            Outcome::Finished(rec) => rec,
            Outcome::Cancelled => return Ok(false),
        };

        for m in &rec.markers {
            info!(
                "📍 {} ({:.5}, {:.5}) from {}",
                m.label, m.lat, m.lon, msg.channel_title
            );
        }
        if rec.is_missed() {
            info!(
                "❓ No location for {} message from {}: {}",
                rec.status,
                msg.channel_title,
                preview(&rec.raw_text)
            );
        }

        self.summary.record(&rec);
        self.sink.emit(&rec)?;
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    pub fn finish(self) -> Result<ScanSummary> {
        self.sink.flush()?;
        Ok(self.summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub summary: ScanSummary,
    pub cancelled: bool,
}

/// Run `messages` through the pipeline in order, stopping early when
/// `cancel` fires.
pub async fn run_scan<S: RecordSink>(
    extractor: &Extractor,
    messages: &[InputMessage],
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<ScanOutcome> {
    let mut scanner = Scanner::new(extractor, sink);
    let mut cancelled = false;

    for msg in messages {
        if !scanner.feed(msg, cancel).await? {
            cancelled = true;
            break;
        }
    }

    let summary = scanner.finish()?;
    Ok(ScanOutcome { summary, cancelled })
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX {
        flat
    } else {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::geocode::stub::StubLookup;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn msg(ts: i64, text: &str) -> InputMessage {
        InputMessage {
            timestamp: ts,
            channel_id: 7,
            channel_title: "Alerts".into(),
            text: text.into(),
        }
    }

    fn extractor(stub: StubLookup) -> Extractor {
        let cfg = Configuration::from_value(&json!({
            "green_words": ["clear"],
            "red_words": ["fire"],
            "fallback_tokens": ["bridge"]
        }))
        .unwrap();
        Extractor::new(Arc::new(cfg), Arc::new(stub)).with_token_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn summary_counts_every_outcome() {
        let ex = extractor(StubLookup::new().answer("bridge", "Bridge", "1", "2"));
        let messages = vec![
            msg(1, "fire near bridge"),
            msg(2, ""),
            msg(3, "hello there"),
            msg(4, "fire"),
            msg(5, "all clear"),
        ];
        let mut sink: Vec<MessageRecord> = Vec::new();

        let out = run_scan(&ex, &messages, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!out.cancelled);
        assert_eq!(
            out.summary,
            ScanSummary {
                considered: 5,
                skipped_no_text: 1,
                skipped_no_status_words: 1,
                processed: 3,
                with_markers: 1,
                markers: 1,
                missed_clean: 1,
                missed_alert: 1,
            }
        );
        assert_eq!(sink.len(), 5);
        assert_eq!(sink[0].source.timestamp, 1);
        assert_eq!(sink[0].source.channel_title, "Alerts");
    }

    #[tokio::test]
    async fn cancelled_scan_stops_and_reports() {
        let ex = extractor(StubLookup::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink: Vec<MessageRecord> = Vec::new();

        let out = run_scan(&ex, &[msg(1, "fire bridge")], &mut sink, &cancel)
            .await
            .unwrap();
        assert!(out.cancelled);
        assert_eq!(out.summary.considered, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn input_message_tolerates_missing_fields() {
        let m: InputMessage = serde_json::from_str(r#"{"text":"fire"}"#).unwrap();
        assert_eq!(m.text, "fire");
        assert_eq!(m.channel_id, 0);
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "а".repeat(100);
        assert_eq!(preview(&long).chars().count(), 81);
        assert_eq!(preview("a\n b"), "a b");
    }
}
