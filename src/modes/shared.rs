use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Configuration;
use crate::extract::{DEFAULT_TOKEN_DELAY, Extractor};
use crate::geocode::nominatim::NominatimLookup;
use crate::scan::{InputMessage, ScanSummary};
use crate::sink::JsonlSink;

/// Pipeline settings shared by every mode.
///
/// | Env var               | Default              | Description                              |
/// |-----------------------|----------------------|------------------------------------------|
/// | `GEO_CONFIG_PATH`     | `./geo_config.json`  | Word lists / phrases / corrections JSON  |
/// | `RECORDS_OUTPUT_PATH` | `./records.jsonl`    | Message records, `-` for stdout          |
/// | `GEOCODE_DELAY_MS`    | `200`                | Pause between general-token lookups      |
/// | `SCAN_WINDOW_HOURS`   | `6`                  | History depth for `scan` and `dump`      |
#[derive(Debug, Clone)]
pub(super) struct PipelineCfg {
    pub config_path: String,
    pub records_path: String,
    pub token_delay: Duration,
    pub window_hours: i64,
}

impl PipelineCfg {
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("GEO_CONFIG_PATH")
                .unwrap_or_else(|_| "./geo_config.json".into()),
            records_path: std::env::var("RECORDS_OUTPUT_PATH")
                .unwrap_or_else(|_| "./records.jsonl".into()),
            token_delay: std::env::var("GEOCODE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TOKEN_DELAY),
            window_hours: std::env::var("SCAN_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|h| *h > 0)
                .unwrap_or(6),
        }
    }
}

pub(super) fn build_extractor(cfg: &PipelineCfg) -> Result<Extractor> {
    let geo = Configuration::load(&cfg.config_path)
        .with_context(|| format!("failed to load geo config {}", cfg.config_path))?;
    let lookup = NominatimLookup::from_env()?;
    info!("Geocoder: {lookup}");

    Ok(Extractor::new(Arc::new(geo), Arc::new(lookup)).with_token_delay(cfg.token_delay))
}

pub(super) fn open_sink(cfg: &PipelineCfg) -> Result<JsonlSink<Box<dyn Write + Send>>> {
    let sink = JsonlSink::create(&cfg.records_path)?;
    info!("Writing message records to {}", cfg.records_path);
    Ok(sink)
}

/// Token cancelled on the first Ctrl-C.
pub(super) fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing up...");
                child.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });
    token
}

/// Unix timestamp `hours` ago.
pub(super) fn window_start(hours: i64) -> i64 {
    (Utc::now() - ChronoDuration::hours(hours)).timestamp()
}

pub(super) fn log_summary(mode: &str, summary: &ScanSummary, cancelled: bool) {
    if cancelled {
        info!("{mode} cancelled: {summary}");
    } else {
        info!("{mode} complete: {summary}");
    }
}

pub(super) fn load_messages(path: &str) -> Result<Vec<InputMessage>> {
    let file = File::open(path).with_context(|| format!("failed to open replay file {path}"))?;
    read_messages(BufReader::new(file))
}

/// Parse JSON-lines messages, skipping blank lines, ordered oldest first.
pub(super) fn read_messages<R: BufRead>(reader: R) -> Result<Vec<InputMessage>> {
    let mut messages = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: InputMessage = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON at line {}", idx + 1))?;
        messages.push(msg);
    }

    messages.sort_by_key(|m| (m.timestamp, m.channel_id));
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_orders_jsonl() {
        let input = concat!(
            r#"{"timestamp":20,"channel_id":1,"channel_title":"A","text":"second"}"#,
            "\n\n",
            r#"{"timestamp":10,"channel_id":2,"channel_title":"B","text":"first"}"#,
            "\n",
        );
        let msgs = read_messages(input.as_bytes()).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, "first");
        assert_eq!(msgs[1].channel_title, "A");
    }

    #[test]
    fn bad_line_reports_its_number() {
        let input = "{\"text\":\"ok\"}\nnot json\n";
        let err = read_messages(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn window_start_is_in_the_past() {
        let now = Utc::now().timestamp();
        let start = window_start(6);
        assert!(now - start >= 6 * 3600);
        assert!(now - start < 6 * 3600 + 5);
    }
}
