//! Location extraction for chat messages.
//!
//! A message is classified first ([`classify`]); only clean/alert messages
//! are normalized and fed through the marker cascade:
//!
//! 1. **Location phrases** – configured surface forms of known places.
//! 2. **Fallback tokens** – single words that are always worth a lookup.
//! 3. **Intersection** – "перехрестя X та Y" style street crossings.
//! 4. **General tokens** – every remaining word, longest first.
//! 5. **Whole remainder** – the leftover text as one query.
//!
//! The cascade stops at the first stage that yields a marker.  The working
//! text is threaded through the stages by value and shrinks as matches are
//! consumed.

pub mod classify;
pub mod normalize;
pub mod record;
pub mod trace;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::geocode::{Coordinate, LocationLookup, geocode};

use classify::classify;
use normalize::{Corrections, WordPattern, collapse_whitespace, normalize, tokens};
use record::{Marker, MessageRecord, Outcome, Source, Status};
use trace::{Phase, Step, Trace};

/// Pause between general-token lookups.
pub const DEFAULT_TOKEN_DELAY: Duration = Duration::from_millis(200);

/// Returned by a stage when the cancellation token fired.
#[derive(Debug)]
struct Cancelled;

/// Remaining text plus the markers found so far.
#[derive(Debug, Clone, Default)]
struct Extraction {
    remaining: String,
    markers: Vec<Marker>,
}

impl Extraction {
    fn found(&self) -> bool {
        !self.markers.is_empty()
    }

    fn push(&mut self, label: &str, coord: Coordinate) {
        self.markers.push(Marker {
            label: label.to_string(),
            lat: coord.lat,
            lon: coord.lon,
        });
    }

    /// Remove the first whole-word occurrence of `pattern` from the
    /// remaining text.
    fn consume(&mut self, phase: Phase, pattern: &WordPattern, trace: &mut Trace) {
        self.remaining = pattern.remove_first(&self.remaining);
        trace.push(Step::TextConsumed {
            phase,
            removed: pattern.text.clone(),
            text: self.remaining.clone(),
        });
    }
}

type StageResult = Result<Extraction, Cancelled>;

struct CompiledPhrase {
    key: String,
    first_variant: Option<String>,
    variants: Vec<WordPattern>,
}

impl CompiledPhrase {
    /// Query to try when geocoding the key failed: the matched variant when
    /// it differs from the key, else the entry's first variant when that
    /// differs.
    fn secondary_query<'a>(&'a self, matched: &'a str) -> Option<&'a str> {
        if matched != self.key {
            return Some(matched);
        }
        self.first_variant.as_deref().filter(|v| *v != self.key)
    }
}

struct IntersectionPattern {
    keyword: String,
    conjunction: String,
    pattern: Regex,
    street_prefix: Option<Regex>,
}

impl IntersectionPattern {
    fn compile(cfg: &Configuration) -> Option<Self> {
        let locale = &cfg.locale;
        let street = r"([\p{L}\d\s.'-]+)";
        let words: Vec<String> = locale
            .conjunctions
            .iter()
            .map(|c| regex::escape(c))
            .collect();
        let separator = if words.is_empty() {
            r"\s*[/&+]\s*".to_string()
        } else {
            format!(r"\s*[/&+]\s*|\s+(?:{})\s+", words.join("|"))
        };
        let pattern = format!(
            r"(?i){kw}\s+{street}(?:{separator}){street}",
            kw = regex::escape(&locale.intersection_word),
        );

        let pattern = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!("Intersection parsing disabled: {e}");
                return None;
            }
        };

        let prefixes: Vec<String> = locale
            .street_prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect();
        let street_prefix = if prefixes.is_empty() {
            None
        } else {
            Regex::new(&format!(r"(?i)^(?:{})\s+", prefixes.join("|"))).ok()
        };

        Some(Self {
            keyword: locale.intersection_word.clone(),
            conjunction: locale.query_conjunction().to_string(),
            pattern,
            street_prefix,
        })
    }

    fn clean_street(&self, raw: &str) -> String {
        let raw = raw.trim();
        match &self.street_prefix {
            Some(re) => re.replace(raw, "").trim().to_string(),
            None => raw.to_string(),
        }
    }
}

/// The extraction pipeline.  Holds the read-only configuration, the lookup
/// collaborator and everything precompiled from the config.  One instance
/// can serve any number of messages.
pub struct Extractor {
    cfg: Arc<Configuration>,
    lookup: Arc<dyn LocationLookup>,
    corrections: Corrections,
    phrases: Vec<CompiledPhrase>,
    intersection: Option<IntersectionPattern>,
    token_delay: Duration,
}

impl Extractor {
    pub fn new(cfg: Arc<Configuration>, lookup: Arc<dyn LocationLookup>) -> Self {
        let corrections = Corrections::compile(&cfg);
        let phrases = cfg
            .location_phrases
            .iter()
            .map(|p| CompiledPhrase {
                key: p.key.clone(),
                first_variant: p.variants.first().cloned(),
                variants: p.variants.iter().filter_map(|v| WordPattern::new(v)).collect(),
            })
            .collect();
        let intersection = IntersectionPattern::compile(&cfg);

        Self {
            cfg,
            lookup,
            corrections,
            phrases,
            intersection,
            token_delay: DEFAULT_TOKEN_DELAY,
        }
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Classify, normalize and extract markers from one message.
    ///
    /// Messages without text or without any status word come back as a
    /// finished record with a `skipped_*` status and no lookups made.
    pub async fn process(&self, raw: &str, source: Source, cancel: &CancellationToken) -> Outcome {
        let text = raw.trim();
        let mut record = MessageRecord::new(raw, source);

        if text.is_empty() {
            record.status = Status::SkippedNoText;
            record.trace.push(Step::TextMissing);
            return Outcome::Finished(record);
        }

        let lower = text.to_lowercase();
        let class = classify(&lower, &self.cfg);
        record.trace.push(Step::StatusWordCheck {
            has_green: class.has_green,
            has_red: class.has_red,
            status: class.status,
        });

        if class.status == Status::Unknown {
            record.status = Status::SkippedNoStatusWords;
            return Outcome::Finished(record);
        }
        record.status = class.status;

        let normalized = normalize(&lower, &self.cfg, &self.corrections, &mut record.trace);

        match self.extract(normalized, &mut record.trace, cancel).await {
            Ok(markers) => {
                record.markers = markers;
                let outcome = record.outcome();
                record.trace.push(Step::FinalOutcome { outcome });
                Outcome::Finished(record)
            }
            Err(Cancelled) => {
                debug!("Extraction cancelled mid-message");
                Outcome::Cancelled
            }
        }
    }

    // ── Cascade ─────────────────────────────────────────────────────────

    async fn extract(
        &self,
        normalized: String,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> Result<Vec<Marker>, Cancelled> {
        let state = Extraction {
            remaining: normalized,
            markers: Vec::new(),
        };

        checkpoint(cancel, trace)?;
        let state = self.location_phrases(state, trace, cancel).await?;
        if state.found() {
            return Ok(state.markers);
        }

        checkpoint(cancel, trace)?;
        let state = self.fallback_tokens(state, trace, cancel).await?;
        if state.found() {
            return Ok(state.markers);
        }

        checkpoint(cancel, trace)?;
        let state = self.intersection(state, trace, cancel).await?;
        if state.found() {
            return Ok(state.markers);
        }

        checkpoint(cancel, trace)?;
        let state = self.general_tokens(state, trace, cancel).await?;
        if state.found() {
            return Ok(state.markers);
        }

        checkpoint(cancel, trace)?;
        let state = self.whole_remainder(state, trace, cancel).await?;
        Ok(state.markers)
    }

    async fn location_phrases(
        &self,
        mut state: Extraction,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> StageResult {
        let phase = Phase::LocationPhrases;
        trace.push(Step::PhaseStart {
            phase,
            text: state.remaining.clone(),
        });

        for phrase in &self.phrases {
            for variant in &phrase.variants {
                if !variant.is_match(&state.remaining) {
                    continue;
                }
                trace.push(Step::PhraseMatched {
                    key: phrase.key.clone(),
                    variant: variant.text.clone(),
                });

                let mut coord = self.attempt(&phrase.key, trace, cancel).await?;
                if coord.is_none() {
                    if let Some(secondary) = phrase.secondary_query(&variant.text) {
                        coord = self.attempt(secondary, trace, cancel).await?;
                    }
                }

                if let Some(coord) = coord {
                    state.push(&phrase.key, coord);
                    state.consume(phase, variant, trace);
                    break;
                }
            }
        }

        trace.push(Step::PhaseEnd {
            phase,
            markers: state.markers.len(),
        });
        Ok(state)
    }

    async fn fallback_tokens(
        &self,
        mut state: Extraction,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> StageResult {
        let phase = Phase::FallbackTokens;
        trace.push(Step::PhaseStart {
            phase,
            text: state.remaining.clone(),
        });

        for token in tokens(&state.remaining) {
            if !self.cfg.is_fallback_token(&token) {
                continue;
            }
            if self.cfg.is_status_or_ignore_word(&token) {
                trace.push(Step::TokenSkipped {
                    token,
                    reason: "is_status_or_ignore_word",
                });
                continue;
            }

            trace.push(Step::TokenAttempt {
                token: token.clone(),
            });
            if let Some(coord) = self.attempt(&token, trace, cancel).await? {
                state.push(&token, coord);
                if let Some(pattern) = WordPattern::new(&token) {
                    state.consume(phase, &pattern, trace);
                }
            }
        }

        trace.push(Step::PhaseEnd {
            phase,
            markers: state.markers.len(),
        });
        Ok(state)
    }

    async fn intersection(
        &self,
        mut state: Extraction,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> StageResult {
        let phase = Phase::Intersection;
        let Some(parser) = &self.intersection else {
            trace.push(Step::PhaseSkipped {
                phase,
                reason: "intersection_parser_disabled",
            });
            return Ok(state);
        };
        if !state.remaining.contains(parser.keyword.as_str()) {
            trace.push(Step::PhaseSkipped {
                phase,
                reason: "no_intersection_word",
            });
            return Ok(state);
        }

        trace.push(Step::PhaseStart {
            phase,
            text: state.remaining.clone(),
        });

        let parsed = parser.pattern.captures(&state.remaining).map(|caps| {
            (
                caps[0].to_string(),
                parser.clean_street(&caps[1]),
                parser.clean_street(&caps[2]),
            )
        });

        if let Some((matched, street_a, street_b)) = parsed {
            if !street_a.is_empty() && !street_b.is_empty() {
                let query = format!("{street_a} {} {street_b}", parser.conjunction);
                let label = format!("{} {street_a} / {street_b}", parser.keyword);
                trace.push(Step::IntersectionParsed {
                    matched: matched.clone(),
                    query: query.clone(),
                    label: label.clone(),
                });

                if let Some(coord) = self.attempt(&query, trace, cancel).await? {
                    state.push(&label, coord);
                    state.remaining = collapse_whitespace(&state.remaining.replacen(&matched, " ", 1));
                    trace.push(Step::TextConsumed {
                        phase,
                        removed: matched,
                        text: state.remaining.clone(),
                    });
                }
            }
        }

        trace.push(Step::PhaseEnd {
            phase,
            markers: state.markers.len(),
        });
        Ok(state)
    }

    async fn general_tokens(
        &self,
        mut state: Extraction,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> StageResult {
        let phase = Phase::GeneralTokens;
        trace.push(Step::PhaseStart {
            phase,
            text: state.remaining.clone(),
        });

        let intersection_word = self.cfg.locale.intersection_word.as_str();
        let mut candidates: Vec<String> = Vec::new();
        for token in tokens(&state.remaining) {
            let excluded = self.cfg.is_status_or_ignore_word(&token)
                || self.cfg.is_fallback_token(&token)
                || token == intersection_word;
            if !excluded && !candidates.contains(&token) {
                candidates.push(token);
            }
        }
        // longest first, stable
        candidates.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
        trace.push(Step::TokensToTry {
            tokens: candidates.clone(),
        });

        let mut attempted = false;
        for token in candidates {
            if token.chars().count() < self.cfg.fuzzy.min_length {
                trace.push(Step::TokenSkipped {
                    token,
                    reason: "too_short",
                });
                continue;
            }
            if attempted {
                self.pause(cancel).await?;
            }
            attempted = true;

            if let Some(coord) = self.attempt(&token, trace, cancel).await? {
                state.push(&token, coord);
                if let Some(pattern) = WordPattern::new(&token) {
                    state.consume(phase, &pattern, trace);
                }
                break;
            }
        }

        trace.push(Step::PhaseEnd {
            phase,
            markers: state.markers.len(),
        });
        Ok(state)
    }

    async fn whole_remainder(
        &self,
        mut state: Extraction,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> StageResult {
        let phase = Phase::WholeRemainder;
        trace.push(Step::PhaseStart {
            phase,
            text: state.remaining.clone(),
        });

        let text = state.remaining.trim().to_string();
        let skip_reason = if text.is_empty() {
            Some("empty")
        } else if self.cfg.is_status_or_ignore_word(&text) {
            Some("is_status_word")
        } else if text.chars().count() < self.cfg.fuzzy.min_length {
            Some("too_short")
        } else {
            None
        };

        match skip_reason {
            Some(reason) => trace.push(Step::TokenSkipped {
                token: text,
                reason,
            }),
            None => {
                if let Some(coord) = self.attempt(&text, trace, cancel).await? {
                    state.push(&text, coord);
                }
            }
        }

        trace.push(Step::PhaseEnd {
            phase,
            markers: state.markers.len(),
        });
        Ok(state)
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// One geocode attempt, abandoned as soon as `cancel` fires.
    async fn attempt(
        &self,
        query: &str,
        trace: &mut Trace,
        cancel: &CancellationToken,
    ) -> Result<Option<Coordinate>, Cancelled> {
        checkpoint(cancel, trace)?;
        let lookup = self.lookup.as_ref();
        let cfg = self.cfg.as_ref();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            coord = geocode(lookup, query, cfg, trace) => Ok(coord),
        };
        if result.is_err() {
            trace.push(Step::Cancelled);
        }
        result
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if self.token_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(self.token_delay) => Ok(()),
        }
    }
}

fn checkpoint(cancel: &CancellationToken, trace: &mut Trace) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        trace.push(Step::Cancelled);
        return Err(Cancelled);
    }
    Ok(())
}
