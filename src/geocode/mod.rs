//! Geocoder adapter: city-scoped lookup plus fuzzy best-candidate selection.
//!
//! The lookup service itself sits behind [`LocationLookup`]; production code
//! uses [`nominatim::NominatimLookup`].  [`geocode`] never fails – a service
//! error, an empty answer, a failed fuzzy gate or unparseable coordinates all
//! resolve to `None` with a trace entry explaining why.

pub mod nominatim;
#[cfg(test)]
pub mod stub;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Configuration, FuzzyPolicy};
use crate::extract::trace::{Step, Trace};
use crate::similarity::levenshtein;

/// Number of candidates requested per lookup.
pub const CANDIDATE_LIMIT: usize = 5;

/// One raw answer from the lookup service.  Coordinates stay as the
/// service sent them and are only parsed for the winning candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub display_name: String,
    pub lat: String,
    pub lon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding service unavailable: {0}")]
    Unavailable(String),
}

/// External query-by-string → candidate-list service.
#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, LookupError>;
}

/// Resolve `query` to a coordinate.  See the module docs for the failure
/// modes; each one is recorded in `trace`.
pub async fn geocode(
    lookup: &dyn LocationLookup,
    query: &str,
    cfg: &Configuration,
    trace: &mut Trace,
) -> Option<Coordinate> {
    let cleaned = query.trim().to_lowercase();
    if cleaned.is_empty() {
        trace.push(Step::GeocodeSkipped {
            query: query.to_string(),
            reason: "empty_query_skipped",
        });
        return None;
    }

    let scoped = if cfg.city.is_empty() {
        cleaned.clone()
    } else {
        format!("{} {cleaned}", cfg.city)
    };
    trace.push(Step::GeocodeAttempt {
        query: cleaned.clone(),
        scoped_query: scoped.clone(),
    });
    debug!("Geocoding {scoped:?}");

    let candidates = match lookup.lookup(&scoped, CANDIDATE_LIMIT).await {
        Ok(c) => c,
        Err(e) => {
            warn!("Lookup for {scoped:?} failed: {e}");
            trace.push(Step::GeocodeMiss {
                query: cleaned,
                reason: format!("lookup_failed: {e}"),
            });
            return None;
        }
    };

    if candidates.is_empty() {
        trace.push(Step::GeocodeMiss {
            query: cleaned,
            reason: "no_results".into(),
        });
        return None;
    }

    let Some((best, distance)) = select_best(&cleaned, &candidates, cfg) else {
        let names: Vec<&str> = candidates.iter().map(|c| c.display_name.as_str()).collect();
        trace.push(Step::GeocodeMiss {
            query: cleaned,
            reason: format!("fuzzy_match_failed: {}", names.join(" | ")),
        });
        return None;
    };

    match parse_coordinate(best) {
        Some(coord) => {
            debug!(
                "Geocoded {cleaned:?} → {:?} ({}, {}) d={distance}",
                best.display_name, coord.lat, coord.lon
            );
            trace.push(Step::GeocodeHit {
                query: cleaned,
                name: best.display_name.clone(),
                lat: coord.lat,
                lon: coord.lon,
                distance,
            });
            Some(coord)
        }
        None => {
            trace.push(Step::GeocodeMiss {
                query: cleaned,
                reason: format!("unparseable_coordinates: {:?}/{:?}", best.lat, best.lon),
            });
            None
        }
    }
}

/// Pick the candidate with the smallest distance that passes the fuzzy
/// gate.  Ties go to the earliest candidate.
pub fn select_best<'a>(
    query: &str,
    candidates: &'a [Candidate],
    cfg: &Configuration,
) -> Option<(&'a Candidate, usize)> {
    let query_len = query.chars().count();
    let mut best: Option<(&Candidate, usize)> = None;

    for candidate in candidates {
        let distance = candidate_distance(query, candidate, cfg);
        if !passes_gate(distance, query_len, &cfg.fuzzy) {
            continue;
        }
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best
}

/// Distance from `query` to the candidate's primary name, with and without
/// a locative prefix; the smaller one counts.
fn candidate_distance(query: &str, candidate: &Candidate, cfg: &Configuration) -> usize {
    let primary = primary_name(&candidate.display_name);
    let stripped = cfg.locale.strip_name_prefix(&primary);
    levenshtein(query, &primary).min(levenshtein(query, stripped))
}

/// Text before the first comma of a display name, lowercased.
pub fn primary_name(display_name: &str) -> String {
    display_name
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Fuzzy acceptance rule.  Queries of at least `min_length` characters
/// accept `distance / len <= max_distance_ratio`; shorter ones need an
/// exact match.
pub fn passes_gate(distance: usize, query_len: usize, policy: &FuzzyPolicy) -> bool {
    if query_len >= policy.min_length && query_len > 0 {
        distance as f64 / query_len as f64 <= policy.max_distance_ratio
    } else {
        distance == 0
    }
}

fn parse_coordinate(candidate: &Candidate) -> Option<Coordinate> {
    let lat = candidate.lat.trim().parse::<f64>().ok()?;
    let lon = candidate.lon.trim().parse::<f64>().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(Coordinate { lat, lon })
}
