//! Append-only diagnostic trace attached to every message record.
//!
//! The pipeline only ever pushes into a [`Trace`]; nothing in the extraction
//! logic reads it back.

use serde::Serialize;

use super::record::Status;

/// Extraction stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LocationPhrases,
    FallbackTokens,
    Intersection,
    GeneralTokens,
    WholeRemainder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    TextMissing,
    StatusWordCheck {
        has_green: bool,
        has_red: bool,
        status: Status,
    },
    AfterIgnoreWords {
        text: String,
        removed: Vec<String>,
    },
    CorrectionApplied {
        from: String,
        to: String,
        text: String,
    },
    AfterCorrections {
        text: String,
    },
    PhaseStart {
        phase: Phase,
        text: String,
    },
    PhaseSkipped {
        phase: Phase,
        reason: &'static str,
    },
    PhaseEnd {
        phase: Phase,
        markers: usize,
    },
    PhraseMatched {
        key: String,
        variant: String,
    },
    TokenAttempt {
        token: String,
    },
    TokenSkipped {
        token: String,
        reason: &'static str,
    },
    TokensToTry {
        tokens: Vec<String>,
    },
    IntersectionParsed {
        matched: String,
        query: String,
        label: String,
    },
    TextConsumed {
        phase: Phase,
        removed: String,
        text: String,
    },
    GeocodeSkipped {
        query: String,
        reason: &'static str,
    },
    GeocodeAttempt {
        query: String,
        scoped_query: String,
    },
    GeocodeMiss {
        query: String,
        reason: String,
    },
    GeocodeHit {
        query: String,
        name: String,
        lat: f64,
        lon: f64,
        distance: usize,
    },
    Cancelled,
    FinalOutcome {
        outcome: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trace {
    steps: Vec<Step>,
}

impl Trace {
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Phases that were started, in order.
    pub fn phases_started(&self) -> Vec<Phase> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::PhaseStart { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect()
    }
}
