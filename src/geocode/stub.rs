//! In-memory [`LocationLookup`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Candidate, LocationLookup, LookupError};

/// Answers keyed by the exact (city-scoped) query string.  Unknown queries
/// get an empty candidate list.  Every received query is recorded.
#[derive(Default)]
pub struct StubLookup {
    answers: HashMap<String, Vec<Candidate>>,
    failures: HashMap<String, String>,
    cancel_on_lookup: Option<CancellationToken>,
    queries: Mutex<Vec<String>>,
}

impl StubLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate to the answer for `query`.
    pub fn answer(mut self, query: &str, display_name: &str, lat: &str, lon: &str) -> Self {
        self.answers
            .entry(query.to_string())
            .or_default()
            .push(Candidate {
                display_name: display_name.to_string(),
                lat: lat.to_string(),
                lon: lon.to_string(),
            });
        self
    }

    pub fn fail(mut self, query: &str, reason: &str) -> Self {
        self.failures.insert(query.to_string(), reason.to_string());
        self
    }

    /// Cancel `token` on the first lookup and never answer it.
    pub fn cancel_on_lookup(mut self, token: CancellationToken) -> Self {
        self.cancel_on_lookup = Some(token);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocationLookup for StubLookup {
    async fn lookup(&self, query: &str, _limit: usize) -> Result<Vec<Candidate>, LookupError> {
        self.queries.lock().unwrap().push(query.to_string());

        if let Some(token) = &self.cancel_on_lookup {
            token.cancel();
            std::future::pending::<()>().await;
        }
        if let Some(reason) = self.failures.get(query) {
            return Err(LookupError::Unavailable(reason.clone()));
        }
        Ok(self.answers.get(query).cloned().unwrap_or_default())
    }
}
