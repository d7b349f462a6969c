//! Result-list state for one browsing surface, with stale-response discard.
//!
//! Every request started through [`SearchSession::begin`] gets a generation
//! number. Only the completion carrying the latest generation is applied; an
//! older response that arrives late is dropped, so a slow category load can
//! never overwrite the results of the search typed after it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use serde::Serialize;

use crate::app_response::AppResponse;
use crate::catalog::{BookRecord, CatalogRequest};
use crate::catalog_client::CatalogSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SearchState {
    Idle,
    Loading { request: CatalogRequest },
    Loaded { request: CatalogRequest, records: Vec<BookRecord> },
    Empty { request: CatalogRequest },
    Failed { request: CatalogRequest, message: String },
}

/// Proof of which request a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub generation: u64,
    pub request: CatalogRequest,
}

struct SessionState {
    generation: u64,
    state: SearchState,
}

pub struct SearchSession {
    inner: Mutex<SessionState>,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSession {
    pub fn new() -> Self {
        SearchSession {
            inner: Mutex::new(SessionState {
                generation: 0,
                state: SearchState::Idle,
            }),
        }
    }

    pub fn state(&self) -> SearchState {
        self.lock().state.clone()
    }

    /// Records currently on display, empty unless the state is `Loaded`.
    pub fn records(&self) -> Vec<BookRecord> {
        match &self.lock().state {
            SearchState::Loaded { records, .. } => records.clone(),
            _ => Vec::new(),
        }
    }

    /// Marks `request` as the latest one and switches to `Loading`.
    pub fn begin(&self, request: CatalogRequest) -> SearchTicket {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = SearchState::Loading { request: request.clone() };
        SearchTicket {
            generation: inner.generation,
            request,
        }
    }

    pub fn is_latest(&self, ticket: &SearchTicket) -> bool {
        self.lock().generation == ticket.generation
    }

    /// Applies the outcome of `ticket`'s request. Returns `false`, leaving the
    /// state alone, when a newer request has been started since.
    pub fn complete(
        &self,
        ticket: SearchTicket,
        outcome: Result<Vec<BookRecord>, AppResponse>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != ticket.generation {
            debug!(
                "Discarding stale response for {} (generation {} < {})",
                ticket.request.query, ticket.generation, inner.generation
            );
            return false;
        }

        let request = ticket.request;
        inner.state = match outcome {
            Ok(records) if records.is_empty() => SearchState::Empty { request },
            Ok(records) => SearchState::Loaded { request, records },
            Err(e) => {
                warn!("Catalog request for {} failed: {e}", request.query);
                SearchState::Failed {
                    request,
                    message: e.to_string(),
                }
            }
        };
        true
    }

    /// The request to re-issue from the retry button, if the last one failed.
    pub fn retry_request(&self) -> Option<CatalogRequest> {
        match &self.lock().state {
            SearchState::Failed { request, .. } => Some(request.clone()),
            _ => None,
        }
    }

    /// Starts `request` against `source` and applies the result if it is still
    /// the latest when it lands.
    pub async fn run<S: CatalogSource>(&self, source: &S, request: CatalogRequest) -> bool {
        let ticket = self.begin(request);
        let outcome = source.search(&ticket.request).await;
        self.complete(ticket, outcome)
    }

    /// Re-runs the failed request. `None` when there is nothing to retry.
    pub async fn retry<S: CatalogSource>(&self, source: &S) -> Option<bool> {
        let request = self.retry_request()?;
        Some(self.run(source, request).await)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
