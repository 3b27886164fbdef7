use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::backend::ClientError;
use crate::domain::{FilterSet, Viewport};
use crate::search::request::SearchRequest;
use crate::search::response::{SearchMeta, SearchResult};

/// Everything the orchestrator needs to issue one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub viewport: Viewport,
    pub filters: FilterSet,
    pub page: u32,
    pub limit: u32,
}

impl SearchQuery {
    pub fn to_request(&self) -> SearchRequest {
        SearchRequest::new(self.viewport, self.filters.clone(), self.page, self.limit)
    }
}

/// The failure shown to the user. Cancellations never become one.
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub message: String,
    pub request_id: Option<Uuid>,
    pub retryable: bool,
}

impl From<&ClientError> for LastError {
    fn from(e: &ClientError) -> Self {
        Self {
            message: e.to_string(),
            request_id: e.request_id(),
            retryable: e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: Option<SearchQuery>,
    /// Last successful result; survives later failures.
    pub result: Option<Arc<SearchResult>>,
    pub map_loading: bool,
    pub list_loading: bool,
    pub error: Option<LastError>,
    pub diagnostics: Option<SearchMeta>,
    /// Sequence number of the only fetch whose outcome may be applied.
    pub in_flight: Option<u64>,
}

impl SearchState {
    pub fn has_active_filters(&self) -> bool {
        self.query.as_ref().is_some_and(|q| !q.filters.is_empty())
    }

    pub fn is_loading(&self) -> bool {
        self.map_loading || self.list_loading
    }
}

/// The closed set of state transitions.
#[derive(Debug, Clone)]
pub enum Action {
    QueryChanged(SearchQuery),
    FetchStarted { seq: u64 },
    FetchSucceeded { seq: u64, result: SearchResult },
    FetchFailed { seq: u64, error: LastError },
    /// The fetch ended without a result or a user-visible error.
    FetchAbandoned { seq: u64 },
}

/// Pure transition function. Outcomes for any fetch other than the one in
/// flight are ignored, so a superseded response can never land.
pub fn reduce(mut state: SearchState, action: Action) -> SearchState {
    match action {
        Action::QueryChanged(query) => {
            state.query = Some(query);
        }
        Action::FetchStarted { seq } => {
            state.in_flight = Some(seq);
            state.map_loading = true;
            state.list_loading = true;
        }
        Action::FetchSucceeded { seq, result } => {
            if state.in_flight != Some(seq) {
                return state;
            }
            state.in_flight = None;
            state.map_loading = false;
            state.list_loading = false;
            state.error = None;
            state.diagnostics = Some(result.meta.clone());
            state.result = Some(Arc::new(result));
        }
        Action::FetchFailed { seq, error } => {
            if state.in_flight != Some(seq) {
                return state;
            }
            state.in_flight = None;
            state.map_loading = false;
            state.list_loading = false;
            state.error = Some(error);
        }
        Action::FetchAbandoned { seq } => {
            if state.in_flight != Some(seq) {
                return state;
            }
            state.in_flight = None;
            state.map_loading = false;
            state.list_loading = false;
        }
    }
    state
}

/// Holds the current [`SearchState`] and publishes every change.
///
/// Only the orchestrator owns a `ResultStore`; everyone else observes it
/// through a `watch::Receiver`.
pub(crate) struct ResultStore {
    tx: watch::Sender<SearchState>,
}

impl ResultStore {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SearchState::default());
        Self { tx }
    }

    pub(crate) fn dispatch(&self, action: Action) {
        self.tx.send_modify(|state| {
            *state = reduce(std::mem::take(state), action);
        });
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.tx.subscribe()
    }
}
