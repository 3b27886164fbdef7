use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::backend::{ClientError, SearchBackend};
use crate::client::store::{Action, LastError, ResultStore, SearchQuery, SearchState};
use crate::config::DEBOUNCE;
use crate::domain::{FilterSet, Viewport};
use crate::search::request::DEFAULT_PAGE_SIZE;
use crate::search::response::SearchResult;

/// Events that may lead to a new search.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Viewport(Viewport),
    /// Also resets the page to 1.
    Filters(FilterSet),
    Page(u32),
    /// Re-issue the current query, e.g. after a transient failure.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorOptions {
    /// Quiet period required before a search fires.
    pub debounce: Duration,
    pub page_size: u32,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Error)]
#[error("search orchestrator has stopped")]
pub struct OrchestratorStopped;

/// Cheap, cloneable front door to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    triggers: mpsc::UnboundedSender<Trigger>,
    state: watch::Receiver<SearchState>,
}

impl OrchestratorHandle {
    pub fn send(&self, trigger: Trigger) -> Result<(), OrchestratorStopped> {
        self.triggers.send(trigger).map_err(|_| OrchestratorStopped)
    }

    pub fn set_viewport(&self, viewport: Viewport) -> Result<(), OrchestratorStopped> {
        self.send(Trigger::Viewport(viewport))
    }

    pub fn set_filters(&self, filters: FilterSet) -> Result<(), OrchestratorStopped> {
        self.send(Trigger::Filters(filters))
    }

    pub fn set_page(&self, page: u32) -> Result<(), OrchestratorStopped> {
        self.send(Trigger::Page(page))
    }

    pub fn retry(&self) -> Result<(), OrchestratorStopped> {
        self.send(Trigger::Retry)
    }

    /// Current state, cloned out of the watch channel.
    pub fn snapshot(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.clone()
    }
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

struct Completion {
    seq: u64,
    token: CancellationToken,
    outcome: Result<SearchResult, ClientError>,
}

/// Turns a stream of triggers into debounced, cancellable searches and
/// applies only the outcome of the latest one to the [`ResultStore`].
pub struct Orchestrator<B> {
    backend: Arc<B>,
    store: ResultStore,
    options: OrchestratorOptions,

    viewport: Option<Viewport>,
    filters: FilterSet,
    page: u32,

    next_seq: u64,
    in_flight: Option<InFlight>,
}

impl<B: SearchBackend> Orchestrator<B> {
    /// Starts the event loop on the current tokio runtime. The loop stops,
    /// cancelling any in-flight search, once every handle is dropped.
    pub fn spawn(backend: B, options: OrchestratorOptions) -> OrchestratorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            backend: Arc::new(backend),
            store: ResultStore::new(),
            options,
            viewport: None,
            filters: FilterSet::default(),
            page: 1,
            next_seq: 0,
            in_flight: None,
        };
        let state = orchestrator.store.subscribe();
        tokio::spawn(orchestrator.run(rx));

        OrchestratorHandle {
            triggers: tx,
            state,
        }
    }

    async fn run(mut self, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => {
                        self.apply(trigger);
                        // Reset, never extend-and-queue.
                        deadline = Some(Instant::now() + self.options.debounce);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.fire(&done_tx);
                }
                Some(done) = done_rx.recv() => self.complete(done),
            }
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
        debug!("search orchestrator stopped");
    }

    fn current_query(&self) -> Option<SearchQuery> {
        self.viewport.map(|viewport| SearchQuery {
            viewport,
            filters: self.filters.clone(),
            page: self.page,
            limit: self.options.page_size,
        })
    }

    fn apply(&mut self, trigger: Trigger) {
        trace!(?trigger, "trigger");
        match trigger {
            Trigger::Viewport(viewport) => self.viewport = Some(viewport),
            Trigger::Filters(filters) => {
                self.filters = filters.normalized();
                self.page = 1;
            }
            Trigger::Page(page) => self.page = page.max(1),
            Trigger::Retry => {}
        }
        if let Some(query) = self.current_query() {
            self.store.dispatch(Action::QueryChanged(query));
        }
    }

    fn fire(&mut self, done: &mpsc::UnboundedSender<Completion>) {
        let Some(query) = self.current_query() else {
            debug!("no viewport yet, nothing to search");
            return;
        };

        if let Some(previous) = self.in_flight.take() {
            debug!(seq = previous.seq, "superseding in-flight search");
            previous.token.cancel();
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            seq,
            token: token.clone(),
        });
        self.store.dispatch(Action::FetchStarted { seq });
        debug!(seq, zoom = query.viewport.zoom, page = query.page, "search fired");

        let backend = Arc::clone(&self.backend);
        let request = query.to_request();
        let done = done.clone();
        tokio::spawn(async move {
            let outcome = backend.search(request, token.clone()).await;
            // The loop may already be gone; nothing left to update then.
            let _ = done.send(Completion {
                seq,
                token,
                outcome,
            });
        });
    }

    fn complete(&mut self, done: Completion) {
        let current = self.in_flight.as_ref().map(|f| f.seq);
        if done.token.is_cancelled() || current != Some(done.seq) {
            debug!(seq = done.seq, ?current, "discarding superseded response");
            return;
        }
        self.in_flight = None;

        match done.outcome {
            Ok(result) => self.store.dispatch(Action::FetchSucceeded {
                seq: done.seq,
                result,
            }),
            // A backend gave up on its own; settle quietly, never as an error.
            Err(ClientError::Cancelled) => {
                debug!(seq = done.seq, "backend reported cancellation");
                self.store.dispatch(Action::FetchAbandoned { seq: done.seq })
            }
            Err(e) => {
                debug!(seq = done.seq, error = %e, "search failed");
                self.store.dispatch(Action::FetchFailed {
                    seq: done.seq,
                    error: LastError::from(&e),
                })
            }
        }
    }
}
