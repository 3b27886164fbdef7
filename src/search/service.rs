use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::search::cluster::build_clusters;
use crate::search::error::{QueryKind, SearchError, SearchFailure, StoreError};
use crate::search::mode::MapMode;
use crate::search::predicate::SearchPredicate;
use crate::search::request::SearchRequest;
use crate::search::response::{ListPage, MapData, SearchMeta, SearchResult};
use crate::search::retry::retry_with_backoff;
use crate::search::store::PointStore;

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn fail(span: &Span, request_id: Uuid, started: Instant, source: SearchError) -> SearchFailure {
    let duration_ms = elapsed_ms(started);
    let _entered = span.enter();
    match &source {
        SearchError::Validation(msg) => {
            warn!(duration_ms, reason = %msg, "rejected invalid search request")
        }
        SearchError::Cancelled => debug!(duration_ms, "search cancelled"),
        e if e.is_retryable() => warn!(duration_ms, error = %e, "search failed after retries"),
        e => error!(duration_ms, error = %e, "search failed"),
    }
    SearchFailure {
        request_id,
        duration_ms,
        source,
    }
}

/// Entry point of the subsystem: one request in, one consistent answer out.
///
/// Stateless between calls. The count, list and map queries run
/// concurrently against the same predicate; if any of them fails the whole
/// search fails and nothing partial is returned.
pub struct SearchService<S> {
    store: Arc<S>,
    config: SearchConfig,
}

impl<S: PointStore> SearchService<S> {
    pub fn new(store: S, config: SearchConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult, SearchFailure> {
        self.search_until(request, &CancellationToken::new()).await
    }

    /// Like [`search`](Self::search), but gives up with
    /// [`SearchError::Cancelled`] once `cancel` fires. Store queries still
    /// running at that point are interrupted.
    pub async fn search_until(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchFailure> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("search", %request_id);

        let outcome = self
            .execute(request, request_id, started, cancel)
            .instrument(span.clone())
            .await;

        outcome.map_err(|source| fail(&span, request_id, started, source))
    }

    /// Failure for a request that never reached [`search`](Self::search),
    /// e.g. one whose body could not be decoded. It gets a request id and a
    /// duration like any other failed search.
    pub fn reject(&self, source: SearchError, started: Instant) -> SearchFailure {
        let request_id = Uuid::new_v4();
        let span = info_span!("search", %request_id);
        fail(&span, request_id, started, source)
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        request_id: Uuid,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        let search = request.validate(self.config.max_page_size)?;
        let predicate = Arc::new(SearchPredicate::build(
            &search.viewport.bounds,
            &search.filters,
        ));
        let mode = MapMode::for_zoom(search.viewport.zoom, self.config.zoom_threshold);
        debug!(
            mode = mode.name(),
            zoom = search.viewport.zoom,
            page = search.page,
            limit = search.limit,
            "fanning out"
        );

        let count = {
            let predicate = Arc::clone(&predicate);
            self.query(QueryKind::Count, cancel, move |store, token| {
                store.count(&predicate, token)
            })
        };
        let list = {
            let predicate = Arc::clone(&predicate);
            let (page, limit) = (search.page, search.limit);
            self.query(QueryKind::List, cancel, move |store, token| {
                store.list_page(&predicate, page, limit, token)
            })
        };
        let map = self.map_data(mode, Arc::clone(&predicate), cancel);

        let query_started = Instant::now();
        // Dropping the fan-out interrupts whatever is still running.
        let (total, items, map_data) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            joined = async { tokio::try_join!(count, list, map) } => joined?,
        };
        let db_query_ms = elapsed_ms(query_started);

        let list = ListPage::new(items, search.page, search.limit, total);
        let meta = SearchMeta {
            request_id,
            duration_ms: elapsed_ms(started),
            db_query_ms,
            clustering_precision: mode.precision().map(u8::from),
            timestamp: Utc::now(),
        };

        info!(
            mode = mode.name(),
            total,
            total_pages = list.total_pages,
            map_items = map_data.len(),
            list_items = list.items.len(),
            clustering_precision = meta.clustering_precision,
            duration_ms = meta.duration_ms,
            db_query_ms,
            "search complete"
        );

        Ok(SearchResult::assemble(map_data, list, meta))
    }

    async fn map_data(
        &self,
        mode: MapMode,
        predicate: Arc<SearchPredicate>,
        cancel: &CancellationToken,
    ) -> Result<MapData, SearchError> {
        match mode {
            MapMode::Clusters { precision } => {
                let cap = self.config.cluster_input_cap;
                let points = self
                    .query(QueryKind::Map, cancel, move |store, token| {
                        store.cluster_points(&predicate, precision, cap, token)
                    })
                    .await?;
                if points.len() >= cap {
                    // Cluster counts may now sum to less than the total.
                    debug!(cap, "cluster input reached its cap");
                }
                Ok(MapData::Clusters(build_clusters(
                    &points,
                    self.config.cluster_output_cap,
                )))
            }
            MapMode::Properties => {
                let cap = self.config.properties_map_cap;
                let markers = self
                    .query(QueryKind::Map, cancel, move |store, token| {
                        store.map_markers(&predicate, cap, token)
                    })
                    .await?;
                Ok(MapData::Properties(markers))
            }
        }
    }

    /// One store call on the blocking pool, bounded by the per-attempt
    /// timeout and retried on transient failures.
    ///
    /// Every attempt gets its own child of `cancel`. It fires when the attempt
    /// times out or its future is dropped, so an abandoned store call never
    /// runs to completion in the background.
    async fn query<T, F>(
        &self,
        kind: QueryKind,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, SearchError>
    where
        T: Send + 'static,
        F: Fn(&S, &CancellationToken) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let policy = self.config.retry;

        retry_with_backoff(&policy, kind.as_str(), |attempt| {
            let store = Arc::clone(&self.store);
            let f = Arc::clone(&f);
            let token = cancel.child_token();
            async move {
                let _interrupt = token.clone().drop_guard();
                let task = tokio::task::spawn_blocking(move || f(&store, &token));
                match tokio::time::timeout(policy.attempt_timeout, task).await {
                    Err(_) => Err(SearchError::Timeout {
                        query: kind,
                        attempts: attempt,
                    }),
                    Ok(Err(join)) => Err(SearchError::Upstream {
                        query: kind,
                        source: StoreError::Query(format!("store task failed: {join}")),
                    }),
                    Ok(Ok(result)) => result.map_err(|e| SearchError::from_store(kind, e)),
                }
            }
        })
        .await
    }
}
