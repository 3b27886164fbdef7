use crate::db::SqlitePointStore;
use crate::errors::ServerError;
use crate::responses::{json_response, ResultResp};
use crate::search::{SearchError, SearchRequest, SearchService};
use astra::Request;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::debug;

/// Shared by every astra worker.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService<SqlitePointStore>>,
    /// Astra workers are plain threads; searches run on this runtime.
    pub runtime: Handle,
}

pub fn handle(mut req: Request, state: &AppState) -> ResultResp {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "request");
    // Decode failures are reported with the same request id and duration as
    // any other rejected search.
    let started = Instant::now();

    match (method.as_str(), path.as_str()) {
        ("GET", "/health") => json_response(200, &json!({ "status": "ok" })),

        ("GET", "/api/search") => {
            let params = parse_query(&req);
            let request = SearchRequest::from_query(&params)
                .map_err(|e| state.search.reject(e, started))?;
            run_search(state, &request)
        }

        ("POST", "/api/search") => {
            let request: SearchRequest = serde_json::from_reader(req.body_mut().reader())
                .map_err(|e| {
                    let e = SearchError::Validation(format!("invalid JSON body: {e}"));
                    state.search.reject(e, started)
                })?;
            run_search(state, &request)
        }

        _ => Err(ServerError::NotFound),
    }
}

fn run_search(state: &AppState, request: &SearchRequest) -> ResultResp {
    let result = state.runtime.block_on(state.search.search(request))?;
    json_response(200, &result)
}

fn parse_query(req: &Request) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}
