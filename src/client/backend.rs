use reqwest::{Client, RequestBuilder};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::search::error::SearchError;
use crate::search::request::SearchRequest;
use crate::search::response::{ErrorBody, SearchResult};
use crate::search::service::SearchService;
use crate::search::store::PointStore;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("{}: {}", .0.error, .0.message)]
    Rejected(ErrorBody),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Rejected(body) => body.retryable,
            ClientError::Cancelled | ClientError::Decode(_) => false,
        }
    }

    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            ClientError::Rejected(body) => body.request_id,
            _ => None,
        }
    }
}

/// Something that can answer a search. Implementations should stop work
/// promptly once `cancel` fires; the orchestrator discards late results
/// either way.
pub trait SearchBackend: Send + Sync + 'static {
    fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<SearchResult, ClientError>> + Send;
}

/// Talks to a remote `map_search serve` instance.
#[derive(Debug, Clone)]
pub struct HttpSearchBackend {
    client: Client,
    endpoint: Url,
}

impl HttpSearchBackend {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000/`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("api/search"))
            .map_err(|e| ClientError::Transport(format!("invalid base url {base_url:?}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

async fn send_and_decode(req: RequestBuilder) -> Result<SearchResult, ClientError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    let status = resp.status();

    if status.is_success() {
        return resp
            .json::<SearchResult>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    Err(error_from_body(status.as_u16(), &body))
}

/// Turns a non-2xx response into a [`ClientError`], tolerating bodies that
/// are not our JSON error shape (proxies, load balancers).
pub fn error_from_body(status: u16, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => ClientError::Rejected(parsed),
        Err(_) => {
            let mut fallback = ErrorBody::new("http", format!("HTTP {status}"));
            fallback.retryable = status >= 500;
            ClientError::Rejected(fallback)
        }
    }
}

impl SearchBackend for HttpSearchBackend {
    fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<SearchResult, ClientError>> + Send {
        let req = self.client.post(self.endpoint.clone()).json(&request);
        async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(ClientError::Cancelled),
                outcome = send_and_decode(req) => outcome,
            }
        }
    }
}

/// In-process backend: the orchestrator drives the service directly.
impl<S: PointStore> SearchBackend for SearchService<S> {
    fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<SearchResult, ClientError>> + Send {
        async move {
            SearchService::search_until(self, &request, &cancel)
                .await
                .map_err(|failure| match failure.source {
                    SearchError::Cancelled => ClientError::Cancelled,
                    _ => ClientError::Rejected(ErrorBody::from(&failure)),
                })
        }
    }
}
