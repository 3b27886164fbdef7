use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ServerError;

/// Failures reported by a point store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Busy, locked or unreachable store. Worth retrying.
    #[error("point store unavailable: {0}")]
    Unavailable(String),
    #[error("point store query failed: {0}")]
    Query(String),
    /// The caller cancelled the query before it finished.
    #[error("point store query interrupted")]
    Interrupted,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
                StoreError::Unavailable(e.to_string())
            }
            Some(ErrorCode::OperationInterrupted) => StoreError::Interrupted,
            _ => StoreError::Query(e.to_string()),
        }
    }
}

impl From<ServerError> for StoreError {
    fn from(e: ServerError) -> Self {
        match e {
            // Raised when a thread cannot open its connection.
            ServerError::DbError(msg) => StoreError::Unavailable(msg),
            ServerError::InternalError => {
                StoreError::Unavailable("connection slot unavailable".into())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Which of the three fan-out queries an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Count,
    List,
    Map,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Count => "count",
            QueryKind::List => "list",
            QueryKind::Map => "map",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("invalid search request: {0}")]
    Validation(String),
    #[error("{query} query unavailable: {message}")]
    Unavailable { query: QueryKind, message: String },
    #[error("{query} query failed: {source}")]
    Upstream {
        query: QueryKind,
        #[source]
        source: StoreError,
    },
    #[error("{query} query timed out after {attempts} attempt(s)")]
    Timeout { query: QueryKind, attempts: u32 },
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn from_store(query: QueryKind, e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(message) => SearchError::Unavailable { query, message },
            StoreError::Interrupted => SearchError::Cancelled,
            source => SearchError::Upstream { query, source },
        }
    }

    /// Transient failures that the retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Unavailable { .. } | SearchError::Timeout { .. }
        )
    }

    /// Stable machine-readable tag used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "validation",
            SearchError::Unavailable { .. } | SearchError::Upstream { .. } => "upstream",
            SearchError::Timeout { .. } => "timeout",
            SearchError::Cancelled => "cancelled",
        }
    }
}

/// A failed search, with enough context to correlate with server logs.
#[derive(Debug, Clone, Error)]
#[error("search {request_id} failed after {duration_ms}ms: {source}")]
pub struct SearchFailure {
    pub request_id: Uuid,
    pub duration_ms: u64,
    #[source]
    pub source: SearchError,
}
