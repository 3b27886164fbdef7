// errors.rs
use astra::Response;
use std::fmt;

use crate::search::SearchFailure;

/// Errors originating from either the server logic
/// (routing) or downstream layers (DB, search).
#[derive(Debug)]
pub enum ServerError {
    NotFound,
    DbError(String),
    Search(SearchFailure),
    InternalError,
}

// Type alias commonly used by route handlers.
pub type ResultResp = Result<Response, ServerError>;

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::NotFound => write!(f, "Not Found"),
            ServerError::DbError(msg) => write!(f, "Database Error: {msg}"),
            ServerError::Search(failure) => write!(f, "Search Error: {failure}"),
            ServerError::InternalError => write!(f, "Internal Server Error"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<SearchFailure> for ServerError {
    fn from(failure: SearchFailure) -> Self {
        ServerError::Search(failure)
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::DbError(e.to_string())
    }
}
