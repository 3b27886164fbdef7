use crate::errors::ServerError;
use crate::search::response::ErrorBody;
use crate::search::SearchError;
use astra::{Body, Response, ResponseBuilder};

pub use crate::errors::ResultResp;

/// Convert a ServerError into a JSON error response.
pub fn error_to_response(err: ServerError) -> Response {
    let (status, body) = match &err {
        ServerError::NotFound => (404, ErrorBody::new("not_found", "Not Found")),
        ServerError::DbError(_) => (500, ErrorBody::new("internal", "Database Error")),
        ServerError::InternalError => (500, ErrorBody::new("internal", "Internal Server Error")),
        ServerError::Search(failure) => {
            let status = match failure.source {
                SearchError::Validation(_) => 400,
                SearchError::Timeout { .. } => 504,
                SearchError::Cancelled => 499,
                SearchError::Unavailable { .. } | SearchError::Upstream { .. } => 502,
            };
            (status, ErrorBody::from(failure))
        }
    };

    json_error_response(status, &body)
}

/// Build a JSON error body; falls back to plain text if serialization fails.
pub fn json_error_response(status: u16, body: &ErrorBody) -> Response {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| body.message.clone().into_bytes());

    ResponseBuilder::new()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
}
