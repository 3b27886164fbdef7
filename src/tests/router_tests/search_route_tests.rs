use crate::domain::FilterSet;
use crate::errors::ServerError;
use crate::responses::error_to_response;
use crate::router::{handle, AppState};
use crate::search::error::QueryKind;
use crate::search::{SearchError, SearchFailure};
use crate::tests::utils::{expected_total, request, seeded_db, service, CDMX_CENTRO, MEXICO};
use astra::{Body, Response};
use http::{Method, Request};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn make_state(label: &str) -> (Runtime, AppState, Vec<crate::domain::NewProperty>) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("test runtime");
    let (db, fixtures) = seeded_db(label);
    let state = AppState {
        search: Arc::new(service(&db)),
        runtime: runtime.handle().clone(),
    };
    (runtime, state, fixtures)
}

fn get(uri: &str) -> Request<Body> {
    let mut req = Request::new(Body::empty());
    *req.method_mut() = Method::GET;
    *req.uri_mut() = uri.parse().unwrap();
    req
}

fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
    let mut req = Request::new(Body::from(body));
    *req.method_mut() = Method::POST;
    *req.uri_mut() = uri.parse().unwrap();
    req
}

// Same mapping the server loop applies.
fn respond(req: Request<Body>, state: &AppState) -> Response {
    match handle(req, state) {
        Ok(resp) => resp,
        Err(err) => error_to_response(err),
    }
}

fn body_json(resp: &mut Response) -> Value {
    let mut body_bytes = Vec::new();
    resp.body_mut()
        .reader()
        .read_to_end(&mut body_bytes)
        .unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}

#[test]
fn health_reports_ok() {
    let (_rt, state, _) = make_state("route_health");
    let mut resp = respond(get("/health"), &state);

    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(&mut resp)["status"], "ok");
}

#[test]
fn get_search_returns_full_result() {
    let (_rt, state, fixtures) = make_state("route_get");
    let uri = format!(
        "/api/search?north={}&south={}&east={}&west={}&zoom=5&limit=20",
        MEXICO.north, MEXICO.south, MEXICO.east, MEXICO.west
    );
    let mut resp = respond(get(&uri), &state);

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "application/json"
    );

    let json = body_json(&mut resp);
    assert_eq!(json["mode"], "clusters");
    assert_eq!(
        json["total"].as_u64(),
        Some(expected_total(&fixtures, &MEXICO, &FilterSet::default()))
    );
    assert_eq!(json["page"], 1);
    assert_eq!(json["listItems"].as_array().map(Vec::len), Some(20));
    assert!(json["mapData"].as_array().is_some_and(|c| !c.is_empty()));
    assert_eq!(json["meta"]["clustering_precision"], 3);
    assert!(json["meta"]["request_id"].is_string());
}

#[test]
fn post_search_accepts_json_body() {
    let (_rt, state, fixtures) = make_state("route_post");
    let filters = FilterSet {
        listing_type: Some("venta".into()),
        ..Default::default()
    };
    let body = serde_json::to_vec(&request(CDMX_CENTRO, 16, filters.clone(), 1)).unwrap();
    let mut resp = respond(post("/api/search", body), &state);

    assert_eq!(resp.status(), 200);
    let json = body_json(&mut resp);
    assert_eq!(json["mode"], "properties");
    assert_eq!(
        json["total"].as_u64(),
        Some(expected_total(&fixtures, &CDMX_CENTRO, &filters))
    );
    for marker in json["mapData"].as_array().unwrap() {
        assert_eq!(marker["listing_type"], "venta");
    }
    assert!(json["meta"]["clustering_precision"].is_null());
}

#[test]
fn invalid_viewport_is_rejected_with_request_id() {
    let (_rt, state, _) = make_state("route_invalid");
    let mut resp = respond(
        get("/api/search?north=10&south=20&east=-99&west=-100&zoom=5"),
        &state,
    );

    assert_eq!(resp.status(), 400);
    let json = body_json(&mut resp);
    assert_eq!(json["error"], "validation");
    assert_eq!(json["retryable"], false);
    assert!(json["request_id"].is_string());
    assert!(json["message"].as_str().unwrap().contains("north"));
}

#[test]
fn missing_zoom_is_rejected() {
    let (_rt, state, _) = make_state("route_no_zoom");
    let resp = respond(
        get("/api/search?north=20&south=10&east=-99&west=-100"),
        &state,
    );
    assert_eq!(resp.status(), 400);
}

fn assert_validation_failure(resp: &mut Response, mentions: &str) {
    assert_eq!(resp.status(), 400);
    let json = body_json(resp);
    assert_eq!(json["error"], "validation");
    assert_eq!(json["retryable"], false);
    assert!(json["request_id"].is_string());
    assert!(json["duration_ms"].is_u64());
    let message = json["message"].as_str().unwrap();
    assert!(message.contains(mentions), "{message}");
}

#[test]
fn malformed_query_numbers_are_validation_failures() {
    let (_rt, state, _) = make_state("route_nan");

    let mut resp = respond(
        get("/api/search?north=20&south=10&east=-99&west=-100&zoom=close"),
        &state,
    );
    assert_validation_failure(&mut resp, "zoom");

    let mut resp = respond(
        get("/api/search?north=20&south=10&east=-99&west=-100&zoom=5.5"),
        &state,
    );
    assert_validation_failure(&mut resp, "zoom");
}

#[test]
fn mistyped_json_fields_are_validation_failures() {
    let (_rt, state, _) = make_state("route_bad_types");
    let bounds = r#""bounds":{"north":20,"south":10,"east":-99,"west":-100}"#;

    let body = format!(r#"{{{bounds},"zoom":"5"}}"#).into_bytes();
    let mut resp = respond(post("/api/search", body), &state);
    assert_validation_failure(&mut resp, "invalid JSON body");

    let body = format!(r#"{{{bounds},"zoom":5,"filters":{{"min_bedrooms":-1}}}}"#).into_bytes();
    let mut resp = respond(post("/api/search", body), &state);
    assert_validation_failure(&mut resp, "invalid JSON body");
}

#[test]
fn malformed_json_body_is_a_validation_failure() {
    let (_rt, state, _) = make_state("route_bad_json");
    let result = handle(post("/api/search", b"{not json".to_vec()), &state);
    let Err(ServerError::Search(failure)) = result else {
        panic!("expected a search failure");
    };
    assert!(matches!(failure.source, SearchError::Validation(_)));

    let mut resp = respond(post("/api/search", b"{not json".to_vec()), &state);
    assert_validation_failure(&mut resp, "invalid JSON body");
}

#[test]
fn unknown_route_is_not_found() {
    let (_rt, state, _) = make_state("route_404");
    assert!(matches!(
        handle(get("/api/nope"), &state),
        Err(ServerError::NotFound)
    ));
    assert_eq!(respond(get("/api/nope"), &state).status(), 404);
}

#[test]
fn upstream_failures_map_to_gateway_statuses() {
    let failure = |source| {
        ServerError::Search(SearchFailure {
            request_id: Uuid::new_v4(),
            duration_ms: 5_000,
            source,
        })
    };

    let mut resp = error_to_response(failure(SearchError::Timeout {
        query: QueryKind::Count,
        attempts: 3,
    }));
    assert_eq!(resp.status(), 504);
    let json = body_json(&mut resp);
    assert_eq!(json["error"], "timeout");
    assert_eq!(json["retryable"], true);
    assert_eq!(json["duration_ms"], 5_000);

    let resp = error_to_response(failure(SearchError::Unavailable {
        query: QueryKind::Map,
        message: "database is locked".into(),
    }));
    assert_eq!(resp.status(), 502);

    let mut resp = error_to_response(failure(SearchError::Cancelled));
    assert_eq!(resp.status(), 499);
    assert_eq!(body_json(&mut resp)["error"], "cancelled");
}
