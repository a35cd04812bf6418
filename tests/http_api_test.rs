use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use market_handler::{build_router, AppState, ManualClock, ServerConfig};

fn app() -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()));
    let config = ServerConfig {
        default_fee_rate: 0,
        ..ServerConfig::default()
    };
    let state = AppState::with_clock(config, clock.clone()).shared();
    (build_router(state), clock)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_market(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/markets",
        Some(json!({
            "deadline": "2026-06-08T00:00:00Z",
            "base_price": 1_000_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["market_id"].as_str().unwrap().to_string()
}

async fn fund(app: &Router, market_id: &str, who: &str, amount: u64) {
    let (status, _) = send(app, Method::POST, "/currency/mint", Some(json!({ "account": who, "amount": amount }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        app,
        Method::POST,
        "/currency/approve",
        Some(json!({ "owner": who, "market_id": market_id, "amount": amount })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["allowance"], amount);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["markets"], 0);
    assert_eq!(body["decimals"], 6);
}

#[tokio::test]
async fn test_unknown_market_is_not_found() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/markets/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "market_not_found");
}

#[tokio::test]
async fn test_buy_and_snapshot() {
    let (app, _) = app();
    let id = create_market(&app).await;
    fund(&app, &id, "alice", 500).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/markets/{}/buy", id),
        Some(json!({ "participant": "alice", "side": "yes", "amount": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "buy");
    assert_eq!(body["data"]["yes_balance"], 500);

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}", id), None).await;
    assert_eq!(body["data"]["reserve"]["total_currency"], 500);
    assert_eq!(body["data"]["reserve"]["yes_backing"], 500);
    assert_eq!(body["data"]["yes_holders"], 1);
    assert_eq!(body["data"]["is_open"], true);

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}/holders/yes", id), None).await;
    assert_eq!(body["data"][0]["participant"], "alice");

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}/events?since=1", id), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["event"]["type"], "bought");

    let (_, body) = send(&app, Method::GET, "/telemetry/alice", None).await;
    assert_eq!(body["data"]["net_yes"], 500);
}

#[tokio::test]
async fn test_buy_without_allowance_is_rejected() {
    let (app, _) = app();
    let id = create_market(&app).await;
    send(&app, Method::POST, "/currency/mint", Some(json!({ "account": "carol", "amount": 100 }))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/markets/{}/buy", id),
        Some(json!({ "participant": "carol", "side": "no", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "insufficient_allowance");
}

#[tokio::test]
async fn test_full_settlement_flow() {
    let (app, clock) = app();
    let id = create_market(&app).await;
    fund(&app, &id, "alice", 700).await;
    fund(&app, &id, "bob", 300).await;

    for (who, side, amount) in [("alice", "yes", 700), ("bob", "no", 300)] {
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/markets/{}/buy", id),
            Some(json!({ "participant": who, "side": side, "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let resolve_uri = format!("/markets/{}/resolve", id);
    let (status, body) = send(
        &app,
        Method::POST,
        &resolve_uri,
        Some(json!({ "winning_side": "yes", "caller": "registry" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "market_still_open");

    clock.advance(Duration::days(8));

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/markets/{}/buy", id),
        Some(json!({ "participant": "alice", "side": "yes", "amount": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "market_closed");

    // no oracle vote yet
    let (status, body) = send(&app, Method::POST, &resolve_uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resolved"], false);

    send(&app, Method::POST, &format!("/markets/{}/outcome", id), Some(json!({ "side": "yes" }))).await;
    let (status, body) = send(&app, Method::POST, &resolve_uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resolved"], true);
    assert_eq!(body["data"]["winning_side"], "yes");

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}/rewards/alice", id), None).await;
    assert_eq!(body["data"]["share"], 1000);

    let rewards_uri = format!("/markets/{}/rewards", id);
    let (status, body) = send(&app, Method::POST, &rewards_uri, Some(json!({ "participant": "alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["share"], 1000);

    let (status, body) = send(&app, Method::POST, &rewards_uri, Some(json!({ "participant": "alice" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_collected");

    let (status, body) = send(&app, Method::POST, &rewards_uri, Some(json!({ "participant": "bob" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "not_a_winner");

    let (_, body) = send(&app, Method::GET, "/currency/balance/alice", None).await;
    assert_eq!(body["data"]["balance"], 1000);

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}/positions/alice", id), None).await;
    assert_eq!(body["data"]["reward_collected"], true);
    assert_eq!(body["data"]["yes_units"], 0);
}

#[tokio::test]
async fn test_explicit_resolution_needs_the_owner() {
    let (app, clock) = app();
    let id = create_market(&app).await;
    clock.advance(Duration::days(8));
    let resolve_uri = format!("/markets/{}/resolve", id);

    for body in [
        json!({ "winning_side": "no" }),
        json!({ "winning_side": "no", "caller": "mallory" }),
    ] {
        let (status, body) = send(&app, Method::POST, &resolve_uri, Some(body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "unauthorized");
    }

    let (_, body) = send(&app, Method::GET, &format!("/markets/{}", id), None).await;
    assert!(body["data"]["winning_side"].is_null());

    let (status, body) = send(
        &app,
        Method::POST,
        &resolve_uri,
        Some(json!({ "winning_side": "no", "caller": "registry" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["winning_side"], "no");
}
