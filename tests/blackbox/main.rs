//! End-to-end scenarios against the real `axum::Router`, driving the full
//! submission -> bid-placed -> evaluator pipeline through in-memory
//! collaborators. Scenario numbering follows the literal end-to-end
//! scenarios list this system is tested against.

pub mod helpers;

use std::{
    net::SocketAddr,
    str::FromStr as _,
};

use auction_platform::bus::BidResultStatus;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        Request,
        StatusCode,
    },
};
use helpers::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{
    json,
    Value,
};
use tower::ServiceExt as _;

const PEER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)), 1234);

async fn send(router: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request.extensions_mut().insert(ConnectInfo(PEER));

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// `Decimal`'s wire format is a JSON string; parse it back rather than
/// hard-coding an exact string match, which would be brittle to scale
/// normalization.
fn decimal_field(value: &Value, field: &str) -> Decimal {
    Decimal::from_str(value[field].as_str().expect("decimal field is a JSON string")).unwrap()
}

async fn create_auction(router: &axum::Router, auction_id: &str, seller_id: &str, start_price: &str, min_step: &str) {
    let (status, _) = send(
        router,
        "POST",
        "/api/v1/auction/create",
        Some(json!({
            "auction_id": auction_id,
            "title": "a vintage lamp",
            "description": "barely used",
            "seller_id": seller_id,
            "start_price": start_price,
            "min_step": min_step,
            "duration_min": "1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn place_bid(router: &axum::Router, bid_id: &str, auction_id: &str, bidder_id: &str, amount: &str) -> (StatusCode, Value) {
    send(
        router,
        "POST",
        "/api/v1/bid/place",
        Some(json!({
            "bid_id": bid_id,
            "auction_id": auction_id,
            "bidder_id": bidder_id,
            "amount": amount,
        })),
    )
    .await
}

/// Scenario 1: a bid that clears start_price + min_step is accepted and
/// raises current_bid.
#[tokio::test]
async fn accepted_bid_raises_current_bid() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;

    let (status, body) = place_bid(&app.router, "b1", "a1", "u1", "12").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");

    app.settle().await;

    let (status, auction) = send(&app.router, "GET", "/api/v1/auction/get?auction_id=a1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&auction, "current_bid"), dec!(12));

    let results = app.bus.bid_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, BidResultStatus::Accepted);
    assert_eq!(results[0].bid_id, "b1");

    app.shutdown().await;
}

/// Scenario 2: a bid below current_bid + min_step is rejected with the
/// literal minimum in the reason string, and current_bid is untouched.
#[tokio::test]
async fn bid_below_minimum_step_is_rejected_with_reason() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;

    let (status, _) = place_bid(&app.router, "b1", "a1", "u1", "12").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.settle().await;

    let (status, _) = place_bid(&app.router, "b2", "a1", "u2", "12.4").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.settle().await;

    let results = app.bus.bid_results();
    let b2 = results.iter().find(|r| r.bid_id == "b2").unwrap();
    assert_eq!(b2.status, BidResultStatus::Rejected);
    assert_eq!(b2.reason.as_deref(), Some("bid must be \u{2265} 13.00"));

    let (_, auction) = send(&app.router, "GET", "/api/v1/auction/get?auction_id=a1", None).await;
    assert_eq!(decimal_field(&auction, "current_bid"), dec!(12));

    app.shutdown().await;
}

/// Scenario 3: two concurrent equal bids on the same auction resolve to
/// exactly one ACCEPTED and one REJECTED, never both accepted.
#[tokio::test]
async fn concurrent_equal_bids_yield_exactly_one_winner() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;

    let (status, _) = place_bid(&app.router, "b1", "a1", "u1", "12").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.settle().await;

    let router_a = app.router.clone();
    let router_b = app.router.clone();
    let (r3, r4) = tokio::join!(
        place_bid(&router_a, "b3", "a1", "u3", "14"),
        place_bid(&router_b, "b4", "a1", "u4", "14"),
    );
    assert_eq!(r3.0, StatusCode::ACCEPTED);
    assert_eq!(r4.0, StatusCode::ACCEPTED);
    app.settle().await;

    let results = app.bus.bid_results();
    let b3 = results.iter().find(|r| r.bid_id == "b3").unwrap();
    let b4 = results.iter().find(|r| r.bid_id == "b4").unwrap();
    let accepted_count = [b3, b4].iter().filter(|r| r.status == BidResultStatus::Accepted).count();
    assert_eq!(accepted_count, 1, "exactly one of the two equal concurrent bids must be accepted");

    let (_, auction) = send(&app.router, "GET", "/api/v1/auction/get?auction_id=a1", None).await;
    assert_eq!(decimal_field(&auction, "current_bid"), dec!(14));

    app.shutdown().await;
}

/// Scenario 4: the seller cannot bid on their own auction.
#[tokio::test]
async fn seller_cannot_bid_on_own_auction() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a2", "seller1", "10", "1").await;

    let (status, _) = place_bid(&app.router, "b1", "a2", "seller1", "20").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.settle().await;

    let results = app.bus.bid_results();
    assert_eq!(results[0].status, BidResultStatus::Rejected);
    assert_eq!(results[0].reason.as_deref(), Some("seller cannot bid"));

    app.shutdown().await;
}

/// Scenario 7: a duplicate bid_id is rejected as a conflict, never
/// double-accepted.
#[tokio::test]
async fn duplicate_bid_id_is_a_conflict() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;

    let (status, _) = place_bid(&app.router, "b1", "a1", "u1", "12").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = place_bid(&app.router, "b1", "a1", "u1", "12").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    app.settle().await;
    assert_eq!(app.bus.bid_results().len(), 1, "the rejected duplicate submission must not reach the evaluator twice");

    app.shutdown().await;
}

/// Creating an auction twice with the same id is a conflict, not a
/// duplicate row.
#[tokio::test]
async fn duplicate_auction_id_is_a_conflict() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auction/create",
        Some(json!({
            "auction_id": "a1",
            "title": "another lamp",
            "description": "also barely used",
            "seller_id": "seller2",
            "start_price": "5",
            "min_step": "1",
            "duration_min": "1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    app.shutdown().await;
}

/// A bid under an unknown auction id is rejected synchronously: the store's
/// foreign-key check on `create_bid` surfaces `NotFound` before the event
/// ever reaches the evaluator.
#[tokio::test]
async fn bid_on_unknown_auction_is_rejected_synchronously() {
    let app = TestApp::spawn().await;

    let (status, _) = place_bid(&app.router, "b1", "does-not-exist", "u1", "50").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}

/// List endpoint returns auctions with pagination defaults per the HTTP
/// surface contract.
#[tokio::test]
async fn list_active_auctions_paginates() {
    let app = TestApp::spawn().await;
    create_auction(&app.router, "a1", "seller1", "10", "1").await;
    create_auction(&app.router, "a2", "seller1", "20", "2").await;

    let (status, body) = send(&app.router, "GET", "/api/v1/auction/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["page_size"], 20);
    assert_eq!(body["auctions"].as_array().unwrap().len(), 2);

    app.shutdown().await;
}
