use aventon_api::{
    app,
    middleware::auth::Claims,
    state::{AppState, AuthConfig},
};
use aventon_settlement::SettlementCoordinator;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

fn test_app() -> Router {
    let state = AppState {
        engine: Arc::new(SettlementCoordinator::new("COP")),
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        business_rules: aventon_store::app_config::BusinessRules {
            pending_grace_seconds: 900,
            expiry_sweep_seconds: 60,
            idempotency_retention_days: 30,
            default_currency: "COP".to_string(),
            ledger_page_size: 50,
        },
    };
    app(state)
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = auth {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = test_app();

    let (status, _) = send(&app, "GET", "/api/wallet/accounts/ana", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "GET",
        "/api/wallet/accounts/ana",
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_issues_usable_token() {
    let app = test_app();
    let old = token("ana", "PASSENGER");

    let (status, body) = send(
        &app,
        "POST",
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": old })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/wallet/accounts/ana", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance_cents"], 0);
    assert_eq!(body["currency"], "COP");
}

#[tokio::test]
async fn test_topup_then_hold_splits_available() {
    let app = test_app();
    let jwt = token("ana", "PASSENGER");

    let (status, _) = send(
        &app,
        "POST",
        "/api/wallet/refund",
        Some(&jwt),
        Some(json!({
            "operation_id": "topup-1",
            "user_id": "ana",
            "amount_cents": 50_000,
            "reason": "topup"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/wallet/hold",
        Some(&jwt),
        Some(json!({
            "operation_id": "hold-1",
            "user_id": "ana",
            "amount_cents": 20_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["balance_cents"], 50_000);
    assert_eq!(body["account"]["hold_cents"], 20_000);
    assert_eq!(body["entry"]["type"], "HOLD");

    // Replay returns the recorded receipt, entry id included.
    let first_entry_id = body["entry"]["id"].clone();
    let (status, body) = send(
        &app,
        "POST",
        "/api/wallet/hold",
        Some(&jwt),
        Some(json!({
            "operation_id": "hold-1",
            "user_id": "ana",
            "amount_cents": 20_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"]["id"], first_entry_id);
    assert_eq!(body["account"]["hold_cents"], 20_000);
}

#[tokio::test]
async fn test_insufficient_funds_is_402_with_code() {
    let app = test_app();
    let jwt = token("ana", "PASSENGER");

    let (status, body) = send(
        &app,
        "POST",
        "/api/wallet/hold",
        Some(&jwt),
        Some(json!({
            "operation_id": "hold-1",
            "user_id": "ana",
            "amount_cents": 10_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");
}

async fn seed_route(app: &Router, jwt: &str, price: i64, seats: i32) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/routes",
        Some(jwt),
        Some(json!({
            "driver_id": "carlos",
            "origin": "Campus Norte",
            "destination": "Centro",
            "price_cents": price,
            "seats": seats,
            "pickup_at": (Utc::now() + Duration::hours(2)).to_rfc3339()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_reservation_lifecycle_to_completion() {
    let app = test_app();
    let passenger = token("ana", "PASSENGER");
    let driver = token("carlos", "DRIVER");

    send(
        &app,
        "POST",
        "/api/wallet/refund",
        Some(&passenger),
        Some(json!({
            "operation_id": "topup-1",
            "user_id": "ana",
            "amount_cents": 50_000,
            "reason": "topup"
        })),
    )
    .await;
    let route_id = seed_route(&app, &driver, 20_000, 3).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/reservations",
        Some(&passenger),
        Some(json!({
            "route_id": route_id,
            "passenger_id": "ana",
            "seats": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["status"], "PENDING");
    let reservation_id = body["reservation"]["id"].as_str().unwrap().to_string();
    let code = body["reservation"]["code"].as_str().unwrap().to_string();

    // Seat came off the route.
    let (_, route) = send(&app, "GET", &format!("/api/routes/{route_id}"), Some(&driver), None).await;
    assert_eq!(route["available_seats"], 2);

    // Wrong code is a 400 and changes nothing.
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/reservations/{reservation_id}/complete"),
        Some(&driver),
        Some(json!({ "code": "00000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "WRONG_CODE");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/reservations/{reservation_id}/complete"),
        Some(&driver),
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["status"], "COMPLETED");
    assert_eq!(body["captured_cents"], 20_000);
    assert_eq!(body["passenger_account"]["balance_cents"], 30_000);
    assert_eq!(body["passenger_account"]["hold_cents"], 0);
    assert_eq!(body["driver_account"]["balance_cents"], 20_000);

    // Both parties see the trip in their listings.
    let (_, listed) = send(&app, "GET", "/api/reservations", Some(&driver), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_patch_cancel_releases_and_restores() {
    let app = test_app();
    let passenger = token("ana", "PASSENGER");

    send(
        &app,
        "POST",
        "/api/wallet/refund",
        Some(&passenger),
        Some(json!({
            "operation_id": "topup-1",
            "user_id": "ana",
            "amount_cents": 50_000,
            "reason": "topup"
        })),
    )
    .await;
    let route_id = seed_route(&app, &passenger, 20_000, 2).await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/reservations",
        Some(&passenger),
        Some(json!({
            "route_id": route_id,
            "passenger_id": "ana",
            "seats": 2
        })),
    )
    .await;
    let reservation_id = body["reservation"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/reservations/{reservation_id}"),
        Some(&passenger),
        Some(json!({ "status": "CANCELLED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["status"], "CANCELLED");
    assert_eq!(body["released_cents"], 40_000);
    assert_eq!(body["account"]["hold_cents"], 0);

    let (_, route) = send(&app, "GET", &format!("/api/routes/{route_id}"), Some(&passenger), None).await;
    assert_eq!(route["available_seats"], 2);

    // COMPLETED is not reachable through PATCH.
    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/reservations/{reservation_id}"),
        Some(&passenger),
        Some(json!({ "status": "COMPLETED" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_complete_trip_wire_endpoint() {
    let app = test_app();
    let passenger = token("ana", "PASSENGER");
    let driver = token("carlos", "DRIVER");

    send(
        &app,
        "POST",
        "/api/wallet/refund",
        Some(&passenger),
        Some(json!({
            "operation_id": "topup-1",
            "user_id": "ana",
            "amount_cents": 50_000,
            "reason": "topup"
        })),
    )
    .await;
    let route_id = seed_route(&app, &driver, 20_000, 3).await;
    let (_, body) = send(
        &app,
        "POST",
        "/api/reservations",
        Some(&passenger),
        Some(json!({
            "route_id": route_id,
            "passenger_id": "ana",
            "seats": 1
        })),
    )
    .await;
    let reservation_id = body["reservation"]["id"].as_str().unwrap().to_string();

    // Amount mismatch rejected before any money moves.
    let (status, _) = send(
        &app,
        "POST",
        "/api/wallet/complete-trip",
        Some(&driver),
        Some(json!({
            "reservation_id": reservation_id,
            "passenger_id": "ana",
            "driver_id": "carlos",
            "amount_cents": 19_999
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/wallet/complete-trip",
        Some(&driver),
        Some(json!({
            "reservation_id": reservation_id,
            "passenger_id": "ana",
            "driver_id": "carlos",
            "amount_cents": 20_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["status"], "COMPLETED");

    // Retry replays the stored settlement instead of capturing again.
    let (status, retry) = send(
        &app,
        "POST",
        "/api/wallet/complete-trip",
        Some(&driver),
        Some(json!({
            "reservation_id": reservation_id,
            "passenger_id": "ana",
            "driver_id": "carlos",
            "amount_cents": 20_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retry["capture_entry"]["id"], body["capture_entry"]["id"]);

    let (_, driver_account) = send(&app, "GET", "/api/wallet/accounts/carlos", Some(&driver), None).await;
    assert_eq!(driver_account["balance_cents"], 20_000);
}

#[tokio::test]
async fn test_ledger_endpoint_pages_newest_first() {
    let app = test_app();
    let jwt = token("ana", "PASSENGER");

    for i in 0..3 {
        send(
            &app,
            "POST",
            "/api/wallet/refund",
            Some(&jwt),
            Some(json!({
                "operation_id": format!("topup-{i}"),
                "user_id": "ana",
                "amount_cents": 1_000 * (i + 1),
                "reason": "topup"
            })),
        )
        .await;
    }

    let (status, body) = send(&app, "GET", "/api/wallet/ledger/ana?limit=2", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["operation_id"], "topup-2");
    assert_eq!(entries[1]["operation_id"], "topup-1");
}

#[tokio::test]
async fn test_oversold_seats_is_conflict() {
    let app = test_app();
    let jwt = token("ana", "PASSENGER");

    send(
        &app,
        "POST",
        "/api/wallet/refund",
        Some(&jwt),
        Some(json!({
            "operation_id": "topup-1",
            "user_id": "ana",
            "amount_cents": 500_000,
            "reason": "topup"
        })),
    )
    .await;
    let route_id = seed_route(&app, &jwt, 10_000, 1).await;

    let reserve = json!({
        "route_id": route_id,
        "passenger_id": "ana",
        "seats": 1
    });
    let (status, _) = send(&app, "POST", "/api/reservations", Some(&jwt), Some(reserve.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/reservations", Some(&jwt), Some(reserve)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "OVERSOLD_SEATS");
}
