//! Request handling that completes without a database.
//!
//! Every request here is rejected (or answered) before a query runs, so the
//! app's pool is never dialled.

use std::net::{IpAddr, Ipv4Addr};

use axum::http::{Method, StatusCode};
use serde_json::json;

use la_artesa_integration_tests::TestApp;

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_liveness_answers_ok() {
    let app = TestApp::offline().await;
    let res = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!("ok"));
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_me_without_session_is_unauthorized() {
    let app = TestApp::offline().await;
    let res = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["success"], json!(false));
    assert_eq!(res.error_code(), Some("UNAUTHORIZED"));
}

#[tokio::test]
async fn test_protected_routes_require_login() {
    let app = TestApp::offline().await;
    let cases = [
        (Method::GET, "/api/orders"),
        (Method::POST, "/api/payments"),
        (Method::GET, "/api/client-profiles/me"),
        (Method::GET, "/api/admin/settings"),
        (Method::GET, "/api/admin/users"),
        (Method::POST, "/api/sap/sync/products"),
        (Method::GET, "/api/sap/sync/runs"),
    ];

    for (method, uri) in cases {
        let res = app
            .send(method.clone(), uri, Some(json!({})), None)
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_login_with_malformed_json_is_validation_error() {
    let app = TestApp::offline().await;
    let res = app
        .send(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "panaderia@example.com" })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_logout_without_session_succeeds() {
    let app = TestApp::offline().await;
    let res = app.send(Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], json!(true));
}

// =============================================================================
// Password Reset
// =============================================================================

#[tokio::test]
async fn test_malformed_reset_token_is_invalid() {
    let app = TestApp::offline().await;
    let res = app
        .send(
            Method::GET,
            "/api/password-reset/validate/not-a-token",
            None,
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("INVALID_TOKEN"));
}

#[tokio::test]
async fn test_reset_with_malformed_token_is_invalid() {
    let app = TestApp::offline().await;
    let res = app
        .send(
            Method::POST,
            "/api/password-reset/reset",
            Some(json!({ "token": "abc", "newPassword": "Pan-de-bono-2026" })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("INVALID_TOKEN"));
}

#[tokio::test]
async fn test_reset_request_rejects_malformed_email() {
    let app = TestApp::offline().await;
    let res = app
        .send(
            Method::POST,
            "/api/password-reset/request",
            Some(json!({ "email": "not-an-email" })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("INVALID_EMAIL"));
}

// =============================================================================
// Query Validation
// =============================================================================

#[tokio::test]
async fn test_product_list_rejects_bad_paging() {
    let app = TestApp::offline().await;
    let res = app
        .send(Method::GET, "/api/products?page=first", None, None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("VALIDATION_ERROR"));
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited_per_ip() {
    let app = TestApp::offline().await;
    let attacker = IpAddr::V4(Ipv4Addr::new(181, 55, 2, 17));
    let bad_login = || Some(json!({ "email": "x" }));

    // Burst of five, then throttled
    for _ in 0..5 {
        let res = app
            .send_from(attacker, Method::POST, "/api/auth/login", bad_login(), None)
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
    }
    let res = app
        .send_from(attacker, Method::POST, "/api/auth/login", bad_login(), None)
        .await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);

    // The reset endpoints share the same budget
    let res = app
        .send_from(
            attacker,
            Method::GET,
            "/api/password-reset/validate/abc",
            None,
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);

    // Other clients are unaffected
    let neighbour = IpAddr::V4(Ipv4Addr::new(181, 55, 2, 18));
    let res = app
        .send_from(neighbour, Method::POST, "/api/auth/login", bad_login(), None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_distinct_clients_each_get_a_full_budget() {
    let app = TestApp::offline().await;
    for _ in 0..8 {
        let res = app
            .send(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": "x" })),
                None,
            )
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_resource_routes_have_a_separate_budget() {
    let app = TestApp::offline().await;
    let client = IpAddr::V4(Ipv4Addr::new(181, 55, 3, 40));

    for _ in 0..6 {
        app.send_from(client, Method::POST, "/api/auth/login", None, None)
            .await;
    }
    let res = app
        .send_from(client, Method::GET, "/api/orders", None, None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
