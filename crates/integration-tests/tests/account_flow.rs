//! End-to-end account, password reset and ordering flows.
//!
//! These need a `PostgreSQL` database in `DATABASE_URL`:
//!
//! ```bash
//! cargo test -p la-artesa-integration-tests -- --ignored
//! ```

use std::str::FromStr;

use axum::http::{Method, StatusCode};
use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use la_artesa_api::db::password_resets;
use la_artesa_api::db::users::{NewUser, UserRepository};
use la_artesa_api::services::auth::hash_password;
use la_artesa_api::services::password_reset::{
    RETENTION, expires_at, generate_token, hash_token, purge_expired,
};
use la_artesa_core::{Email, UserId, UserRole};
use la_artesa_integration_tests::{TestApp, unique_email};

const PASSWORD: &str = "Almojabana-2026";

async fn register(app: &TestApp, email: &str) -> (UserId, String) {
    let res = app
        .send(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "email": email,
                "password": PASSWORD,
                "firstName": "Lucía",
                "lastName": "Rendón",
            })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let id = res.data()["id"].as_i64().unwrap();
    (UserId::new(i32::try_from(id).unwrap()), res.cookie.unwrap())
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Option<String>) {
    let res = app
        .send(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await;
    (res.status, res.cookie)
}

async fn create_admin(app: &TestApp) -> String {
    let email = unique_email("admin");
    let hash = hash_password(PASSWORD).unwrap();
    UserRepository::new(app.pool())
        .create(NewUser {
            email: &Email::parse(&email).unwrap(),
            password_hash: &hash,
            first_name: "Admin",
            last_name: "Artesa",
            role: UserRole::Admin,
        })
        .await
        .unwrap();

    let (status, cookie) = login(app, &email, PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    cookie.unwrap()
}

async fn issue_token(app: &TestApp, user_id: UserId) -> String {
    let token = generate_token();
    let mut conn = app.pool().acquire().await.unwrap();
    password_resets::insert(&mut conn, user_id, &hash_token(&token), expires_at(Utc::now()))
        .await
        .unwrap();
    token
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap()).unwrap()
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_register_starts_session_and_logout_ends_it() {
    let app = TestApp::with_database().await;
    let email = unique_email("session");
    let (user_id, cookie) = register(&app, &email).await;

    let me = app
        .send(Method::GET, "/api/auth/me", None, Some(&cookie))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.data()["id"], json!(user_id.as_i32()));
    assert_eq!(me.data()["role"], json!("client"));
    assert_eq!(me.data()["clientProfileId"], Value::Null);

    let res = app
        .send(Method::POST, "/api/auth/logout", None, Some(&cookie))
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let me = app
        .send(Method::GET, "/api/auth/me", None, Some(&cookie))
        .await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_duplicate_registration_is_conflict() {
    let app = TestApp::with_database().await;
    let email = unique_email("dup");
    register(&app, &email).await;

    let res = app
        .send(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "email": email.to_uppercase(),
                "password": PASSWORD,
                "firstName": "Otra",
                "lastName": "Persona",
            })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error_code(), Some("EMAIL_TAKEN"));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_unknown_email_and_wrong_password_fail_alike() {
    let app = TestApp::with_database().await;
    let email = unique_email("known");
    register(&app, &email).await;

    let attempts = [
        (email.as_str(), "Wrong-password-1"),
        ("nadie@example.com", PASSWORD),
    ];
    for (address, password) in attempts {
        let res = app
            .send(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": address, "password": password })),
                None,
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.error_code(), Some("INVALID_CREDENTIALS"));
    }
}

// =============================================================================
// Password Reset
// =============================================================================

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_reset_request_for_unknown_address_looks_successful() {
    let app = TestApp::with_database().await;
    let res = app
        .send(
            Method::POST,
            "/api/password-reset/request",
            Some(json!({ "email": unique_email("nobody") })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], json!(true));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_reset_token_is_single_use() {
    let app = TestApp::with_database().await;
    let email = unique_email("reset");
    let (user_id, _) = register(&app, &email).await;
    let token = issue_token(&app, user_id).await;

    let res = app
        .send(
            Method::GET,
            &format!("/api/password-reset/validate/{token}"),
            None,
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["valid"], json!(true));

    let new_password = "Pandebono-2027";
    let reset = json!({ "token": token, "newPassword": new_password });
    let res = app
        .send(Method::POST, "/api/password-reset/reset", Some(reset.clone()), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);

    // Second redemption of the same link
    let res = app
        .send(Method::POST, "/api/password-reset/reset", Some(reset), None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("INVALID_TOKEN"));

    assert_eq!(login(&app, &email, PASSWORD).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(login(&app, &email, new_password).await.0, StatusCode::OK);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_expired_reset_token_is_rejected() {
    let app = TestApp::with_database().await;
    let (user_id, _) = register(&app, &unique_email("expired")).await;

    let token = generate_token();
    let mut conn = app.pool().acquire().await.unwrap();
    password_resets::insert(
        &mut conn,
        user_id,
        &hash_token(&token),
        Utc::now() - TimeDelta::minutes(1),
    )
    .await
    .unwrap();
    drop(conn);

    let res = app
        .send(
            Method::GET,
            &format!("/api/password-reset/validate/{token}"),
            None,
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("INVALID_TOKEN"));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_weak_password_keeps_token_redeemable() {
    let app = TestApp::with_database().await;
    let (user_id, _) = register(&app, &unique_email("weak")).await;
    let token = issue_token(&app, user_id).await;

    let res = app
        .send(
            Method::POST,
            "/api/password-reset/reset",
            Some(json!({ "token": token, "newPassword": "short" })),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("WEAK_PASSWORD"));

    let res = app
        .send(
            Method::GET,
            &format!("/api/password-reset/validate/{token}"),
            None,
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_purge_removes_only_stale_tokens() {
    let app = TestApp::with_database().await;
    let (user_id, _) = register(&app, &unique_email("purge")).await;

    let stale = hash_token(&generate_token());
    let fresh = hash_token(&generate_token());
    let mut conn = app.pool().acquire().await.unwrap();
    password_resets::insert(
        &mut conn,
        user_id,
        &stale,
        Utc::now() - RETENTION - TimeDelta::hours(1),
    )
    .await
    .unwrap();
    password_resets::insert(&mut conn, user_id, &fresh, expires_at(Utc::now()))
        .await
        .unwrap();
    drop(conn);

    assert!(purge_expired(app.pool(), Utc::now()).await.unwrap() >= 1);

    let remaining: Vec<String> =
        sqlx::query_scalar("SELECT token_hash FROM password_resets WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(app.pool())
            .await
            .unwrap();
    assert_eq!(remaining, [fresh]);
}

// =============================================================================
// Client Profiles
// =============================================================================

fn profile_body(tax_id: &str, email: &str) -> Value {
    json!({
        "businessName": "Café La Esquina",
        "taxId": tax_id,
        "contactName": "Lucía Rendón",
        "contactPhone": "+57 300 555 0101",
        "contactEmail": email,
        "address": "Cra 43A # 1-50",
        "city": "Medellín",
        "department": "Antioquia",
    })
}

fn unique_tax_id() -> String {
    format!("900{}", uuid::Uuid::new_v4().as_u128() % 1_000_000_000)
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_tax_id_of_another_client_is_a_distinct_conflict() {
    let app = TestApp::with_database().await;
    let tax_id = unique_tax_id();

    let first = unique_email("first");
    let (_, cookie) = register(&app, &first).await;
    let res = app
        .send(
            Method::POST,
            "/api/client-profiles",
            Some(profile_body(&tax_id, &first)),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);

    let res = app
        .send(
            Method::POST,
            "/api/client-profiles",
            Some(profile_body(&unique_tax_id(), &first)),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error_code(), Some("PROFILE_EXISTS"));

    let second = unique_email("second");
    let (_, cookie) = register(&app, &second).await;
    let res = app
        .send(
            Method::POST,
            "/api/client-profiles",
            Some(profile_body(&tax_id, &second)),
            Some(&cookie),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error_code(), Some("TAX_ID_TAKEN"));
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_approved_client_can_place_and_cancel_an_order() {
    let app = TestApp::with_database().await;
    let admin = create_admin(&app).await;

    let res = app
        .send(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Croissant de mantequilla",
                "category": "hojaldre",
                "unit": "und",
                "price": "2500.00",
                "stock": 200,
            })),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let product_id = res.data()["id"].clone();

    let email = unique_email("cafe");
    let (_, client) = register(&app, &email).await;
    let res = app
        .send(
            Method::POST,
            "/api/client-profiles",
            Some(profile_body(&unique_tax_id(), &email)),
            Some(&client),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let profile_id = res.data()["id"].as_i64().unwrap();

    let order = json!({ "items": [{ "productId": product_id, "quantity": 12 }] });
    let res = app
        .send(Method::POST, "/api/orders", Some(order.clone()), Some(&client))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error_code(), Some("PROFILE_NOT_APPROVED"));

    let res = app
        .send(
            Method::PUT,
            &format!("/api/client-profiles/{profile_id}/approval"),
            Some(json!({ "approved": true })),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .send(Method::POST, "/api/orders", Some(order), Some(&client))
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.data()["status"], json!("pending"));
    assert_eq!(decimal(&res.data()["subtotal"]), Decimal::from(30_000));
    assert_eq!(res.data()["details"].as_array().unwrap().len(), 1);
    let order_id = res.data()["id"].as_i64().unwrap();

    // Another client cannot see it
    let (_, stranger) = register(&app, &unique_email("stranger")).await;
    let res = app
        .send(
            Method::GET,
            &format!("/api/orders/{order_id}"),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app
        .send(
            Method::POST,
            &format!("/api/orders/{order_id}/cancel"),
            None,
            Some(&client),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["status"], json!("cancelled"));

    // Cancelled is terminal
    let res = app
        .send(
            Method::PUT,
            &format!("/api/orders/{order_id}/status"),
            Some(json!({ "status": "confirmed" })),
            Some(&admin),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}
