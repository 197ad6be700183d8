//! API Integration Tests
//!
//! Every test builds its own router over the in-memory store, so tests are
//! independent and need no database.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use contacts_api::auth::{Claims, TokenKind};
use contacts_api::{create_router_for_testing, create_router_with_config, testing_config};
use contacts_core::AppConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const PASSWORD: &str = "Secret123";

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, headers, json)
}

async fn register(app: &Router, username: &str, email: &str) -> Value {
    let (status, _, body) = send(
        app,
        create_json_request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "email": email, "password": PASSWORD })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body
}

async fn login(app: &Router, email: &str) -> Value {
    let (status, _, body) = send(
        app,
        create_json_request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": PASSWORD })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body
}

fn access_token(tokens: &Value) -> String {
    tokens["access_token"].as_str().unwrap().to_string()
}

/// Confirm the email through the link sent at registration
async fn confirm(app: &Router, outbox: &contacts_api::services::OutboxMailer, email: &str) {
    let token = outbox
        .last_to(email)
        .and_then(|m| m.token().map(str::to_string))
        .expect("verification email");
    let (status, _, _) = send(
        app,
        create_json_request(
            "GET",
            &format!("/api/auth/confirmed_email/{token}"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn contact_body(first: &str, email: &str, birthday: NaiveDate) -> Value {
    json!({
        "first_name": first,
        "last_name": "Doe",
        "email": email,
        "phone": "0501234567",
        "birthday": birthday.format("%Y-%m-%d").to_string(),
    })
}

/// Same month and day as `date`, in a leap year long past
fn in_1992(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(1992, date.month(), date.day()).unwrap()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, _, json) = send(&app, create_json_request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, _, json) = send(&app, create_json_request("GET", "/ready", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["session_cache"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_router_for_testing();
    send(&app, create_json_request("GET", "/health", None, None)).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("contacts_http_requests_total{endpoint=\"/health\",status=\"200\"} 1"));
    assert!(text.contains("contacts_session_cache_hits"));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();

    let (status, _, json) = send(
        &app,
        create_json_request("GET", "/api-docs/openapi.json", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/auth/login"].is_object());
    assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
}

// =============================================================================
// Registration and Login Tests
// =============================================================================

#[tokio::test]
async fn test_register_success() {
    let (app, test) = create_router_with_config(testing_config());

    let body = register(&app, "alice", "Alice@Example.com").await;

    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "user");
    assert_eq!(body["is_verified"], false);
    assert!(body.get("password_hash").is_none());
    assert!(test.outbox.last_to("alice@example.com").is_some());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;

    let (status, _, body) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "other", "email": "alice@example.com", "password": PASSWORD })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_register_weak_password() {
    let app = create_router_for_testing();

    let (status, _, body) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "alice@example.com", "password": "short" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_success() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;

    let tokens = login(&app, "alice@example.com").await;

    assert!(tokens["access_token"].is_string());
    assert!(tokens["refresh_token"].is_string());
    assert_eq!(tokens["token_type"], "bearer");
    assert_eq!(tokens["expires_in"], 3600);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;

    let (status, _, body) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "Wrong1234" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

// =============================================================================
// Bearer Authentication Tests
// =============================================================================

#[tokio::test]
async fn test_me_endpoint_returns_user_info() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    let (status, headers, body) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn test_me_endpoint_without_token() {
    let app = create_router_for_testing();

    let (status, headers, body) =
        send(&app, create_json_request("GET", "/api/users/me", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
}

#[tokio::test]
async fn test_me_endpoint_with_invalid_token() {
    let app = create_router_for_testing();

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some("not.a.jwt"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let (app, test) = create_router_with_config(testing_config());
    let user = register(&app, "alice", "alice@example.com").await;

    let config = &test.app.config.auth;
    let now = now_secs();
    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user["id"].as_str().unwrap().to_string(),
        jti: "expired-token".to_string(),
        iat: now - 120,
        exp: now - 60,
        kind: TokenKind::Access,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap();

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_foreign_signature_is_rejected() {
    let app = create_router_for_testing();
    let user = register(&app, "alice", "alice@example.com").await;

    let now = now_secs();
    let claims = Claims {
        iss: "contacts-api".to_string(),
        sub: user["id"].as_str().unwrap().to_string(),
        jti: "forged".to_string(),
        iat: now,
        exp: now + 600,
        kind: TokenKind::Access,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"someone-elses-secret"),
    )
    .unwrap();

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_refresh_token_cannot_authenticate_requests() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;
    let tokens = login(&app, "alice@example.com").await;

    let (status, _, _) = send(
        &app,
        create_json_request(
            "GET",
            "/api/users/me",
            tokens["refresh_token"].as_str(),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unverified_account_cannot_use_contacts() {
    let (app, test) = create_router_with_config(testing_config());
    register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/contacts", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_UNVERIFIED");

    // Verification invalidates the cached identity, the same token now works
    confirm(&app, &test.outbox, "alice@example.com").await;
    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/contacts", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_user_cannot_reach_admin_routes() {
    let app = create_router_for_testing();
    let user = register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    let (status, _, body) = send(
        &app,
        create_json_request(
            "PATCH",
            &format!("/api/users/{}/role", user["id"].as_str().unwrap()),
            Some(&token),
            Some(json!({ "role": "admin" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

// =============================================================================
// Token Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_token_rotation() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;
    let tokens = login(&app, "alice@example.com").await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let (status, _, rotated) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    let new_access = access_token(&rotated);
    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&new_access), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The rotated-out refresh token is revoked
    let (status, _, body) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;
    let tokens = login(&app, "alice@example.com").await;
    let token = access_token(&tokens);

    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/logout",
            Some(&token),
            Some(json!({ "refresh_token": tokens["refresh_token"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": tokens["refresh_token"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_body() {
    let app = create_router_for_testing();
    register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    let (status, _, _) = send(
        &app,
        create_json_request("POST", "/api/auth/logout", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (app, test) = create_router_with_config(testing_config());
    register(&app, "alice", "alice@example.com").await;

    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/forgot_password",
            None,
            Some(json!({ "email": "alice@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mail = test.outbox.last_to("alice@example.com").unwrap();
    assert_eq!(mail.subject, "Reset your password");
    let token = mail.token().unwrap().to_string();

    let reset = json!({ "token": token, "new_password": "Another456" });
    let (status, _, _) = send(
        &app,
        create_json_request("POST", "/api/auth/reset_password", None, Some(reset.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Reset tokens work once
    let (status, _, _) = send(
        &app,
        create_json_request("POST", "/api/auth/reset_password", None, Some(reset)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "Another456" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let (app, test) = create_router_with_config(testing_config());

    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/forgot_password",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(test.outbox.messages().is_empty());
}

// =============================================================================
// Session Cache Tests
// =============================================================================

#[tokio::test]
async fn test_cache_serves_repeated_requests() {
    let (app, test) = create_router_with_config(testing_config());
    register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    for _ in 0..3 {
        let (status, _, _) = send(
            &app,
            create_json_request("GET", "/api/users/me", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let stats = test.app.sessions.stats();
    assert_eq!(stats.misses(), 1);
    assert_eq!(stats.hits(), 2);
}

#[tokio::test]
async fn test_role_change_takes_effect_immediately() {
    let mut config = testing_config();
    config.auth.admin_emails = vec!["root@example.com".to_string()];
    let (app, _) = create_router_with_config(config);

    register(&app, "root", "root@example.com").await;
    let user = register(&app, "alice", "alice@example.com").await;
    let admin_token = access_token(&login(&app, "root@example.com").await);
    let user_token = access_token(&login(&app, "alice@example.com").await);
    let user_id = user["id"].as_str().unwrap();

    // Cache alice as a plain user
    let (_, _, me) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&user_token), None),
    )
    .await;
    assert_eq!(me["role"], "user");

    let (status, _, body) = send(
        &app,
        create_json_request(
            "PATCH",
            &format!("/api/users/{user_id}/role"),
            Some(&admin_token),
            Some(json!({ "role": "admin" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (_, _, me) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&user_token), None),
    )
    .await;
    assert_eq!(me["role"], "admin");
}

#[tokio::test]
async fn test_disabled_account_loses_access() {
    let mut config = testing_config();
    config.auth.admin_emails = vec!["root@example.com".to_string()];
    let (app, _) = create_router_with_config(config);

    let admin = register(&app, "root", "root@example.com").await;
    let user = register(&app, "alice", "alice@example.com").await;
    let admin_token = access_token(&login(&app, "root@example.com").await);
    let user_token = access_token(&login(&app, "alice@example.com").await);

    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&user_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &app,
        create_json_request(
            "POST",
            &format!("/api/users/{}/disable", user["id"].as_str().unwrap()),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/users/me", Some(&user_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Admins cannot disable themselves
    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            &format!("/api/users/{}/disable", admin["id"].as_str().unwrap()),
            Some(&admin_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_disabled_behaves_the_same() {
    let mut config = testing_config();
    config.cache.enabled = false;
    let (app, test) = create_router_with_config(config);

    register(&app, "alice", "alice@example.com").await;
    let token = access_token(&login(&app, "alice@example.com").await);

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/contacts", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_UNVERIFIED");

    confirm(&app, &test.outbox, "alice@example.com").await;
    let (status, _, _) = send(
        &app,
        create_json_request("GET", "/api/contacts", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(!test.app.sessions.is_enabled());
    assert_eq!(test.app.sessions.stats().hits(), 0);

    let (_, _, ready) = send(&app, create_json_request("GET", "/ready", None, None)).await;
    assert_eq!(ready["checks"]["session_cache"], false);
}

// =============================================================================
// Rate Limiting Tests
// =============================================================================

/// Login attempt arriving on a socket from `ip`
fn login_from(ip: &str, password: &str) -> Request<Body> {
    let peer: SocketAddr = format!("{ip}:40000").parse().unwrap();
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "email": "alice@example.com", "password": password }).to_string(),
        ))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

fn with_forwarded_for(mut request: Request<Body>, ip: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert("X-Forwarded-For", ip.parse().unwrap());
    request
}

#[tokio::test]
async fn test_login_rate_limit() {
    let mut config: AppConfig = testing_config();
    config.rate_limit.login_attempts = 3;
    config.rate_limit.auth_window_secs = 2;
    let (app, _) = create_router_with_config(config);
    register(&app, "alice", "alice@example.com").await;

    for _ in 0..3 {
        let (status, _, _) = send(&app, login_from("203.0.113.7", "Wrong1234")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, headers, body) = send(&app, login_from("203.0.113.7", PASSWORD)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    let retry_after: u64 = headers
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=2).contains(&retry_after));

    // Other clients are unaffected
    let (status, _, _) = send(&app, login_from("198.51.100.1", PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);

    // The window resets
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
    let (status, _, _) = send(&app, login_from("203.0.113.7", PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forged_forwarded_for_does_not_reset_budget() {
    let mut config = testing_config();
    config.rate_limit.login_attempts = 3;
    let (app, _) = create_router_with_config(config);
    register(&app, "alice", "alice@example.com").await;

    let mut limited = 0;
    for i in 0..20 {
        let request = with_forwarded_for(
            login_from("203.0.113.7", "Wrong1234"),
            &format!("10.0.0.{i}"),
        );
        let (status, _, _) = send(&app, request).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 17);
}

#[tokio::test]
async fn test_trusted_proxy_keys_on_forwarded_for() {
    let mut config = testing_config();
    config.rate_limit.login_attempts = 1;
    config.rate_limit.trust_proxy = true;
    let (app, _) = create_router_with_config(config);
    register(&app, "alice", "alice@example.com").await;

    // Same proxy socket, two different end clients
    let first = with_forwarded_for(login_from("192.0.2.10", PASSWORD), "203.0.113.7");
    let (status, _, _) = send(&app, first).await;
    assert_eq!(status, StatusCode::OK);

    let again = with_forwarded_for(login_from("192.0.2.10", PASSWORD), "203.0.113.7");
    let (status, _, _) = send(&app, again).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let other = with_forwarded_for(login_from("192.0.2.10", PASSWORD), "198.51.100.1");
    let (status, _, _) = send(&app, other).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let mut config = testing_config();
    config.rate_limit.enabled = false;
    config.rate_limit.login_attempts = 1;
    let (app, _) = create_router_with_config(config);
    register(&app, "alice", "alice@example.com").await;

    for _ in 0..3 {
        let (status, _, _) = send(&app, login_from("203.0.113.7", PASSWORD)).await;
        assert_eq!(status, StatusCode::OK);
    }
}

// =============================================================================
// Contact Tests
// =============================================================================

async fn verified_user(app: &Router, outbox: &contacts_api::services::OutboxMailer) -> String {
    register(app, "alice", "alice@example.com").await;
    confirm(app, outbox, "alice@example.com").await;
    access_token(&login(app, "alice@example.com").await)
}

#[tokio::test]
async fn test_contact_crud() {
    let (app, test) = create_router_with_config(testing_config());
    let token = verified_user(&app, &test.outbox).await;
    let birthday = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();

    let (status, _, created) = send(
        &app,
        create_json_request(
            "POST",
            "/api/contacts",
            Some(&token),
            Some(contact_body("John", "john@example.com", birthday)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, fetched) = send(
        &app,
        create_json_request("GET", &format!("/api/contacts/{id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["first_name"], "John");

    let (status, _, updated) = send(
        &app,
        create_json_request(
            "PUT",
            &format!("/api/contacts/{id}"),
            Some(&token),
            Some(contact_body("Johnny", "john@example.com", birthday)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["first_name"], "Johnny");

    let (status, _, listed) = send(
        &app,
        create_json_request("GET", "/api/contacts?name=john", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _, _) = send(
        &app,
        create_json_request("DELETE", &format!("/api/contacts/{id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &app,
        create_json_request("GET", &format!("/api/contacts/{id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_contact_validation() {
    let (app, test) = create_router_with_config(testing_config());
    let token = verified_user(&app, &test.outbox).await;

    let mut body = contact_body(
        "John",
        "john@example.com",
        NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
    );
    body["phone"] = json!("12345");

    let (status, _, error) = send(
        &app,
        create_json_request("POST", "/api/contacts", Some(&token), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "VALIDATION_ERROR");

    let future = Utc::now().date_naive() + ChronoDuration::days(30);
    let (status, _, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/contacts",
            Some(&token),
            Some(contact_body("John", "john@example.com", future)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_duplicate_contact_email_conflicts() {
    let (app, test) = create_router_with_config(testing_config());
    let token = verified_user(&app, &test.outbox).await;
    let birthday = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
    let body = contact_body("John", "john@example.com", birthday);

    let (status, _, _) = send(
        &app,
        create_json_request("POST", "/api/contacts", Some(&token), Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = send(
        &app,
        create_json_request("POST", "/api/contacts", Some(&token), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_upcoming_birthdays() {
    let (app, test) = create_router_with_config(testing_config());
    let token = verified_user(&app, &test.outbox).await;
    let today = Utc::now().date_naive();

    for (name, email, birthday) in [
        ("Today", "today@example.com", in_1992(today)),
        ("Soon", "soon@example.com", in_1992(today + ChronoDuration::days(3))),
        ("Later", "later@example.com", in_1992(today + ChronoDuration::days(40))),
    ] {
        let (status, _, _) = send(
            &app,
            create_json_request(
                "POST",
                "/api/contacts",
                Some(&token),
                Some(contact_body(name, email, birthday)),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _, body) = send(
        &app,
        create_json_request("GET", "/api/contacts/birthdays", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["first_name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Soon", "Today"]);
}

#[tokio::test]
async fn test_contacts_are_private() {
    let (app, test) = create_router_with_config(testing_config());
    let alice = verified_user(&app, &test.outbox).await;

    register(&app, "bob", "bob@example.com").await;
    confirm(&app, &test.outbox, "bob@example.com").await;
    let bob = access_token(&login(&app, "bob@example.com").await);

    let (_, _, created) = send(
        &app,
        create_json_request(
            "POST",
            "/api/contacts",
            Some(&alice),
            Some(contact_body(
                "John",
                "john@example.com",
                NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            )),
        ),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, _, _) = send(
        &app,
        create_json_request("GET", &format!("/api/contacts/{id}"), Some(&bob), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
