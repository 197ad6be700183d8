//! Contacts API - REST server
//!
//! Accounts with JWT authentication and personal contact management.
//! Bearer tokens are resolved to identities through a session cache so
//! authenticated requests rarely touch the credential store.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use axum::{http::HeaderValue, middleware as axum_middleware, routing::get, Router};
use contacts_core::AppConfig;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::register_handler,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::confirm_email_handler,
        handlers::auth::request_email_handler,
        handlers::auth::forgot_password_handler,
        handlers::auth::reset_password_handler,
        handlers::users::me_handler,
        handlers::users::change_password_handler,
        handlers::users::update_avatar_handler,
        handlers::users::update_role_handler,
        handlers::users::disable_user_handler,
        handlers::contacts::list_contacts,
        handlers::contacts::upcoming_birthdays,
        handlers::contacts::get_contact,
        handlers::contacts::create_contact,
        handlers::contacts::update_contact,
        handlers::contacts::delete_contact,
    ),
    components(schemas(
        error::ApiError,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::LogoutRequest,
        auth::EmailRequest,
        auth::ResetPasswordRequest,
        auth::ChangePasswordRequest,
        auth::RoleUpdateRequest,
        auth::TokenResponse,
        auth::MessageResponse,
        auth::UserResponse,
        contacts_core::UserRole,
        contacts_core::Contact,
        contacts_core::ContactDraft,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and tokens"),
        (name = "users", description = "Account management"),
        (name = "contacts", description = "Personal contacts"),
        (name = "health", description = "Probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::prometheus_metrics))
        .nest("/api", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Router over an in-memory store with cheap password hashing
pub fn create_router_for_testing() -> Router {
    create_router_with_config(testing_config()).0
}

/// Router for tests that need their own configuration, together with the
/// state and the outbox mailer the tests inspect.
///
/// # Panics
///
/// If the metrics registry cannot be built.
pub fn create_router_with_config(config: AppConfig) -> (Router, TestingState) {
    let (state, outbox) = match AppState::in_memory(config) {
        Ok(built) => built,
        Err(e) => panic!("failed to build test state: {e}"),
    };
    let state = Arc::new(state);
    let router = create_router(state.clone());
    (router, TestingState { app: state, outbox })
}

/// Handles kept by tests alongside the router
pub struct TestingState {
    pub app: Arc<AppState>,
    pub outbox: Arc<services::OutboxMailer>,
}

/// Development defaults with argon2 costs low enough for tests
pub fn testing_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.argon2_memory_kib = 1024;
    config.auth.argon2_iterations = 1;
    config.auth.argon2_parallelism = 1;
    config
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}
