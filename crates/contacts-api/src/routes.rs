//! API route definitions
//!
//! Access policies and rate limits are route layers, so each group only
//! carries the checks it needs.
//!
//! Author: hephaex@gmail.com

use crate::auth::{require_admin, require_user, require_verified};
use crate::handlers::{auth, contacts, users};
use crate::middleware::{limit_login, limit_profile, limit_register};
use crate::services::avatar::MAX_AVATAR_BYTES;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

/// Routes mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .nest("/users", user_routes(state.clone()))
        .nest("/contacts", contact_routes(state))
}

fn auth_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register = Router::new()
        .route("/register", post(auth::register_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_register));

    let login = Router::new()
        .route("/login", post(auth::login_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_login));

    let logout = Router::new()
        .route("/logout", post(auth::logout_handler))
        .route_layer(middleware::from_fn_with_state(state, require_user));

    Router::new()
        .merge(register)
        .merge(login)
        .merge(logout)
        .route("/refresh", post(auth::refresh_handler))
        .route("/confirmed_email/:token", get(auth::confirm_email_handler))
        .route("/request_email", post(auth::request_email_handler))
        .route("/forgot_password", post(auth::forgot_password_handler))
        .route("/reset_password", post(auth::reset_password_handler))
}

fn user_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Layers run outside-in: authenticate first, then count the request
    let profile = Router::new()
        .route("/me", get(users::me_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let own_account = Router::new()
        .route("/me/password", put(users::change_password_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin = Router::new()
        .route(
            "/avatar",
            patch(users::update_avatar_handler)
                .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024)),
        )
        .route("/:id/role", patch(users::update_role_handler))
        .route("/:id/disable", post(users::disable_user_handler))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new().merge(profile).merge(own_account).merge(admin)
}

fn contact_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/birthdays", get(contacts::upcoming_birthdays))
        .route(
            "/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route_layer(middleware::from_fn_with_state(state, require_verified))
}
