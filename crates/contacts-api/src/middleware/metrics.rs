//! Request metrics middleware
//!
//! Records a request count and latency observation per endpoint and status.
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    // Prefer the route template so ids do not explode label cardinality
    let endpoint = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_endpoint(request.uri().path()),
    };

    let response = next.run(request).await;

    state.metrics.record_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Replace id-like path segments with `:id`
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if uuid::Uuid::parse_str(seg).is_ok() || is_numeric(seg) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("/api/contacts/550e8400-e29b-41d4-a716-446655440000"),
            "/api/contacts/:id"
        );
        assert_eq!(normalize_endpoint("/api/users/42/role"), "/api/users/:id/role");
        assert_eq!(normalize_endpoint("/api/contacts/birthdays"), "/api/contacts/birthdays");
        assert_eq!(normalize_endpoint("/health"), "/health");
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("123"));
        assert!(!is_numeric("12a"));
        assert!(!is_numeric(""));
    }
}
