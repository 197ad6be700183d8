//! Security headers middleware
//!
//! Adds a fixed set of hardening headers to every response. Responses from
//! credential-bearing routes (`/api/auth`, `/api/users`) are also marked
//! `Cache-Control: no-store` so tokens and profile data never land in shared
//! caches.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const STATIC_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("content-security-policy", "default-src 'self'"),
    ("referrer-policy", "no-referrer"),
];

fn is_sensitive(path: &str) -> bool {
    path.starts_with("/api/auth") || path.starts_with("/api/users")
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let sensitive = is_sensitive(request.uri().path());
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if sensitive {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}
