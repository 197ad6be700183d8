//! HTTP middleware: rate limiting, request metrics and security headers
//!
//! Bearer authentication lives in [`crate::auth::middleware`].
//!
//! Author: hephaex@gmail.com

pub mod metrics;
pub mod rate_limit;
pub mod security_headers;

pub use metrics::metrics_middleware;
pub use rate_limit::{limit_login, limit_profile, limit_register, RateLimiter, RateLimiters};
pub use security_headers::security_headers_middleware;
