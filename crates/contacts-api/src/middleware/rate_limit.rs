//! Fixed-window rate limiting per client
//!
//! Each limiter owns one scope (login, registration, profile reads) and
//! counts requests per client key. The key is the socket peer address.
//! With `trust_proxy` set it is the first `X-Forwarded-For` hop, then
//! `X-Real-IP`, then the peer address; clients can forge those headers, so
//! only enable it behind a proxy that rewrites them.
//!
//! Limiters are layered only on the routes they protect, so a client that
//! exhausts its login budget can still use every other endpoint.
//!
//! Author: hephaex@gmail.com

use crate::audit::{audit_log, client_ip, AuditEvent};
use crate::auth::AuthError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use contacts_core::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Windows are swept once the map grows past this many clients
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Rejection with the time until the client's window resets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds, rounded up, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl From<RateLimited> for AuthError {
    fn from(limited: RateLimited) -> Self {
        AuthError::RateLimited {
            retry_after_secs: limited.retry_after_secs(),
        }
    }
}

pub struct RateLimiter {
    scope: &'static str,
    max_requests: u32,
    window: Duration,
    enabled: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(scope: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            scope,
            max_requests,
            window,
            enabled: true,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that admits everything
    pub fn unlimited(scope: &'static str) -> Self {
        Self {
            enabled: false,
            ..Self::new(scope, u32::MAX, Duration::from_secs(1))
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// Count one request from `key`
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        if !self.enabled {
            return Ok(());
        }

        let mut windows = self.windows.lock();
        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return Err(RateLimited {
                retry_after: self
                    .window
                    .saturating_sub(now.saturating_duration_since(entry.started)),
            });
        }

        entry.count += 1;
        Ok(())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

/// One limiter per protected scope
pub struct RateLimiters {
    pub login: RateLimiter,
    pub register: RateLimiter,
    pub profile: RateLimiter,
    trust_proxy: bool,
}

impl RateLimiters {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::unlimited();
        }
        let auth_window = Duration::from_secs(config.auth_window_secs);
        Self {
            login: RateLimiter::new("login", config.login_attempts, auth_window),
            register: RateLimiter::new("register", config.register_attempts, auth_window),
            profile: RateLimiter::new(
                "profile",
                config.profile_requests,
                Duration::from_secs(config.profile_window_secs),
            ),
            trust_proxy: config.trust_proxy,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            login: RateLimiter::unlimited("login"),
            register: RateLimiter::unlimited("register"),
            profile: RateLimiter::unlimited("profile"),
            trust_proxy: false,
        }
    }

    /// Key a request is counted under
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let ip = if self.trust_proxy {
            client_ip(headers, peer)
        } else {
            peer.map(|addr| addr.ip().to_string())
        };
        ip.unwrap_or_else(|| "unknown".to_string())
    }
}

async fn enforce(
    state: &AppState,
    limiter: &RateLimiter,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = state.limiters.client_key(request.headers(), peer);
    if let Err(limited) = limiter.check(&key) {
        state.metrics.record_rate_limited(limiter.scope());
        audit_log(&AuditEvent::RateLimited {
            scope: limiter.scope().to_string(),
            client: key,
            retry_after_secs: limited.retry_after_secs(),
        });
        return Err(limited.into());
    }
    Ok(next.run(request).await)
}

pub async fn limit_login(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce(&state, &state.limiters.login, request, next).await
}

pub async fn limit_register(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce(&state, &state.limiters.register, request, next).await
}

pub async fn limit_profile(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    enforce(&state, &state.limiters.profile, request, next).await
}
