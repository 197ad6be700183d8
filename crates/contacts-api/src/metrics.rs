//! Prometheus metrics
//!
//! One registry per [`AppState`](crate::state::AppState); nothing is global,
//! so every test router starts from zero.

use crate::auth::session_cache::SessionCache;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    auth_outcomes: IntCounterVec,
    rate_limited: IntCounterVec,
    cache_hits: IntGauge,
    cache_misses: IntGauge,
    cache_entries: IntGauge,
    uptime: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("contacts".to_string()), None)?;

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by endpoint and status"),
            &["endpoint", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["endpoint"],
        )?;
        let auth_outcomes = IntCounterVec::new(
            Opts::new("auth_outcomes_total", "Bearer authentication results"),
            &["outcome"],
        )?;
        let rate_limited = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests rejected by a rate limiter"),
            &["scope"],
        )?;
        let cache_hits = IntGauge::new("session_cache_hits", "Session cache hits since start")?;
        let cache_misses =
            IntGauge::new("session_cache_misses", "Session cache misses since start")?;
        let cache_entries = IntGauge::new("session_cache_entries", "Cached identities")?;
        let uptime = IntGauge::new("uptime_seconds", "Time since server start")?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(auth_outcomes.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(uptime.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            auth_outcomes,
            rate_limited,
            cache_hits,
            cache_misses,
            cache_entries,
            uptime,
        })
    }

    pub fn record_request(&self, endpoint: &str, status: u16, seconds: f64) {
        self.http_requests
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
        self.http_duration
            .with_label_values(&[endpoint])
            .observe(seconds);
    }

    pub fn record_auth(&self, outcome: &str) {
        self.auth_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn record_rate_limited(&self, scope: &str) {
        self.rate_limited.with_label_values(&[scope]).inc();
    }

    /// Prometheus text exposition, with cache gauges sampled now
    pub fn render(&self, sessions: &SessionCache, uptime_secs: u64) -> Result<String, prometheus::Error> {
        let stats = sessions.stats();
        self.cache_hits.set(stats.hits() as i64);
        self.cache_misses.set(stats.misses() as i64);
        self.cache_entries.set(sessions.entry_count() as i64);
        self.uptime.set(uptime_secs as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
