//! Process-wide Prometheus counters, exported by `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Resolve requests by outcome (`matched`, `unmatched`, `invalid`)
    pub static ref RESOLVE_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "streamgate_resolve_total",
        "Resolve requests by outcome",
        &["outcome"]
    )
    .expect("resolve counter registers once");

    /// Proxied upstream fetches by resource kind and response status
    pub static ref PROXY_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "streamgate_proxy_requests_total",
        "Proxied requests by resource kind and status",
        &["kind", "status"]
    )
    .expect("proxy counter registers once");

    /// Cache lookups by key namespace and hit/miss
    pub static ref CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "streamgate_cache_lookups_total",
        "Cache lookups by key namespace and status",
        &["namespace", "status"]
    )
    .expect("cache counter registers once");
}

pub fn record_resolve(outcome: &str) {
    RESOLVE_OUTCOMES.with_label_values(&[outcome]).inc();
}

pub fn record_proxy(kind: &str, status: u16) {
    PROXY_REQUESTS
        .with_label_values(&[kind, &status.to_string()])
        .inc();
}

pub fn record_cache_lookup(key: &str, hit: bool) {
    let namespace = key.split(':').next().unwrap_or("unknown");
    let status = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS.with_label_values(&[namespace, status]).inc();
}
