//! Prometheus metrics for the proxy.

use crate::cache::CacheTier;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder once and return its render handle.
///
/// Later calls (e.g. one router per test) share the first handle. If another
/// recorder already owns the process, a detached recorder is used so
/// `/metrics` still renders.
pub fn init() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Count a finished proxy request
pub fn record_request(outcome: &'static str, status: u16) {
    ::metrics::counter!(
        "hls_relay_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the wall time of a proxy request started at `start`
pub fn record_duration(outcome: &'static str, start: Instant) {
    ::metrics::histogram!("hls_relay_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(tier: CacheTier, hit: bool) {
    ::metrics::counter!(
        "hls_relay_cache_lookups_total",
        "tier" => tier.as_str(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

pub fn record_origin_error() {
    ::metrics::counter!("hls_relay_origin_errors_total").increment(1);
}
