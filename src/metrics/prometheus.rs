use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::transport::connection::ConnectionState;

/// Start the Prometheus HTTP exporter on the given port.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, gauge!, histogram!) are exported at /metrics.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    Ok(())
}

// ── Poll metrics ─────────────────────────────────────────────────

/// `outcome` is one of: ok, failed, skipped.
pub fn record_poll(source: &str, outcome: &'static str) {
    counter!("poll_total", "source" => source.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_change_detected() {
    counter!("changes_detected_total").increment(1);
}

// ── Broadcast metrics ────────────────────────────────────────────

/// `outcome` is one of: sent, dropped_interval, dropped_busy.
pub fn record_broadcast(outcome: &'static str) {
    counter!("broadcasts_total", "outcome" => outcome).increment(1);
}

pub fn record_broadcast_send(ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!("broadcast_sends_total", "result" => result).increment(1);
}

pub fn record_broadcast_duration_ms(duration_ms: f64) {
    histogram!("broadcast_duration_ms").record(duration_ms);
}

pub fn record_subscribers(count: usize) {
    gauge!("subscribers").set(count as f64);
}

// ── Inbound metrics ──────────────────────────────────────────────

pub fn record_reply(command: &'static str, ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!("replies_total", "command" => command, "result" => result).increment(1);
}

pub fn record_rate_limited(command: &'static str) {
    counter!("rate_limited_total", "command" => command).increment(1);
}

pub fn record_duplicate_inbound() {
    counter!("inbound_duplicates_total").increment(1);
}

// ── Connection metrics ───────────────────────────────────────────

/// One-hot gauge per state so dashboards can plot time spent in each.
pub fn record_connection_state(current: ConnectionState) {
    for state in [
        ConnectionState::Connecting,
        ConnectionState::WarmingUp,
        ConnectionState::Ready,
        ConnectionState::Reconnecting,
        ConnectionState::LoggedOut,
    ] {
        let value = if state == current { 1.0 } else { 0.0 };
        gauge!("connection_state", "state" => state.as_str()).set(value);
    }
}

pub fn record_reconnect() {
    counter!("reconnects_total").increment(1);
}
