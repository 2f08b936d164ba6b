//! Connector metrics.
//!
//! Counters are no-ops until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

macro_rules! connector_metric {
    (counter, $name:literal) => {
        concat!("journal_connector_", $name, "_total")
    };
    (histogram, $name:literal) => {
        concat!("journal_connector_", $name)
    };
}

/// Installs a Prometheus exporter listening on `0.0.0.0:<port>`.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(%addr, "prometheus exporter listening"),
        Err(e) => tracing::warn!(%addr, error = %e, "prometheus exporter install failed"),
    }
}

pub fn record_token_obtained() {
    ::metrics::counter!(connector_metric!(counter, "tokens_obtained")).increment(1);
}

pub fn record_page_fetched(events: usize) {
    ::metrics::counter!(connector_metric!(counter, "pages_fetched")).increment(1);
    ::metrics::histogram!(connector_metric!(histogram, "page_events")).record(events as f64);
}

pub fn record_delivered(count: usize) {
    ::metrics::counter!(connector_metric!(counter, "events_delivered")).increment(count as u64);
}

pub fn record_skipped(count: usize) {
    ::metrics::counter!(connector_metric!(counter, "events_skipped")).increment(count as u64);
}

/// `kind` is one of `auth`, `transport`, `protocol`, `delivery`, `checkpoint`, `config`.
pub fn record_run_failed(kind: &'static str) {
    ::metrics::counter!(connector_metric!(counter, "runs_failed"), "kind" => kind).increment(1);
}

pub fn record_run_completed() {
    ::metrics::counter!(connector_metric!(counter, "runs_completed")).increment(1);
}
