//! Observability setup: structured logging, Prometheus metrics, pipeline counters.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging on stderr.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,esg=debug"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize the Prometheus metrics exporter on `listen_addr`.
pub fn init_metrics(listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = listen_addr.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("Prometheus metrics endpoint on http://{}/metrics", addr);
    Ok(())
}

/// Count dump lines by outcome: `inserted`, `failed`, `skipped`.
pub fn record_import_lines(outcome: &'static str, n: u64) {
    metrics::counter!("esg_import_lines_total", "outcome" => outcome).increment(n);
}

/// Count flushed batches by commit path: `bulk` or `fallback`.
pub fn record_import_batch(path: &'static str, size: usize) {
    metrics::counter!("esg_import_batches_total", "path" => path).increment(1);
    metrics::histogram!("esg_import_batch_size", "path" => path).record(size as f64);
}

/// Count attestation pages by terminal outcome: `applied` or `voided`.
pub fn record_attest_page(outcome: &'static str, records: usize) {
    metrics::counter!("esg_attest_pages_total", "outcome" => outcome).increment(1);
    metrics::counter!("esg_attest_records_total", "outcome" => outcome).increment(records as u64);
}

pub fn record_index_update(success: bool) {
    metrics::counter!("esg_attest_index_updates_total", "success" => success.to_string())
        .increment(1);
}

pub fn record_confirmation(duration_ms: u64, confirmed: bool) {
    metrics::histogram!("esg_attest_confirm_duration_ms", "confirmed" => confirmed.to_string())
        .record(duration_ms as f64);
}
