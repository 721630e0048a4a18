//! Metrics initialization for the Prometheus exporter.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsSettings;
use crate::error::{Error, Result};

/// Initialize the metrics system based on configuration.
///
/// When enabled, starts an HTTP listener exposing `/metrics` for
/// Prometheus to scrape. When disabled this is a no-op; unregistered
/// metrics degrade to no-ops.
pub fn init(cfg: &MetricsSettings) -> Result<()> {
    if !cfg.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(cfg.listen)
        .install()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    describe_counter!("dns_queries_total", "DNS queries received");
    describe_counter!(
        "dns_synthesized_answers_total",
        "Answers synthesized for configured zones"
    );
    describe_counter!("dns_forwarded_total", "Queries relayed upstream");
    describe_counter!("dns_forward_failures_total", "Failed upstream relays");
    describe_counter!("http_requests_total", "Instance-data HTTP requests");

    Ok(())
}
