//! # Internal Metrics
//!
//! Metric names are registered here with their descriptions. Components
//! record through the `metrics` macros directly; without an installed
//! recorder those calls are no-ops.
//!
//! When `metrics.prometheus_addr` is configured, a Prometheus exporter is
//! installed as the global recorder and serves `/metrics` on that address.

use anyhow::{Context, Result};
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Registers descriptions for every metric the application records.
pub fn describe_metrics() {
    metrics::describe_counter!("events_received_total", Unit::Count, "Total number of messages parsed from the certstream feed, heartbeats included.");
    metrics::describe_counter!("events_malformed_total", Unit::Count, "Total number of feed messages that could not be parsed.");
    metrics::describe_counter!("heartbeats_total", Unit::Count, "Total number of heartbeat events discarded by the pipeline.");
    metrics::describe_counter!("hostnames_processed_total", Unit::Count, "Total number of certificate hostnames examined.");
    metrics::describe_counter!("labels_suppressed_total", Unit::Count, "Total number of candidate labels rejected by the noise filter.");
    metrics::describe_counter!("notifications_total", Unit::Count, "Total number of notifications produced, labeled by kind.");
    metrics::describe_counter!("store_errors_total", Unit::Count, "Total number of label store failures.");
    metrics::describe_gauge!("label_store_entries", Unit::Count, "Number of distinct labels held by the in-memory store.");
    metrics::describe_counter!("notifications_written_total", Unit::Count, "Total number of notifications written, labeled by output.");
    metrics::describe_counter!("output_failures_total", Unit::Count, "Total number of failed output writes, labeled by output.");
    metrics::describe_counter!("notifications_delivered_total", Unit::Count, "Total number of chat notifications delivered.");
    metrics::describe_counter!("notification_failures_total", Unit::Count, "Total number of chat notifications that failed to deliver.");
    metrics::describe_counter!("notifications_dropped_total", Unit::Count, "Total number of chat notifications dropped because the notifier lagged.");
}

/// Installs the Prometheus exporter and starts its HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on {}", addr))?;
    describe_metrics();
    info!(%addr, "Prometheus metrics available at /metrics");
    Ok(())
}
