//! Prometheus export for the session metrics.
//!
//! The session records through the `metrics` facade; this module installs
//! the exporter that serves them.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Describe the session metrics and start the Prometheus listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics server on {addr}"))?;
    drumie_core::metrics::describe();

    info!("Metrics server listening on {}", addr);
    Ok(())
}
