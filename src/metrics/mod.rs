//! Metrics for the migration pipeline
//!
//! Each pipeline stage defines its own metrics in a dedicated submodule so the
//! names stay consistent and conflicts are caught at registration. Recording
//! is a no-op until a recorder is installed with [`init_metrics`].

pub mod import;
pub mod link;
pub mod registry;
pub mod schema;

pub use import::ImportMetrics;
pub use link::LinkMetrics;
pub use schema::SchemaMetrics;

use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install an in-process Prometheus recorder and register all stage metrics.
///
/// Idempotent. No HTTP listener is started; the snapshot is written to a
/// file with [`write_snapshot`] when the process finishes.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Metrics handle was already stored");
            }
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    }
}

/// Render the current metrics in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Write the Prometheus text snapshot to `path`.
pub fn write_snapshot(path: &Path) -> std::io::Result<bool> {
    match render() {
        Some(text) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, text)?;
            info!(path = %path.display(), "Metrics snapshot written");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Per-stage metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this stage
    fn register_metrics();

    /// Stage name used as the metric prefix
    fn phase_name() -> &'static str;

    /// Documentation for all metrics in this stage
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names following veda_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("veda_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("veda_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("veda_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
