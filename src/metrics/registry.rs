//! Registration of all stage metrics with conflict detection.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Register all metrics from all stages
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::schema::SchemaMetrics>(&mut all_metrics);
    register_phase_metrics::<super::import::ImportMetrics>(&mut all_metrics);
    register_phase_metrics::<super::link::LinkMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all stages",
        all_metrics.len()
    );
    for doc in all_metrics.values() {
        debug!(name = doc.name, kind = ?doc.metric_type, "{}", doc.help);
    }
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' registered again by stage '{}'",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

/// Extract the stage from a metric name ("veda_link_rows_updated_total" -> "link")
pub fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("veda_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ImportMetrics, LinkMetrics, SchemaMetrics};
    use std::collections::HashSet;

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(
            extract_phase_from_metric_name("veda_link_rows_updated_total"),
            "link"
        );
        assert_eq!(
            extract_phase_from_metric_name("veda_import_rows_inserted_total"),
            "import"
        );
        assert_eq!(extract_phase_from_metric_name("other_metric"), "unknown");
    }

    #[test]
    fn test_documented_names_are_unique_and_prefixed() {
        let mut seen = HashSet::new();
        let docs = SchemaMetrics::metrics_documentation()
            .into_iter()
            .chain(ImportMetrics::metrics_documentation())
            .chain(LinkMetrics::metrics_documentation());
        for doc in docs {
            assert!(seen.insert(doc.name), "duplicate metric {}", doc.name);
            assert_ne!(extract_phase_from_metric_name(doc.name), "unknown");
        }
    }
}
