//! Schema stage metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SchemaMetrics;

impl SchemaMetrics {
    pub fn record_table_created() {
        ::metrics::counter!(phase_metric!(counter, "schema", "tables_created")).increment(1);
    }
}

impl PhaseMetrics for SchemaMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "schema", "tables_created"));
    }

    fn phase_name() -> &'static str {
        "schema"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![MetricDoc {
            name: phase_metric!(counter, "schema", "tables_created"),
            metric_type: MetricType::Counter,
            help: "Tables created from the static schema",
        }]
    }
}
