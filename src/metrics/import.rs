//! Import stage metrics
//!
//! Row counts copied from the source export into the normalized tables.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct ImportMetrics;

impl ImportMetrics {
    pub fn record_table_imported(inserted: usize, failed: usize) {
        ::metrics::counter!(phase_metric!(counter, "import", "rows_inserted"))
            .increment(inserted as u64);
        ::metrics::counter!(phase_metric!(counter, "import", "rows_failed"))
            .increment(failed as u64);
        ::metrics::histogram!(phase_metric!(histogram, "import", "table_rows"))
            .record(inserted as f64);
    }

    pub fn record_rows_flagged(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "import", "rows_flagged")).increment(rows as u64);
    }

    pub fn record_table_missing() {
        ::metrics::counter!(phase_metric!(counter, "import", "tables_missing")).increment(1);
    }
}

impl PhaseMetrics for ImportMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "import", "rows_inserted"));
        let _ = ::metrics::counter!(phase_metric!(counter, "import", "rows_failed"));
        let _ = ::metrics::counter!(phase_metric!(counter, "import", "tables_missing"));
        let _ = ::metrics::counter!(phase_metric!(counter, "import", "rows_flagged"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "import", "table_rows"));
    }

    fn phase_name() -> &'static str {
        "import"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "import", "rows_inserted"),
                metric_type: MetricType::Counter,
                help: "Rows inserted into normalized tables",
            },
            MetricDoc {
                name: phase_metric!(counter, "import", "rows_failed"),
                metric_type: MetricType::Counter,
                help: "Source rows rejected by the normalized schema",
            },
            MetricDoc {
                name: phase_metric!(counter, "import", "tables_missing"),
                metric_type: MetricType::Counter,
                help: "Mapped tables absent from the source export",
            },
            MetricDoc {
                name: phase_metric!(counter, "import", "rows_flagged"),
                metric_type: MetricType::Counter,
                help: "Imported reinforcement rows with out-of-range values",
            },
            MetricDoc {
                name: phase_metric!(histogram, "import", "table_rows"),
                metric_type: MetricType::Histogram,
                help: "Rows inserted per table",
            },
        ]
    }
}
