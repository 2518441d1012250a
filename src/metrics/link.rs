//! Link stage metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct LinkMetrics;

impl LinkMetrics {
    pub fn record_rule_updated(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "link", "rules_executed")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "link", "rows_updated")).increment(rows as u64);
    }

    pub fn record_rule_failed() {
        ::metrics::counter!(phase_metric!(counter, "link", "rules_failed")).increment(1);
    }

    pub fn record_rule_skipped() {
        ::metrics::counter!(phase_metric!(counter, "link", "rules_skipped")).increment(1);
    }

    pub fn record_orphans(rows: u64) {
        ::metrics::counter!(phase_metric!(counter, "link", "rules_executed")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "link", "orphan_rows")).increment(rows);
    }

    pub fn record_run_duration(seconds: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "link", "run_duration_seconds"))
            .record(seconds);
    }
}

impl PhaseMetrics for LinkMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "link", "rules_executed"));
        let _ = ::metrics::counter!(phase_metric!(counter, "link", "rules_failed"));
        let _ = ::metrics::counter!(phase_metric!(counter, "link", "rules_skipped"));
        let _ = ::metrics::counter!(phase_metric!(counter, "link", "rows_updated"));
        let _ = ::metrics::counter!(phase_metric!(counter, "link", "orphan_rows"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "link", "run_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "link"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "link", "rules_executed"),
                metric_type: MetricType::Counter,
                help: "Link rules that ran to completion",
            },
            MetricDoc {
                name: phase_metric!(counter, "link", "rules_failed"),
                metric_type: MetricType::Counter,
                help: "Link rules that raised an error and were skipped",
            },
            MetricDoc {
                name: phase_metric!(counter, "link", "rules_skipped"),
                metric_type: MetricType::Counter,
                help: "Link rules rejected before execution",
            },
            MetricDoc {
                name: phase_metric!(counter, "link", "rows_updated"),
                metric_type: MetricType::Counter,
                help: "Foreign-key cells filled",
            },
            MetricDoc {
                name: phase_metric!(counter, "link", "orphan_rows"),
                metric_type: MetricType::Counter,
                help: "Rows whose value has no match in the validated target",
            },
            MetricDoc {
                name: phase_metric!(histogram, "link", "run_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a complete link run",
            },
        ]
    }
}
