//! Run reports and the sink the engine reports through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::IntegrityViolation;
use crate::link::rule::{LinkPhase, LinkRule, RuleKind};
use crate::metrics::LinkMetrics;

/// A source value with no match in the validated target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Orphan {
    pub value: String,
    pub count: u64,
}

/// What happened to one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleOutcome {
    Updated { rows: usize },
    Annotated,
    Validated { orphans: Vec<Orphan> },
    Skipped { reason: String },
    Failed { error: String },
}

impl RuleOutcome {
    pub fn rows_updated(&self) -> usize {
        match self {
            RuleOutcome::Updated { rows } => *rows,
            _ => 0,
        }
    }

    pub fn orphan_rows(&self) -> u64 {
        match self {
            RuleOutcome::Validated { orphans } => orphans.iter().map(|o| o.count).sum(),
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuleOutcome::Updated { .. } => "updated",
            RuleOutcome::Annotated => "annotated",
            RuleOutcome::Validated { .. } => "validated",
            RuleOutcome::Skipped { .. } => "skipped",
            RuleOutcome::Failed { .. } => "failed",
        }
    }
}

/// One row of the report, in execution order
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule_id: u32,
    pub kind: RuleKind,
    pub phase: LinkPhase,
    /// `table.column` the rule worked on
    pub column: String,
    pub outcome: RuleOutcome,
}

/// A validation finding: `table.column = value` appears `count` times without a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule_id: u32,
    pub column: String,
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: String,
    pub rules: Vec<RuleReport>,
    /// `table.column` -> rows updated
    pub stats: BTreeMap<String, usize>,
    pub findings: Vec<Finding>,
    pub integrity_violations: Vec<IntegrityViolation>,
}

impl RunReport {
    pub fn total_updated(&self) -> usize {
        self.stats.values().sum()
    }

    pub fn total_orphans(&self) -> u64 {
        self.findings.iter().map(|f| f.count).sum()
    }

    pub fn failed_rules(&self) -> Vec<u32> {
        self.rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Failed { .. }))
            .map(|r| r.rule_id)
            .collect()
    }

    pub fn skipped_rules(&self) -> Vec<u32> {
        self.rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Skipped { .. }))
            .map(|r| r.rule_id)
            .collect()
    }

    pub fn outcome(&self, rule_id: u32) -> Option<&RuleOutcome> {
        self.rules
            .iter()
            .find(|r| r.rule_id == rule_id)
            .map(|r| &r.outcome)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary: one line per rule, then totals
    pub fn render_summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        writeln!(f, "Link run {} (rules {})", self.run_id, short)?;
        writeln!(f, "{}", "=".repeat(60))?;
        for r in &self.rules {
            let detail = match &r.outcome {
                RuleOutcome::Updated { rows } => format!("{} rows updated", rows),
                RuleOutcome::Annotated => "documented".to_string(),
                RuleOutcome::Validated { orphans } if orphans.is_empty() => "ok".to_string(),
                RuleOutcome::Validated { orphans } => format!(
                    "{} orphan values ({} rows)",
                    orphans.len(),
                    r.outcome.orphan_rows()
                ),
                RuleOutcome::Skipped { reason } => format!("skipped: {}", reason),
                RuleOutcome::Failed { error } => format!("FAILED: {}", error),
            };
            writeln!(
                f,
                "  #{:<3} {:<16} {:<60} {}",
                r.rule_id,
                r.kind.as_str(),
                r.column,
                detail
            )?;
        }
        if !self.findings.is_empty() {
            writeln!(f, "Validation findings:")?;
            for finding in &self.findings {
                writeln!(
                    f,
                    "  {} = {} ({} rows)",
                    finding.column, finding.value, finding.count
                )?;
            }
        }
        if !self.integrity_violations.is_empty() {
            writeln!(f, "Foreign key violations:")?;
            for v in &self.integrity_violations {
                writeln!(f, "  {} -> {}: {} rows", v.table, v.parent, v.rows)?;
            }
        }
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(
            f,
            "Total rows updated: {} | Validation orphans: {} | Failed rules: {} | Skipped rules: {}",
            self.total_updated(),
            self.total_orphans(),
            self.failed_rules().len(),
            self.skipped_rules().len()
        )
    }
}

/// Receives engine events as they happen.
pub trait ReportSink {
    fn integrity_toggled(&self, _enabled: bool) {}

    fn phase_started(&self, _phase: LinkPhase, _rules: usize) {}

    fn rule_finished(&self, rule: &LinkRule, outcome: &RuleOutcome);

    fn run_finished(&self, _report: &RunReport) {}
}

/// Forwards events to `tracing` and the link metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn integrity_toggled(&self, enabled: bool) {
        info!(enabled, "Foreign key enforcement toggled");
    }

    fn phase_started(&self, phase: LinkPhase, rules: usize) {
        info!(phase = %phase, rules, "Starting link phase");
    }

    fn rule_finished(&self, rule: &LinkRule, outcome: &RuleOutcome) {
        match outcome {
            RuleOutcome::Updated { rows } => {
                info!(rule_id = rule.id, column = %rule.source, rows, "Rule applied");
                LinkMetrics::record_rule_updated(*rows);
            }
            RuleOutcome::Annotated => {
                info!(rule_id = rule.id, column = %rule.source, target = %rule.target, "Direct link documented");
            }
            RuleOutcome::Validated { orphans } => {
                let rows = outcome.orphan_rows();
                if orphans.is_empty() {
                    info!(rule_id = rule.id, column = %rule.source, "Validation passed");
                } else {
                    warn!(
                        rule_id = rule.id,
                        column = %rule.source,
                        target = %rule.target,
                        values = orphans.len(),
                        rows,
                        "Validation found orphaned values"
                    );
                }
                LinkMetrics::record_orphans(rows);
            }
            RuleOutcome::Skipped { reason } => {
                warn!(rule_id = rule.id, column = %rule.source, reason = %reason, "Rule skipped");
                LinkMetrics::record_rule_skipped();
            }
            RuleOutcome::Failed { error: e } => {
                error!(rule_id = rule.id, column = %rule.source, error = %e, "Rule failed");
                LinkMetrics::record_rule_failed();
            }
        }
    }

    fn run_finished(&self, report: &RunReport) {
        let seconds = (report.finished_at - report.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        LinkMetrics::record_run_duration(seconds);
        info!(
            run_id = %report.run_id,
            rows_updated = report.total_updated(),
            orphans = report.total_orphans(),
            failed = report.failed_rules().len(),
            "Link run finished"
        );
    }
}

/// Event recorded by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Integrity(bool),
    Phase(LinkPhase),
    Rule(u32, RuleOutcome),
    Finished,
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ReportSink for MemorySink {
    fn integrity_toggled(&self, enabled: bool) {
        self.push(SinkEvent::Integrity(enabled));
    }

    fn phase_started(&self, phase: LinkPhase, _rules: usize) {
        self.push(SinkEvent::Phase(phase));
    }

    fn rule_finished(&self, rule: &LinkRule, outcome: &RuleOutcome) {
        self.push(SinkEvent::Rule(rule.id, outcome.clone()));
    }

    fn run_finished(&self, _report: &RunReport) {
        self.push(SinkEvent::Finished);
    }
}
