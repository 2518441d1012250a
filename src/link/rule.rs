//! Link rule model.
//!
//! A rule names the column it works on, the column holding the authoritative
//! value, and exactly one action. Each action carries only the fields its
//! resolver needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `table.column` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One equality predicate between a source column and a target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnPair {
    pub source: String,
    pub target: String,
}

impl ColumnPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// What a rule does to its source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkAction {
    /// Documents a text relationship; never executed.
    Direct,
    /// Reports source values that have no match in the target column.
    Validation,
    /// Copies the target column from the row matched on one column pair.
    IdFill { lookup: ColumnPair },
    /// Copies the target column from the row matched on every column pair.
    IdFillComplex { join_on: Vec<ColumnPair> },
    /// Assigns a fixed value.
    StaticId { value: i64 },
}

/// Rule kind names as they appear in rule files and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Direct,
    Validation,
    IdFill,
    IdFillComplex,
    StaticId,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::Direct,
        RuleKind::Validation,
        RuleKind::IdFill,
        RuleKind::IdFillComplex,
        RuleKind::StaticId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Direct => "direct",
            RuleKind::Validation => "validation",
            RuleKind::IdFill => "id_fill",
            RuleKind::IdFillComplex => "id_fill_complex",
            RuleKind::StaticId => "static_id",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution phase. Rules run phase by phase in this order.
///
/// Single-column fills run before composite ones because composite keys may
/// include columns the single fills populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    StaticFirst,
    Annotate,
    IdFillSingle,
    IdFillComposite,
    ValidateLast,
}

impl LinkPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPhase::StaticFirst => "static_first",
            LinkPhase::Annotate => "annotate",
            LinkPhase::IdFillSingle => "id_fill_single",
            LinkPhase::IdFillComposite => "id_fill_composite",
            LinkPhase::ValidateLast => "validate_last",
        }
    }

    /// Whether rules in this phase write to the store
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            LinkPhase::StaticFirst | LinkPhase::IdFillSingle | LinkPhase::IdFillComposite
        )
    }
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated link rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRule {
    pub id: u32,
    pub priority: i32,
    /// Column being filled (fill rules) or checked (direct/validation)
    pub source: ColumnRef,
    /// Column holding the authoritative value
    pub target: ColumnRef,
    pub action: LinkAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LinkRule {
    pub fn kind(&self) -> RuleKind {
        match self.action {
            LinkAction::Direct => RuleKind::Direct,
            LinkAction::Validation => RuleKind::Validation,
            LinkAction::IdFill { .. } => RuleKind::IdFill,
            LinkAction::IdFillComplex { .. } => RuleKind::IdFillComplex,
            LinkAction::StaticId { .. } => RuleKind::StaticId,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        match self.action {
            LinkAction::StaticId { .. } => LinkPhase::StaticFirst,
            LinkAction::Direct => LinkPhase::Annotate,
            LinkAction::IdFill { .. } => LinkPhase::IdFillSingle,
            LinkAction::IdFillComplex { .. } => LinkPhase::IdFillComposite,
            LinkAction::Validation => LinkPhase::ValidateLast,
        }
    }

    /// Total execution order: phase, then priority, then id
    pub fn sort_key(&self) -> (LinkPhase, i32, u32) {
        (self.phase(), self.priority, self.id)
    }

    pub fn is_mutating(&self) -> bool {
        self.phase().is_mutating()
    }

    /// Canonical one-line description, stable across runs
    pub fn describe(&self) -> String {
        let detail = match &self.action {
            LinkAction::Direct | LinkAction::Validation => String::new(),
            LinkAction::IdFill { lookup } => format!(" on {}={}", lookup.source, lookup.target),
            LinkAction::IdFillComplex { join_on } => {
                let pairs: Vec<String> = join_on
                    .iter()
                    .map(|p| format!("{}={}", p.source, p.target))
                    .collect();
                format!(" on {}", pairs.join(","))
            }
            LinkAction::StaticId { value } => format!(" = {}", value),
        };
        format!(
            "#{} [{} p{}] {} <- {}{}",
            self.id,
            self.kind(),
            self.priority,
            self.source,
            self.target,
            detail
        )
    }
}
