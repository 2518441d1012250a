//! Foreign-key resolution for the normalized store.
//!
//! Rules come from the built-in [`catalog`] or a TOML rule file
//! ([`loader`]); the [`engine`] applies them through the [`resolver`]s and
//! reports through a [`report::ReportSink`].

pub mod catalog;
pub mod engine;
pub mod loader;
pub mod report;
pub mod resolver;
pub mod rule;

pub use engine::LinkEngine;
pub use loader::{RuleDef, RuleSet, RuleSummary};
pub use report::{LogSink, MemorySink, Orphan, ReportSink, RuleOutcome, RunReport};
pub use rule::{ColumnPair, ColumnRef, LinkAction, LinkPhase, LinkRule, RuleKind};
