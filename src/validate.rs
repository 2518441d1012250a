//! Value checks for imported column reinforcement.
//!
//! Sizes and spacings are in millimetres. Rows are flagged, never rejected:
//! the import keeps them and the report lists what looks wrong.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{quote_ident, Store};
use crate::error::Result;
use crate::schema::tables;

pub const MAX_SECTION_NAME_LEN: usize = 100;

static SECTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("section name pattern is valid"));

/// Accepted range for one numeric column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeRule {
    pub column: &'static str,
    pub min: f64,
    pub max: f64,
    pub integer: bool,
    pub required: bool,
}

pub const REINFORCEMENT_RANGES: [RangeRule; 5] = [
    RangeRule { column: "Tie_Bar_Size", min: 0.1, max: 50.0, integer: false, required: true },
    RangeRule { column: "Tie_Bar_Spacing", min: 50.0, max: 500.0, integer: false, required: true },
    RangeRule { column: "Clear_Cover_to_Ties", min: 10.0, max: 100.0, integer: false, required: false },
    RangeRule { column: "Number_Ties_3_Dir", min: 0.0, max: 100.0, integer: true, required: false },
    RangeRule { column: "Number_Ties_2_Dir", min: 0.0, max: 100.0, integer: true, required: false },
];

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum Issue {
    #[error("{column} is empty")]
    Missing { column: String },

    #[error("{column} is not a number: {value}")]
    NotNumeric { column: String, value: String },

    #[error("{column} must be a whole number, got {value}")]
    NotInteger { column: String, value: f64 },

    #[error("{column} = {value} is below {min}")]
    BelowMin { column: String, value: f64, min: f64 },

    #[error("{column} = {value} is above {max}")]
    AboveMax { column: String, value: f64, max: f64 },

    #[error("section name is {len} characters, limit 100")]
    NameTooLong { len: usize },

    #[error("section name '{name}' has characters outside A-Z a-z 0-9 _ - .")]
    NameCharacters { name: String },
}

/// Issues found on one row of the reinforcing table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRow {
    pub table: String,
    pub id: i64,
    pub name: Option<String>,
    pub issues: Vec<Issue>,
}

pub fn check_range(rule: &RangeRule, value: f64) -> std::result::Result<(), Issue> {
    let column = rule.column.to_string();
    if rule.integer && value.fract() != 0.0 {
        return Err(Issue::NotInteger { column, value });
    }
    if value < rule.min {
        return Err(Issue::BelowMin { column, value, min: rule.min });
    }
    if value > rule.max {
        return Err(Issue::AboveMax { column, value, max: rule.max });
    }
    Ok(())
}

/// A present section name must be short and use only `[A-Za-z0-9_.-]`.
pub fn check_section_name(name: Option<&str>) -> std::result::Result<(), Issue> {
    let name = name.map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Err(Issue::Missing {
            column: "Name".to_string(),
        });
    }
    let len = name.chars().count();
    if len > MAX_SECTION_NAME_LEN {
        return Err(Issue::NameTooLong { len });
    }
    if !SECTION_NAME_RE.is_match(name) {
        return Err(Issue::NameCharacters {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Read a stored cell as a number. Blank text counts as empty.
fn numeric(column: &str, value: &Value) -> std::result::Result<Option<f64>, Issue> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i as f64)),
        Value::Real(f) => Ok(Some(*f)),
        Value::Text(s) if s.trim().is_empty() => Ok(None),
        Value::Text(s) => s.trim().parse().map(Some).map_err(|_| Issue::NotNumeric {
            column: column.to_string(),
            value: s.clone(),
        }),
        Value::Blob(b) => Err(Issue::NotNumeric {
            column: column.to_string(),
            value: format!("<{} bytes>", b.len()),
        }),
    }
}

/// Every issue on one reinforcement row; `values` is keyed by column name.
pub fn check_reinforcement(name: Option<&str>, values: &BTreeMap<&str, Value>) -> Vec<Issue> {
    let mut issues = Vec::new();
    if let Err(issue) = check_section_name(name) {
        issues.push(issue);
    }

    for rule in &REINFORCEMENT_RANGES {
        let value = values.get(rule.column).unwrap_or(&Value::Null);
        match numeric(rule.column, value) {
            Ok(Some(v)) => {
                if let Err(issue) = check_range(rule, v) {
                    issues.push(issue);
                }
            }
            Ok(None) if rule.required => issues.push(Issue::Missing {
                column: rule.column.to_string(),
            }),
            Ok(None) => {}
            Err(issue) => issues.push(issue),
        }
    }
    issues
}

/// Check every row of the column reinforcing table in `store`.
pub fn check_reinforcing_table(store: &Store) -> Result<Vec<FlaggedRow>> {
    let table = tables::COLUMN_REINFORCING;
    if !store.table_exists(table)? {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT \"ID\", \"Name\", {} FROM {} ORDER BY \"ID\"",
        REINFORCEMENT_RANGES
            .iter()
            .map(|r| quote_ident(r.column))
            .collect::<Vec<_>>()
            .join(", "),
        quote_ident(table)
    );
    let mut stmt = store.connection().prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: Option<String> = row.get(1)?;
            let mut values = BTreeMap::new();
            for (i, rule) in REINFORCEMENT_RANGES.iter().enumerate() {
                values.insert(rule.column, row.get::<_, Value>(i + 2)?);
            }
            Ok((id, name, values))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let checked = rows.len();
    let mut flagged = Vec::new();
    for (id, name, values) in rows {
        let issues = check_reinforcement(name.as_deref(), &values);
        if issues.is_empty() {
            continue;
        }
        for issue in &issues {
            warn!(table, id, name = ?name, "{}", issue);
        }
        flagged.push(FlaggedRow {
            table: table.to_string(),
            id,
            name,
            issues,
        });
    }

    info!(table, checked, flagged = flagged.len(), "Reinforcement values checked");
    Ok(flagged)
}
