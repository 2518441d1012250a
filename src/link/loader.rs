//! Rule files and rule sets.
//!
//! Rule files hold loosely-typed `[[rule]]` records. Each record is validated
//! into a [`LinkRule`] before anything runs; a record with fields that do not
//! belong to its kind is rejected instead of being silently ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::link::rule::{ColumnPair, ColumnRef, LinkAction, LinkRule, RuleKind};

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JoinOnDef {
    pub source: Vec<String>,
    pub target: Vec<String>,
}

/// One `[[rule]]` record as written in a rule file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub id: u32,
    pub kind: RuleKind,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_column: Option<String>,
    /// Column in the target table compared with `lookup_column`; defaults to the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lookup_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_on: Option<JoinOnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDef>,
}

fn check_ident(id: u32, field: &str, value: &str) -> Result<()> {
    if IDENT_RE.is_match(value) {
        Ok(())
    } else {
        Err(MigrateError::invalid_rule(
            id,
            format!("{} '{}' is not a valid identifier", field, value),
        ))
    }
}

fn reject_field(id: u32, kind: RuleKind, field: &str, present: bool) -> Result<()> {
    if present {
        Err(MigrateError::invalid_rule(
            id,
            format!("field '{}' is not allowed for {} rules", field, kind),
        ))
    } else {
        Ok(())
    }
}

impl TryFrom<RuleDef> for LinkRule {
    type Error = MigrateError;

    fn try_from(def: RuleDef) -> Result<Self> {
        let id = def.id;
        let kind = def.kind;
        check_ident(id, "source_table", &def.source_table)?;
        check_ident(id, "source_column", &def.source_column)?;
        check_ident(id, "target_table", &def.target_table)?;
        check_ident(id, "target_column", &def.target_column)?;

        let has_lookup = def.lookup_column.is_some() || def.target_lookup_column.is_some();
        let has_join = def.join_on.is_some() || def.lookup_columns.is_some();
        let has_static = def.static_value.is_some();

        let action = match kind {
            RuleKind::Direct | RuleKind::Validation => {
                reject_field(id, kind, "lookup_column", has_lookup)?;
                reject_field(id, kind, "join_on", has_join)?;
                reject_field(id, kind, "static_value", has_static)?;
                if kind == RuleKind::Direct {
                    LinkAction::Direct
                } else {
                    LinkAction::Validation
                }
            }
            RuleKind::IdFill => {
                reject_field(id, kind, "join_on", has_join)?;
                reject_field(id, kind, "static_value", has_static)?;
                let source = def.lookup_column.ok_or_else(|| {
                    MigrateError::invalid_rule(id, "id_fill rules require lookup_column")
                })?;
                let target = def.target_lookup_column.unwrap_or_else(|| source.clone());
                check_ident(id, "lookup_column", &source)?;
                check_ident(id, "target_lookup_column", &target)?;
                LinkAction::IdFill {
                    lookup: ColumnPair { source, target },
                }
            }
            RuleKind::IdFillComplex => {
                reject_field(id, kind, "lookup_column", has_lookup)?;
                reject_field(id, kind, "static_value", has_static)?;
                let join = def.join_on.ok_or_else(|| {
                    MigrateError::invalid_rule(id, "id_fill_complex rules require join_on")
                })?;
                if join.source.is_empty() {
                    return Err(MigrateError::invalid_rule(id, "join_on must not be empty"));
                }
                if join.source.len() != join.target.len() {
                    return Err(MigrateError::invalid_rule(
                        id,
                        format!(
                            "join_on lists differ in length ({} source, {} target)",
                            join.source.len(),
                            join.target.len()
                        ),
                    ));
                }
                if let Some(lookup_columns) = &def.lookup_columns {
                    if lookup_columns != &join.source {
                        return Err(MigrateError::invalid_rule(
                            id,
                            "lookup_columns must equal join_on.source",
                        ));
                    }
                }
                let mut join_on = Vec::with_capacity(join.source.len());
                for (source, target) in join.source.into_iter().zip(join.target) {
                    check_ident(id, "join_on.source", &source)?;
                    check_ident(id, "join_on.target", &target)?;
                    join_on.push(ColumnPair { source, target });
                }
                LinkAction::IdFillComplex { join_on }
            }
            RuleKind::StaticId => {
                reject_field(id, kind, "lookup_column", has_lookup)?;
                reject_field(id, kind, "join_on", has_join)?;
                let value = def.static_value.ok_or_else(|| {
                    MigrateError::invalid_rule(id, "static_id rules require static_value")
                })?;
                LinkAction::StaticId { value }
            }
        };

        Ok(LinkRule {
            id,
            priority: def.priority,
            source: ColumnRef::new(def.source_table, def.source_column),
            target: ColumnRef::new(def.target_table, def.target_column),
            action,
            note: def.note,
        })
    }
}

impl From<&LinkRule> for RuleDef {
    fn from(rule: &LinkRule) -> Self {
        let mut def = RuleDef {
            id: rule.id,
            kind: rule.kind(),
            source_table: rule.source.table.clone(),
            source_column: rule.source.column.clone(),
            target_table: rule.target.table.clone(),
            target_column: rule.target.column.clone(),
            priority: rule.priority,
            lookup_column: None,
            target_lookup_column: None,
            lookup_columns: None,
            join_on: None,
            static_value: None,
            note: rule.note.clone(),
        };
        match &rule.action {
            LinkAction::Direct | LinkAction::Validation => {}
            LinkAction::IdFill { lookup } => {
                def.lookup_column = Some(lookup.source.clone());
                if lookup.target != lookup.source {
                    def.target_lookup_column = Some(lookup.target.clone());
                }
            }
            LinkAction::IdFillComplex { join_on } => {
                def.join_on = Some(JoinOnDef {
                    source: join_on.iter().map(|p| p.source.clone()).collect(),
                    target: join_on.iter().map(|p| p.target.clone()).collect(),
                });
            }
            LinkAction::StaticId { value } => def.static_value = Some(*value),
        }
        def
    }
}

/// Rule counts per kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub total: usize,
    pub by_kind: BTreeMap<RuleKind, usize>,
    /// Distinct source tables
    pub tables_involved: usize,
}

/// A validated rule set, held in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<LinkRule>,
}

impl RuleSet {
    /// Build a rule set; ids must be unique.
    pub fn new(mut rules: Vec<LinkRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id) {
                return Err(MigrateError::DuplicateRuleId(rule.id));
            }
        }
        rules.sort_by_key(|r| r.sort_key());
        Ok(Self { rules })
    }

    /// Rule ids in a compiled-in catalog are unique by construction
    pub(crate) fn from_catalog(mut rules: Vec<LinkRule>) -> Self {
        rules.sort_by_key(|r| r.sort_key());
        Self { rules }
    }

    pub fn from_defs(defs: Vec<RuleDef>) -> Result<Self> {
        let rules = defs
            .into_iter()
            .map(LinkRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::new(rules)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(content)?;
        Self::from_defs(file.rules)
    }

    pub fn load_toml(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!(
                "Failed to read rules file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let set = Self::from_toml_str(&content)?;
        info!(path = %path.display(), rules = set.len(), "Loaded link rules");
        Ok(set)
    }

    /// Rules from `path` when given, otherwise the built-in catalog
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_toml(p),
            None => {
                debug!("Using built-in link rules");
                Ok(crate::link::catalog::builtin_rules())
            }
        }
    }

    /// Render as a rule file
    pub fn to_toml_string(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Out {
            rule: Vec<RuleDef>,
        }
        let out = Out {
            rule: self.rules.iter().map(RuleDef::from).collect(),
        };
        toml::to_string(&out).map_err(|e| MigrateError::Config(e.to_string()))
    }

    /// Rules in execution order
    pub fn ordered(&self) -> &[LinkRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&LinkRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn by_kind(&self, kind: RuleKind) -> Vec<&LinkRule> {
        self.rules.iter().filter(|r| r.kind() == kind).collect()
    }

    pub fn by_source_table(&self, table: &str) -> Vec<&LinkRule> {
        self.rules.iter().filter(|r| r.source.table == table).collect()
    }

    pub fn by_target_table(&self, table: &str) -> Vec<&LinkRule> {
        self.rules.iter().filter(|r| r.target.table == table).collect()
    }

    /// Subset holding only the rules of `kind`
    pub fn only(&self, kind: RuleKind) -> RuleSet {
        RuleSet {
            rules: self
                .rules
                .iter()
                .filter(|r| r.kind() == kind)
                .cloned()
                .collect(),
        }
    }

    /// Tables in the order they are touched, each target before its source
    pub fn ordered_tables(&self) -> Vec<&str> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for rule in &self.rules {
            for table in [rule.target.table.as_str(), rule.source.table.as_str()] {
                if seen.insert(table) {
                    order.push(table);
                }
            }
        }
        order
    }

    pub fn summary(&self) -> RuleSummary {
        let mut by_kind: BTreeMap<RuleKind, usize> =
            RuleKind::ALL.iter().map(|k| (*k, 0)).collect();
        for rule in &self.rules {
            *by_kind.entry(rule.kind()).or_insert(0) += 1;
        }
        let tables: HashSet<&str> = self.rules.iter().map(|r| r.source.table.as_str()).collect();
        RuleSummary {
            total: self.rules.len(),
            by_kind,
            tables_involved: tables.len(),
        }
    }

    /// SHA-256 over the canonical rule descriptions in execution order.
    /// Notes do not contribute.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for rule in &self.rules {
            hasher.update(rule.describe().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[rule]]
        id = 2
        kind = "id_fill"
        source_table = "Reinforcing"
        source_column = "Tie_Bar_MaterialID"
        target_table = "Rebar"
        target_column = "ID"
        priority = 2
        lookup_column = "Tie_Bar_Material"
        target_lookup_column = "Material"

        [[rule]]
        id = 1
        kind = "static_id"
        source_table = "Rebar"
        source_column = "GeneralID"
        target_table = "General_Input"
        target_column = "id"
        static_value = 1

        [[rule]]
        id = 3
        kind = "id_fill_complex"
        source_table = "Forces"
        source_column = "ElementID"
        target_table = "Assignments"
        target_column = "ID"
        lookup_columns = ["Unique_Name", "Story"]
        join_on = { source = ["Unique_Name", "Story"], target = ["UniqueName", "Story"] }

        [[rule]]
        id = 4
        kind = "validation"
        source_table = "Forces"
        source_column = "Story"
        target_table = "Assignments"
        target_column = "Story"
    "#;

    fn def(kind: RuleKind) -> RuleDef {
        RuleDef {
            id: 7,
            kind,
            source_table: "S".into(),
            source_column: "sc".into(),
            target_table: "T".into(),
            target_column: "tc".into(),
            priority: 1,
            lookup_column: None,
            target_lookup_column: None,
            lookup_columns: None,
            join_on: None,
            static_value: None,
            note: None,
        }
    }

    #[test]
    fn test_parse_sample_in_execution_order() {
        let set = RuleSet::from_toml_str(SAMPLE).unwrap();
        let ids: Vec<u32> = set.ordered().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let fill = set.get(2).unwrap();
        assert_eq!(
            fill.action,
            LinkAction::IdFill {
                lookup: ColumnPair::new("Tie_Bar_Material", "Material")
            }
        );
        assert_eq!(set.get(1).unwrap().priority, 1);
    }

    #[test]
    fn test_target_lookup_defaults_to_lookup_column() {
        let mut d = def(RuleKind::IdFill);
        d.lookup_column = Some("Name".into());
        let rule = LinkRule::try_from(d).unwrap();
        assert_eq!(
            rule.action,
            LinkAction::IdFill {
                lookup: ColumnPair::new("Name", "Name")
            }
        );
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        for kind in [RuleKind::IdFill, RuleKind::IdFillComplex, RuleKind::StaticId] {
            let err = LinkRule::try_from(def(kind)).unwrap_err();
            assert!(matches!(err, MigrateError::InvalidRule { id: 7, .. }), "{}", kind);
        }
    }

    #[test]
    fn test_foreign_fields_rejected() {
        let mut d = def(RuleKind::Validation);
        d.static_value = Some(1);
        assert!(LinkRule::try_from(d).is_err());

        let mut d = def(RuleKind::StaticId);
        d.static_value = Some(1);
        d.lookup_column = Some("Name".into());
        assert!(LinkRule::try_from(d).is_err());
    }

    #[test]
    fn test_join_on_shape_checked() {
        let mut d = def(RuleKind::IdFillComplex);
        d.join_on = Some(JoinOnDef {
            source: vec!["a".into(), "b".into()],
            target: vec!["x".into()],
        });
        assert!(LinkRule::try_from(d).is_err());

        let mut d = def(RuleKind::IdFillComplex);
        d.join_on = Some(JoinOnDef {
            source: vec![],
            target: vec![],
        });
        assert!(LinkRule::try_from(d).is_err());

        let mut d = def(RuleKind::IdFillComplex);
        d.join_on = Some(JoinOnDef {
            source: vec!["a".into()],
            target: vec!["x".into()],
        });
        d.lookup_columns = Some(vec!["b".into()]);
        assert!(LinkRule::try_from(d).is_err());
    }

    #[test]
    fn test_bad_identifier_rejected() {
        let mut d = def(RuleKind::Direct);
        d.source_column = "Name; DROP TABLE x".into();
        let err = LinkRule::try_from(d).unwrap_err();
        assert!(err.to_string().contains("not a valid identifier"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = LinkRule::try_from(def(RuleKind::Direct)).unwrap();
        let b = a.clone();
        assert!(matches!(
            RuleSet::new(vec![a, b]),
            Err(MigrateError::DuplicateRuleId(7))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = r#"
            [[rule]]
            id = 1
            kind = "direct"
            source_table = "S"
            source_column = "sc"
            target_table = "T"
            target_column = "tc"
            purpose = "check"
        "#;
        assert!(matches!(
            RuleSet::from_toml_str(content),
            Err(MigrateError::Toml(_))
        ));
    }

    #[test]
    fn test_helpers_and_summary() {
        let set = RuleSet::from_toml_str(SAMPLE).unwrap();
        assert_eq!(set.by_kind(RuleKind::IdFill).len(), 1);
        assert_eq!(set.by_source_table("Forces").len(), 2);
        assert_eq!(set.by_target_table("Assignments").len(), 2);
        assert_eq!(
            set.ordered_tables(),
            vec!["General_Input", "Rebar", "Reinforcing", "Assignments", "Forces"]
        );

        let summary = set.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.by_kind[&RuleKind::Direct], 0);
        assert_eq!(summary.by_kind[&RuleKind::StaticId], 1);
        assert_eq!(summary.tables_involved, 3);

        let validation = set.only(RuleKind::Validation);
        assert_eq!(validation.len(), 1);
    }

    #[test]
    fn test_fingerprint_survives_toml_rendering() {
        let set = RuleSet::from_toml_str(SAMPLE).unwrap();
        let rendered = set.to_toml_string().unwrap();
        let reparsed = RuleSet::from_toml_str(&rendered).unwrap();
        assert_eq!(set, reparsed);
        assert_eq!(set.fingerprint().len(), 64);
        assert_eq!(set.fingerprint(), reparsed.fingerprint());
    }
}
