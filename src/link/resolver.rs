//! Per-kind resolvers.
//!
//! Every fill is a single `UPDATE` restricted to rows whose source column is
//! NULL and that have a match, so re-running a rule touches nothing and the
//! returned count is the number of cells that actually received a value.
//! When several target rows match, the one with the lowest `rowid` wins.

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::db::{display_value, quote_ident, Store};
use crate::link::report::{Orphan, RuleOutcome};
use crate::link::rule::{ColumnPair, LinkAction, LinkRule};

/// Run one rule against `conn`.
pub fn apply(conn: &Connection, rule: &LinkRule) -> rusqlite::Result<RuleOutcome> {
    match &rule.action {
        LinkAction::Direct => Ok(RuleOutcome::Annotated),
        LinkAction::Validation => Ok(RuleOutcome::Validated {
            orphans: validate(conn, rule)?,
        }),
        LinkAction::IdFill { lookup } => {
            let rows = fill_by_join(conn, rule, std::slice::from_ref(lookup))?;
            Ok(RuleOutcome::Updated { rows })
        }
        LinkAction::IdFillComplex { join_on } => {
            let rows = fill_by_join(conn, rule, join_on)?;
            Ok(RuleOutcome::Updated { rows })
        }
        LinkAction::StaticId { value } => Ok(RuleOutcome::Updated {
            rows: fill_static(conn, rule, *value)?,
        }),
    }
}

/// `UPDATE` statement for a lookup fill over `pairs`.
///
/// Source join columns are required to be non-null explicitly: `NULL = NULL`
/// never matches anyway, but the intent reads off the statement.
pub fn fill_sql(rule: &LinkRule, pairs: &[ColumnPair]) -> String {
    let source = quote_ident(&rule.source.table);
    let fill = quote_ident(&rule.source.column);
    let target = quote_ident(&rule.target.table);
    let value = quote_ident(&rule.target.column);

    let mut predicate = pairs
        .iter()
        .map(|p| {
            format!(
                "t.{} = {}.{}",
                quote_ident(&p.target),
                source,
                quote_ident(&p.source)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    predicate.push_str(&format!(" AND t.{} IS NOT NULL", value));

    let key_present: String = pairs
        .iter()
        .map(|p| format!(" AND {}.{} IS NOT NULL", source, quote_ident(&p.source)))
        .collect();

    format!(
        "UPDATE {source} SET {fill} = \
         (SELECT t.{value} FROM {target} AS t WHERE {predicate} ORDER BY t.rowid LIMIT 1) \
         WHERE {source}.{fill} IS NULL{key_present} \
         AND EXISTS (SELECT 1 FROM {target} AS t WHERE {predicate})"
    )
}

fn fill_by_join(conn: &Connection, rule: &LinkRule, pairs: &[ColumnPair]) -> rusqlite::Result<usize> {
    let sql = fill_sql(rule, pairs);
    debug!(rule_id = rule.id, sql = %sql, "Executing fill");
    conn.execute(&sql, [])
}

fn fill_static(conn: &Connection, rule: &LinkRule, value: i64) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {} SET {col} = ?1 WHERE {col} IS NULL",
        quote_ident(&rule.source.table),
        col = quote_ident(&rule.source.column)
    );
    debug!(rule_id = rule.id, sql = %sql, value, "Executing static fill");
    conn.execute(&sql, params![value])
}

/// Distinct non-null source values without a match in the target column,
/// with the number of rows carrying each.
pub fn validate(conn: &Connection, rule: &LinkRule) -> rusqlite::Result<Vec<Orphan>> {
    let col = quote_ident(&rule.source.column);
    let sql = format!(
        "SELECT s.{col}, COUNT(*) FROM {source} AS s \
         WHERE s.{col} IS NOT NULL \
         AND NOT EXISTS (SELECT 1 FROM {target} AS t WHERE t.{tcol} = s.{col}) \
         GROUP BY s.{col} ORDER BY s.{col}",
        source = quote_ident(&rule.source.table),
        target = quote_ident(&rule.target.table),
        tcol = quote_ident(&rule.target.column),
    );
    let mut stmt = conn.prepare(&sql)?;
    let orphans = stmt
        .query_map([], |row| {
            let value: Value = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok(Orphan {
                value: display_value(&value),
                count: count as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(orphans)
}

/// Check a mutating rule against the store before anything runs.
///
/// Returns the reason to skip the rule, if any. The fill column must exist
/// and be nullable; a static rule's target table must hold exactly one row
/// and that row must carry the static value.
pub fn preflight(store: &Store, rule: &LinkRule) -> rusqlite::Result<Option<String>> {
    if !rule.is_mutating() {
        return Ok(None);
    }

    let columns = store.table_columns(&rule.source.table)?;
    if columns.is_empty() {
        return Ok(Some(format!("table {} does not exist", rule.source.table)));
    }
    match columns.iter().find(|c| c.name == rule.source.column) {
        None => return Ok(Some(format!("column {} does not exist", rule.source))),
        Some(c) if c.not_null => {
            return Ok(Some(format!("column {} is declared NOT NULL", rule.source)))
        }
        Some(_) => {}
    }

    if let LinkAction::StaticId { value } = rule.action {
        let rows = store.count_rows(&rule.target.table)?;
        if rows != 1 {
            return Ok(Some(format!(
                "static target {} must hold exactly one row, found {}",
                rule.target.table, rows
            )));
        }
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(&rule.target.table),
            quote_ident(&rule.target.column)
        );
        let matching: i64 = store
            .connection()
            .query_row(&sql, params![value], |row| row.get(0))?;
        if matching != 1 {
            return Ok(Some(format!(
                "static target {} has no row with value {}",
                rule.target, value
            )));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::rule::ColumnRef;

    fn rule(source: (&str, &str), target: (&str, &str), action: LinkAction) -> LinkRule {
        LinkRule {
            id: 1,
            priority: 1,
            source: ColumnRef::new(source.0, source.1),
            target: ColumnRef::new(target.0, target.1),
            action,
            note: None,
        }
    }

    fn reinforcing_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                r#"
                CREATE TABLE Rebar (ID INTEGER PRIMARY KEY, Material TEXT);
                CREATE TABLE Reinforcing (
                    ID INTEGER PRIMARY KEY,
                    Name TEXT,
                    Tie_Bar_Material TEXT,
                    Tie_Bar_MaterialID INTEGER
                );
                INSERT INTO Rebar (ID, Material) VALUES (7, 'S400'), (8, 'S500'), (9, 'S400');
                INSERT INTO Reinforcing (Name, Tie_Bar_Material, Tie_Bar_MaterialID) VALUES
                    ('C1', 'S400', NULL),
                    ('C2', 'S500', NULL),
                    ('C3', 'S999', NULL),
                    ('C4', NULL, NULL),
                    ('C5', 'S400', 42);
                "#,
            )
            .unwrap();
        store
    }

    fn tie_bar_rule() -> LinkRule {
        rule(
            ("Reinforcing", "Tie_Bar_MaterialID"),
            ("Rebar", "ID"),
            LinkAction::IdFill {
                lookup: ColumnPair::new("Tie_Bar_Material", "Material"),
            },
        )
    }

    fn material_ids(store: &Store) -> Vec<Option<i64>> {
        let mut stmt = store
            .connection()
            .prepare("SELECT Tie_Bar_MaterialID FROM Reinforcing ORDER BY ID")
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_id_fill_lowest_rowid_wins_and_only_matches_counted() {
        let store = reinforcing_store();
        let outcome = apply(store.connection(), &tie_bar_rule()).unwrap();
        assert_eq!(outcome, RuleOutcome::Updated { rows: 2 });
        assert_eq!(
            material_ids(&store),
            vec![Some(7), Some(8), None, None, Some(42)]
        );

        let again = apply(store.connection(), &tie_bar_rule()).unwrap();
        assert_eq!(again, RuleOutcome::Updated { rows: 0 });
    }

    #[test]
    fn test_fill_sql_quotes_identifiers() {
        let sql = fill_sql(
            &tie_bar_rule(),
            &[ColumnPair::new("Tie_Bar_Material", "Material")],
        );
        assert!(sql.starts_with(r#"UPDATE "Reinforcing" SET "Tie_Bar_MaterialID""#));
        assert!(sql.contains(r#"t."Material" = "Reinforcing"."Tie_Bar_Material""#));
        assert!(sql.contains("ORDER BY t.rowid LIMIT 1"));
    }

    #[test]
    fn test_static_fill_only_touches_nulls() {
        let store = reinforcing_store();
        let r = rule(
            ("Reinforcing", "Tie_Bar_MaterialID"),
            ("Rebar", "ID"),
            LinkAction::StaticId { value: 1 },
        );
        assert_eq!(
            apply(store.connection(), &r).unwrap(),
            RuleOutcome::Updated { rows: 4 }
        );
        assert_eq!(
            material_ids(&store),
            vec![Some(1), Some(1), Some(1), Some(1), Some(42)]
        );
    }

    #[test]
    fn test_validate_groups_orphans() {
        let store = reinforcing_store();
        store
            .connection()
            .execute(
                "INSERT INTO Reinforcing (Name, Tie_Bar_Material) VALUES ('C6', 'S999')",
                [],
            )
            .unwrap();
        let r = rule(
            ("Reinforcing", "Tie_Bar_Material"),
            ("Rebar", "Material"),
            LinkAction::Validation,
        );
        let orphans = validate(store.connection(), &r).unwrap();
        assert_eq!(
            orphans,
            vec![Orphan {
                value: "S999".into(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_preflight_rejects_missing_and_not_null_columns() {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch("CREATE TABLE S (A INTEGER NOT NULL, B INTEGER); CREATE TABLE T (id INTEGER);")
            .unwrap();
        let action = LinkAction::IdFill {
            lookup: ColumnPair::new("B", "id"),
        };
        let not_null = rule(("S", "A"), ("T", "id"), action.clone());
        assert!(preflight(&store, &not_null).unwrap().unwrap().contains("NOT NULL"));

        let missing = rule(("S", "Z"), ("T", "id"), action.clone());
        assert!(preflight(&store, &missing).unwrap().unwrap().contains("does not exist"));

        let no_table = rule(("Nope", "A"), ("T", "id"), action.clone());
        assert!(preflight(&store, &no_table).unwrap().is_some());

        let ok = rule(("S", "B"), ("T", "id"), action);
        assert_eq!(preflight(&store, &ok).unwrap(), None);
    }

    #[test]
    fn test_preflight_static_target_cardinality() {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch("CREATE TABLE S (G INTEGER); CREATE TABLE G (id INTEGER);")
            .unwrap();
        let r = rule(("S", "G"), ("G", "id"), LinkAction::StaticId { value: 1 });

        assert!(preflight(&store, &r).unwrap().unwrap().contains("found 0"));

        store.connection().execute("INSERT INTO G VALUES (2)", []).unwrap();
        assert!(preflight(&store, &r).unwrap().unwrap().contains("no row with value 1"));

        store.connection().execute("UPDATE G SET id = 1", []).unwrap();
        assert_eq!(preflight(&store, &r).unwrap(), None);

        store.connection().execute("INSERT INTO G VALUES (1)", []).unwrap();
        assert!(preflight(&store, &r).unwrap().unwrap().contains("found 2"));
    }
}
