//! Execution sequencer.
//!
//! Runs a rule set phase by phase against one store: static fills, direct
//! annotations, single-column fills, composite fills, then validation. Foreign
//! key enforcement is off while fills run and back on before validation.
//! A rule that errors is recorded and the run moves on; only errors that make
//! the store itself unusable end the run.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::db::{self, Store};
use crate::error::Result;
use crate::link::loader::RuleSet;
use crate::link::report::{Finding, ReportSink, RuleOutcome, RuleReport, RunReport};
use crate::link::resolver;
use crate::link::rule::{LinkPhase, LinkRule};

pub struct LinkEngine<'a> {
    store: &'a Store,
    sink: &'a dyn ReportSink,
}

#[derive(Default)]
struct RunState {
    rules: Vec<RuleReport>,
    stats: BTreeMap<String, usize>,
    findings: Vec<Finding>,
}

impl RunState {
    fn record(&mut self, rule: &LinkRule, outcome: RuleOutcome) {
        if rule.is_mutating() {
            *self.stats.entry(rule.source.to_string()).or_insert(0) += outcome.rows_updated();
        }
        if let RuleOutcome::Validated { orphans } = &outcome {
            for o in orphans {
                self.findings.push(Finding {
                    rule_id: rule.id,
                    column: rule.source.to_string(),
                    value: o.value.clone(),
                    count: o.count,
                });
            }
        }
        self.rules.push(RuleReport {
            rule_id: rule.id,
            kind: rule.kind(),
            phase: rule.phase(),
            column: rule.source.to_string(),
            outcome,
        });
    }
}

impl<'a> LinkEngine<'a> {
    pub fn new(store: &'a Store, sink: &'a dyn ReportSink) -> Self {
        Self { store, sink }
    }

    /// Apply every rule in `rules` and report what happened.
    pub fn run(&self, rules: &RuleSet) -> Result<RunReport> {
        self.execute(rules, true)
    }

    /// Run only the validation rules of `rules`; nothing is written.
    pub fn validate(&self, rules: &RuleSet) -> Result<RunReport> {
        self.execute(rules, false)
    }

    fn execute(&self, rules: &RuleSet, mutate: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("link_run", run_id = %run_id);
        let _enter = span.enter();

        info!(rules = rules.len(), fingerprint = %rules.fingerprint(), mutate, "Starting link run");

        let mut state = RunState::default();

        if mutate {
            self.store.set_foreign_keys(false)?;
            self.sink.integrity_toggled(false);

            if let Err(e) = self.apply_mutating(rules, &mut state) {
                // Enforcement goes back on even when the run aborts
                if let Err(restore) = self.store.set_foreign_keys(true) {
                    warn!(error = %restore, "Failed to re-enable foreign keys after fatal error");
                }
                return Err(e);
            }

            self.store.set_foreign_keys(true)?;
            self.sink.integrity_toggled(true);
        }

        self.apply_phase(rules, LinkPhase::ValidateLast, &HashMap::new(), &mut state)?;

        let integrity_violations = if mutate {
            match self.store.foreign_key_violations() {
                Ok(v) => v,
                Err(e) if db::is_fatal(&e) => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "Foreign key check failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            fingerprint: rules.fingerprint(),
            rules: state.rules,
            stats: state.stats,
            findings: state.findings,
            integrity_violations,
        };
        self.sink.run_finished(&report);
        Ok(report)
    }

    fn apply_mutating(&self, rules: &RuleSet, state: &mut RunState) -> Result<()> {
        // Preflight everything before the first write
        let mut decided = HashMap::new();
        for rule in rules.ordered().iter().filter(|r| r.is_mutating()) {
            match resolver::preflight(self.store, rule) {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    decided.insert(rule.id, RuleOutcome::Skipped { reason });
                }
                Err(e) if db::is_fatal(&e) => return Err(e.into()),
                Err(e) => {
                    decided.insert(
                        rule.id,
                        RuleOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        for phase in [
            LinkPhase::StaticFirst,
            LinkPhase::Annotate,
            LinkPhase::IdFillSingle,
            LinkPhase::IdFillComposite,
        ] {
            self.apply_phase(rules, phase, &decided, state)?;
        }
        Ok(())
    }

    fn apply_phase(
        &self,
        rules: &RuleSet,
        phase: LinkPhase,
        decided: &HashMap<u32, RuleOutcome>,
        state: &mut RunState,
    ) -> Result<()> {
        let in_phase: Vec<&LinkRule> = rules
            .ordered()
            .iter()
            .filter(|r| r.phase() == phase)
            .collect();
        if in_phase.is_empty() {
            return Ok(());
        }
        self.sink.phase_started(phase, in_phase.len());

        for rule in in_phase {
            let outcome = match decided.get(&rule.id) {
                Some(outcome) => outcome.clone(),
                None => self.apply_rule(rule)?,
            };
            self.sink.rule_finished(rule, &outcome);
            state.record(rule, outcome);
        }
        Ok(())
    }

    fn apply_rule(&self, rule: &LinkRule) -> Result<RuleOutcome> {
        match resolver::apply(self.store.connection(), rule) {
            Ok(outcome) => Ok(outcome),
            Err(e) if db::is_fatal(&e) => Err(e.into()),
            Err(e) => Ok(RuleOutcome::Failed {
                error: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::report::{MemorySink, Orphan, SinkEvent};
    use crate::link::rule::{ColumnPair, ColumnRef, LinkAction, RuleKind};

    fn rule(id: u32, priority: i32, source: (&str, &str), target: (&str, &str), action: LinkAction) -> LinkRule {
        LinkRule {
            id,
            priority,
            source: ColumnRef::new(source.0, source.1),
            target: ColumnRef::new(target.0, target.1),
            action,
            note: None,
        }
    }

    const FIXTURE_SQL: &str = r#"
                CREATE TABLE General (id INTEGER PRIMARY KEY);
                CREATE TABLE Rebar (ID INTEGER PRIMARY KEY, Material TEXT UNIQUE, GeneralID INTEGER REFERENCES General (id));
                CREATE TABLE Reinforcing (
                    ID INTEGER PRIMARY KEY,
                    Name TEXT,
                    Tie_Bar_Material TEXT,
                    Tie_Bar_MaterialID INTEGER REFERENCES Rebar (ID)
                );
                CREATE TABLE Assignments (ID INTEGER PRIMARY KEY, UniqueName INTEGER, Story TEXT, Label TEXT);
                CREATE TABLE Forces (
                    ID INTEGER PRIMARY KEY,
                    Unique_Name INTEGER,
                    Story TEXT,
                    ElementID INTEGER REFERENCES Assignments (ID)
                );
                INSERT INTO General (id) VALUES (1);
                INSERT INTO Rebar (ID, Material) VALUES (7, 'S400');
                INSERT INTO Reinforcing (Name, Tie_Bar_Material) VALUES ('C1', 'S400');
                INSERT INTO Assignments (ID, UniqueName, Story, Label) VALUES
                    (99, 12, 'L1', 'C1'),
                    (100, 12, 'L2', 'C1');
                INSERT INTO Forces (Unique_Name, Story) VALUES
                    (12, 'L1'),
                    (12, 'L2'),
                    (12, NULL),
                    (13, 'L1');
                "#;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.connection().execute_batch(FIXTURE_SQL).unwrap();
        store
    }

    fn rules() -> RuleSet {
        RuleSet::new(vec![
            rule(
                14,
                2,
                ("Reinforcing", "Tie_Bar_MaterialID"),
                ("Rebar", "ID"),
                LinkAction::IdFill {
                    lookup: ColumnPair::new("Tie_Bar_Material", "Material"),
                },
            ),
            rule(
                20,
                3,
                ("Forces", "ElementID"),
                ("Assignments", "ID"),
                LinkAction::IdFillComplex {
                    join_on: vec![
                        ColumnPair::new("Unique_Name", "UniqueName"),
                        ColumnPair::new("Story", "Story"),
                    ],
                },
            ),
            rule(22, 1, ("Rebar", "GeneralID"), ("General", "id"), LinkAction::StaticId { value: 1 }),
            rule(2, 1, ("Reinforcing", "Tie_Bar_Material"), ("Rebar", "Material"), LinkAction::Direct),
            rule(11, 1, ("Forces", "Unique_Name"), ("Assignments", "UniqueName"), LinkAction::Validation),
        ])
        .unwrap()
    }

    fn element_ids(store: &Store) -> Vec<Option<i64>> {
        let mut stmt = store
            .connection()
            .prepare("SELECT ElementID FROM Forces ORDER BY ID")
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_run_resolves_every_kind() {
        let store = store();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink).run(&rules()).unwrap();

        let tie: Option<i64> = store
            .connection()
            .query_row("SELECT Tie_Bar_MaterialID FROM Reinforcing", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tie, Some(7));
        assert_eq!(element_ids(&store), vec![Some(99), Some(100), None, None]);

        assert_eq!(report.stats["Reinforcing.Tie_Bar_MaterialID"], 1);
        assert_eq!(report.stats["Forces.ElementID"], 2);
        assert_eq!(report.stats["Rebar.GeneralID"], 1);
        assert_eq!(report.total_updated(), 4);
        assert_eq!(report.outcome(2), Some(&RuleOutcome::Annotated));
        assert_eq!(
            report.outcome(11),
            Some(&RuleOutcome::Validated {
                orphans: vec![Orphan {
                    value: "13".into(),
                    count: 1
                }]
            })
        );
        assert_eq!(report.total_orphans(), 1);
        assert!(report.integrity_violations.is_empty());
        assert!(store.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_execution_order_and_integrity_toggle() {
        let store = store();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink).run(&rules()).unwrap();

        let ids: Vec<u32> = report.rules.iter().map(|r| r.rule_id).collect();
        assert_eq!(ids, vec![22, 2, 14, 20, 11]);

        let events = sink.events();
        assert_eq!(events.first(), Some(&SinkEvent::Integrity(false)));
        let enabled_at = events
            .iter()
            .position(|e| e == &SinkEvent::Integrity(true))
            .unwrap();
        let validation_at = events
            .iter()
            .position(|e| e == &SinkEvent::Phase(LinkPhase::ValidateLast))
            .unwrap();
        let composite_at = events
            .iter()
            .position(|e| matches!(e, SinkEvent::Rule(20, _)))
            .unwrap();
        assert!(composite_at < enabled_at && enabled_at < validation_at);
        assert_eq!(events.last(), Some(&SinkEvent::Finished));
    }

    #[test]
    fn test_second_run_updates_nothing() {
        let store = store();
        let sink = MemorySink::new();
        let engine = LinkEngine::new(&store, &sink);
        let first = engine.run(&rules()).unwrap();
        let after_first = element_ids(&store);
        let second = engine.run(&rules()).unwrap();

        assert_eq!(first.total_updated(), 4);
        assert_eq!(second.total_updated(), 0);
        assert_eq!(element_ids(&store), after_first);
        assert_eq!(second.stats.len(), first.stats.len());
        assert_eq!(second.total_orphans(), first.total_orphans());
    }

    #[test]
    fn test_resolved_values_never_overwritten() {
        let store = store();
        store.set_foreign_keys(false).unwrap();
        store
            .connection()
            .execute("UPDATE Forces SET ElementID = 5 WHERE Story = 'L1' AND Unique_Name = 12", [])
            .unwrap();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink).run(&rules()).unwrap();

        assert_eq!(element_ids(&store), vec![Some(5), Some(100), None, None]);
        assert_eq!(report.stats["Forces.ElementID"], 1);
        // 5 is not an Assignments ID
        assert_eq!(report.integrity_violations.len(), 1);
        assert_eq!(report.integrity_violations[0].table, "Forces");
    }

    #[test]
    fn test_unwritable_store_aborts_with_enforcement_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.db");
        {
            let store = Store::create(&path).unwrap();
            store.connection().execute_batch(FIXTURE_SQL).unwrap();
        }
        let store = Store::open_read_only(&path).unwrap();
        let sink = MemorySink::new();
        let result = LinkEngine::new(&store, &sink).run(&rules());

        assert!(result.is_err());
        assert!(store.foreign_keys_enabled().unwrap());
        assert!(!sink.events().contains(&SinkEvent::Finished));
        assert!(!sink.events().contains(&SinkEvent::Integrity(true)));
    }

    #[test]
    fn test_failing_rule_does_not_stop_the_run() {
        let store = store();
        let mut all = rules().ordered().to_vec();
        all.push(rule(
            15,
            1,
            ("Reinforcing", "Tie_Bar_MaterialID"),
            ("Rebar", "ID"),
            LinkAction::IdFill {
                lookup: ColumnPair::new("No_Such_Column", "Material"),
            },
        ));
        let set = RuleSet::new(all).unwrap();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink).run(&set).unwrap();

        assert!(matches!(report.outcome(15), Some(RuleOutcome::Failed { .. })));
        assert_eq!(report.failed_rules(), vec![15]);
        assert_eq!(report.stats["Forces.ElementID"], 2);
        assert_eq!(report.stats["Reinforcing.Tie_Bar_MaterialID"], 1);
        assert!(store.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_static_rule_skipped_when_target_has_several_rows() {
        let store = store();
        store
            .connection()
            .execute("INSERT INTO General (id) VALUES (2)", [])
            .unwrap();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink).run(&rules()).unwrap();

        assert!(matches!(report.outcome(22), Some(RuleOutcome::Skipped { .. })));
        assert_eq!(report.stats["Rebar.GeneralID"], 0);
        assert_eq!(store.count_nulls("Rebar", "GeneralID").unwrap(), 1);
        assert_eq!(report.skipped_rules(), vec![22]);
    }

    #[test]
    fn test_validate_only_writes_nothing() {
        let store = store();
        let sink = MemorySink::new();
        let report = LinkEngine::new(&store, &sink)
            .validate(&rules().only(RuleKind::Validation))
            .unwrap();

        assert_eq!(report.rules.len(), 1);
        assert!(report.stats.is_empty());
        assert_eq!(report.total_orphans(), 1);
        assert_eq!(element_ids(&store), vec![None, None, None, None]);
        assert!(!sink.events().iter().any(|e| matches!(e, SinkEvent::Integrity(_))));
    }

    #[test]
    fn test_same_final_state_across_fresh_engines() {
        let a = store();
        let b = store();
        let sink = MemorySink::new();
        LinkEngine::new(&a, &sink).run(&rules()).unwrap();
        LinkEngine::new(&b, &sink).run(&rules()).unwrap();
        LinkEngine::new(&b, &sink).run(&rules()).unwrap();
        assert_eq!(element_ids(&a), element_ids(&b));
    }
}
