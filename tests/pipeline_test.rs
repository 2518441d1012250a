use std::path::Path;
use tempfile::tempdir;

use veda_migrate::db::{quote_ident, Store};
use veda_migrate::importer::{mapping, ImportStatus, Importer};
use veda_migrate::initializer::SchemaInitializer;
use veda_migrate::link::catalog::builtin_rules;
use veda_migrate::link::{LinkEngine, MemorySink, RuleOutcome};
use veda_migrate::query::QueryService;
use veda_migrate::schema::tables;

/// Build a source export with every mapped table, using the export's own column names.
fn build_source(path: &Path) {
    let store = Store::create(path).unwrap();
    let conn = store.connection();
    for (table, columns) in mapping::TABLE_MAPPINGS {
        let cols: Vec<String> = columns.iter().map(|(src, _)| quote_ident(src)).collect();
        conn.execute_batch(&format!(
            "CREATE TABLE {} ({});",
            quote_ident(table),
            cols.join(", ")
        ))
        .unwrap();
    }

    conn.execute_batch(
        r#"
        INSERT INTO "Story_Definitions" ("Tower", "Name", "Height", "Master Story")
            VALUES ('T1', 'Story1', 3.0, 'Yes'), ('T1', 'Story2', 6.0, 'No');
        INSERT INTO "Material_Properties_Concrete_Data" ("Material", "Fc") VALUES ('C30', 30.0);
        INSERT INTO "Material_Properties_Rebar_Data" ("Material", "Fy", "Fu") VALUES ('S400', 400.0, 500.0), ('S500', 500.0, 600.0);
        INSERT INTO "Load_Combination_Definitions" ("Name", "Type", "Is Auto", "Load Name", "SF")
            VALUES ('ULS1', 'Linear Add', 'No', 'Dead', 1.4);
        INSERT INTO "Frame_Section_Property_Definitions_Concrete_Rectangular" ("Name", "Material", "From File?", "Depth", "Width")
            VALUES ('COL40', 'C30', 'No', 0.4, 0.4), ('COL50', 'C30', 'No', 0.5, 0.5);
        INSERT INTO "Frame_Section_Property_Definitions_Concrete_Column_Reinforcing"
            ("Name", "Longitudinal Bar Material", "Tie Bar Material", "Is Designed?", "Number Bars 3-Dir")
            VALUES ('COL40', 'S500', 'S400', 'Yes', 4);
        INSERT INTO "Frame_Assignments_Section_Properties" ("Story", "Label", "UniqueName", "Section Property")
            VALUES ('Story1', 'C1', 12, 'COL40'), ('Story2', 'C1', 24, 'COL40');
        INSERT INTO "Column_Object_Connectivity" ("Unique Name", "Story", "UniquePtI", "UniquePtJ", "Length")
            VALUES (12, 'Story1', 1, 2, 3.0), (24, 'Story2', 2, 3, 3.0), (36, 'Story3', 3, 4, 3.0);
        INSERT INTO "Objects_and_Elements_Joints" ("Story", "Element Name", "Global Z")
            VALUES ('Story1', 1, 0.0), ('Story1', 2, 3.0), ('Story2', 3, 6.0);
        INSERT INTO "Element_Forces_Columns" ("Story", "Column", "Unique Name", "Output Case", "Station", "P", "M2", "M3")
            VALUES ('Story1', 'C1', 12, 'ULS1', 0.0, -500.0, 10.0, 20.0),
                   ('Story1', 'C1', 12, 'ULS1', 3.0, -480.0, 5.0, 25.0),
                   ('Story2', 'C1', 24, 'ULS1', 0.0, -250.0, 4.0, 3.0);
        "#,
    )
    .unwrap();
}

fn count(store: &Store, sql: &str) -> i64 {
    store.connection().query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn test_full_pipeline_create_import_link_query() {
    let dir = tempdir().unwrap();
    let source_path = dir.path().join("project.veda");
    let db_path = dir.path().join("out").join("structural.db");
    build_source(&source_path);

    let init = SchemaInitializer::new(&db_path, false).initialize().unwrap();
    assert_eq!(init.tables_created.len(), 11);

    let source = Store::open_read_only(&source_path).unwrap();
    let mut dest = Store::open_existing(&db_path).unwrap();
    let imported = Importer::new(&source, &mut dest).import_all().unwrap();
    assert!(imported
        .tables
        .iter()
        .all(|t| t.status == ImportStatus::Imported));
    assert_eq!(imported.total_failed(), 0);
    // The reinforcement row carries no tie size or spacing
    assert_eq!(imported.flagged.len(), 1);
    assert_eq!(imported.flagged[0].name.as_deref(), Some("COL40"));
    let flagged: Vec<String> = imported.flagged[0].issues.iter().map(|i| i.to_string()).collect();
    assert_eq!(flagged, vec!["Tie_Bar_Size is empty", "Tie_Bar_Spacing is empty"]);
    assert_eq!(
        count(&dest, r#"SELECT COUNT(*) FROM "Element_Forces_Columns" WHERE "ElementID" IS NOT NULL"#),
        0
    );

    let sink = MemorySink::new();
    let report = LinkEngine::new(&dest, &sink).run(&builtin_rules()).unwrap();

    assert!(report.failed_rules().is_empty(), "{}", report.render_summary());
    assert!(report.skipped_rules().is_empty(), "{}", report.render_summary());
    let stat = |key: &str| report.stats.get(key).copied().unwrap_or(usize::MAX);
    assert_eq!(stat("Material_Properties_Rebar_Data.GeneralID"), 2);
    assert_eq!(
        stat("Frame_Section_Property_Definitions_Concrete_Column_Reinforcing.Tie_Bar_MaterialID"),
        1
    );
    assert_eq!(stat("Frame_Section_Property_Definitions_Concrete_Rectangular.MaterialID"), 2);
    assert_eq!(stat("Frame_Assignments_Section_Properties.Section_PropertyID"), 2);
    assert_eq!(stat("Element_Forces_Columns.ElementID"), 3);
    assert_eq!(stat("Element_Forces_Columns.Load_case_id"), 3);
    assert_eq!(stat("Column_Object_Connectivity.ElementID"), 2);

    // Story3 and unique name 36 have no frame assignment
    assert_eq!(report.total_orphans(), 2);
    assert!(report
        .findings
        .iter()
        .any(|f| f.column == "Column_Object_Connectivity.Story" && f.value == "Story3"));
    assert!(report.integrity_violations.is_empty());
    assert!(dest.foreign_keys_enabled().unwrap());

    let q = QueryService::new(&dest);
    let force = q.governing_force("C1", "Story1").unwrap().unwrap();
    assert_eq!(force.p, Some(-500.0));
    let design = q.element_design(force.id).unwrap().unwrap();
    assert_eq!(design.assignment.unique_name, Some(12));
    assert_eq!(design.concrete.and_then(|c| c.fc), Some(30.0));
    let conn = q.column_connectivity(36).unwrap().unwrap();
    assert_eq!(conn.element_id, None);
    assert_eq!(
        q.story_by_name("Story1").unwrap().unwrap().master_story.as_deref(),
        Some("Yes")
    );
    assert_eq!(
        q.rebar_material("S400").unwrap().unwrap().general_id,
        Some(1)
    );

    // A second run changes nothing
    let again = LinkEngine::new(&dest, &sink).run(&builtin_rules()).unwrap();
    assert_eq!(again.total_updated(), 0);
    assert_eq!(again.total_orphans(), report.total_orphans());
    assert_eq!(again.fingerprint, report.fingerprint);
}

#[test]
fn test_pipeline_survives_missing_source_tables_and_reopen() {
    let dir = tempdir().unwrap();
    let source_path = dir.path().join("partial.veda");
    let db_path = dir.path().join("structural.db");
    {
        let store = Store::create(&source_path).unwrap();
        store
            .connection()
            .execute_batch(
                r#"
                CREATE TABLE "Material_Properties_Rebar_Data" ("Material" TEXT, "Fy" REAL);
                INSERT INTO "Material_Properties_Rebar_Data" VALUES ('S400', 400.0);
                "#,
            )
            .unwrap();
    }

    SchemaInitializer::new(&db_path, false).initialize().unwrap();
    let source = Store::open_read_only(&source_path).unwrap();
    let mut dest = Store::open_existing(&db_path).unwrap();
    let imported = Importer::new(&source, &mut dest).import_all().unwrap();
    assert_eq!(imported.total_inserted(), 1);
    assert_eq!(
        imported.table(tables::COLUMN_FORCES).unwrap().status,
        ImportStatus::MissingInSource
    );
    drop(dest);

    // Link in a fresh process-equivalent: reopen the file
    let dest = Store::open_existing(&db_path).unwrap();
    let sink = MemorySink::new();
    let report = LinkEngine::new(&dest, &sink).run(&builtin_rules()).unwrap();
    assert_eq!(report.total_updated(), 1);
    assert_eq!(
        report.outcome(22),
        Some(&RuleOutcome::Updated { rows: 1 })
    );
}

#[test]
fn test_link_against_missing_database_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(Store::open_existing(dir.path().join("absent.db")).is_err());
}
