//! Static definition of the normalized structural schema.
//!
//! Eleven tables keyed by surrogate `ID`s. Every `...ID` column is nullable:
//! rows are imported with them empty and the link engine fills them in.
//! Foreign keys are declared only where the parent column is a primary key or
//! `UNIQUE`; relationships to non-unique parents (story/unique-name pairs on
//! frame assignments, joint element names) are checked by validation rules
//! instead.

use once_cell::sync::Lazy;
use regex::Regex;

/// Table names of the normalized schema
pub mod tables {
    pub const STORY_DEFINITIONS: &str = "Story_Definitions";
    pub const JOINTS: &str = "Objects_and_Elements_Joints";
    pub const COLUMN_CONNECTIVITY: &str = "Column_Object_Connectivity";
    pub const CONCRETE_MATERIALS: &str = "Material_Properties_Concrete_Data";
    pub const REBAR_MATERIALS: &str = "Material_Properties_Rebar_Data";
    pub const COLUMN_REINFORCING: &str =
        "Frame_Section_Property_Definitions_Concrete_Column_Reinforcing";
    pub const RECTANGULAR_SECTIONS: &str =
        "Frame_Section_Property_Definitions_Concrete_Rectangular";
    pub const FRAME_ASSIGNMENTS: &str = "Frame_Assignments_Section_Properties";
    pub const LOAD_COMBINATIONS: &str = "Load_Combination_Definitions";
    pub const COLUMN_FORCES: &str = "Element_Forces_Columns";
    pub const GENERAL_INPUT: &str = "General_Input";
}

/// All tables of the normalized schema, parents before children
pub const NEW_TABLES: [&str; 11] = [
    tables::GENERAL_INPUT,
    tables::STORY_DEFINITIONS,
    tables::JOINTS,
    tables::CONCRETE_MATERIALS,
    tables::REBAR_MATERIALS,
    tables::RECTANGULAR_SECTIONS,
    tables::COLUMN_REINFORCING,
    tables::FRAME_ASSIGNMENTS,
    tables::COLUMN_CONNECTIVITY,
    tables::LOAD_COMBINATIONS,
    tables::COLUMN_FORCES,
];

pub const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "General_Input" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Knowledge_Factor" INTEGER,
    "Concrete_Strength_Factor_Lambda_c" REAL DEFAULT 1.5,
    "Steel_Strength_Factor_Lambda_s" REAL DEFAULT 1.25,
    "Performance_Level" TEXT,
    "Safety_Factor_Phi" REAL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS "Story_Definitions" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Tower" TEXT,
    "Name" TEXT NOT NULL UNIQUE,
    "Height" REAL,
    "Master_Story" TEXT,
    "Similar_To" TEXT,
    "Splice_Story" TEXT,
    "Splice_Height" REAL,
    "Color" TEXT,
    "GUID" TEXT,
    "Notes" TEXT
);

CREATE TABLE IF NOT EXISTS "Objects_and_Elements_Joints" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Story" TEXT,
    "Element_Name" INTEGER,
    "Object_Type" TEXT,
    "Object_Label" TEXT,
    "Object_Name" REAL,
    "Global_X" REAL,
    "Global_Y" REAL,
    "Global_Z" REAL,
    FOREIGN KEY ("Story") REFERENCES "Story_Definitions" ("Name")
);

CREATE TABLE IF NOT EXISTS "Material_Properties_Concrete_Data" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Material" TEXT UNIQUE,
    "Fc" REAL,
    "LtWtConc" TEXT,
    "IsUserFr" TEXT,
    "SSCurveOpt" TEXT,
    "SSHysType" TEXT,
    "SFc" REAL,
    "SCap" REAL,
    "FinalSlope" REAL,
    "FAngle" INTEGER,
    "DAngle" INTEGER
);

CREATE TABLE IF NOT EXISTS "Material_Properties_Rebar_Data" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Material" TEXT UNIQUE,
    "Fy" REAL,
    "Fu" REAL,
    "Fye" REAL,
    "Fue" REAL,
    "SSCurveOpt" TEXT,
    "SSHysType" TEXT,
    "SHard" REAL,
    "SCap" REAL,
    "FinalSlope" REAL,
    "GeneralID" INTEGER,
    FOREIGN KEY ("GeneralID") REFERENCES "General_Input" ("id")
);

CREATE TABLE IF NOT EXISTS "Frame_Section_Property_Definitions_Concrete_Rectangular" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Name" TEXT UNIQUE,
    "Material" TEXT,
    "From_File" TEXT,
    "Depth" REAL,
    "Width" REAL,
    "Rigid_Zone" TEXT,
    "Notional_Size_Type" TEXT,
    "Notional_Auto_Factor" REAL,
    "Design_Type" TEXT,
    "Area_Modifier" REAL,
    "As2_Modifier" REAL,
    "As3_Modifier" REAL,
    "J_Modifier" REAL,
    "I22_Modifier" REAL,
    "I33_Modifier" REAL,
    "Mass_Modifier" REAL,
    "Weight_Modifier" REAL,
    "Color" TEXT,
    "GUID" TEXT,
    "Notes" TEXT,
    "MaterialID" INTEGER,
    FOREIGN KEY ("Material") REFERENCES "Material_Properties_Concrete_Data" ("Material"),
    FOREIGN KEY ("MaterialID") REFERENCES "Material_Properties_Concrete_Data" ("ID")
);

CREATE TABLE IF NOT EXISTS "Frame_Section_Property_Definitions_Concrete_Column_Reinforcing" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Name" TEXT UNIQUE,
    "Longitudinal_Bar_Material" TEXT,
    "Tie_Bar_Material" TEXT,
    "Reinforcement_Configuration" TEXT,
    "Is_Designed" TEXT,
    "Clear_Cover_to_Ties" REAL,
    "Number_Bars_3_Dir" INTEGER,
    "Number_Bars_2_Dir" INTEGER,
    "Longitudinal_Bar_Size" REAL,
    "Corner_Bar_Size" REAL,
    "Tie_Bar_Size" REAL,
    "Tie_Bar_Spacing" REAL,
    "Number_Ties_3_Dir" INTEGER,
    "Number_Ties_2_Dir" INTEGER,
    "Longitudinal_Bar_MaterialID" INTEGER,
    "Tie_Bar_MaterialID" INTEGER,
    "NameID" INTEGER,
    FOREIGN KEY ("Longitudinal_Bar_Material") REFERENCES "Material_Properties_Rebar_Data" ("Material"),
    FOREIGN KEY ("Tie_Bar_Material") REFERENCES "Material_Properties_Rebar_Data" ("Material"),
    FOREIGN KEY ("Name") REFERENCES "Frame_Section_Property_Definitions_Concrete_Rectangular" ("Name"),
    FOREIGN KEY ("Longitudinal_Bar_MaterialID") REFERENCES "Material_Properties_Rebar_Data" ("ID"),
    FOREIGN KEY ("Tie_Bar_MaterialID") REFERENCES "Material_Properties_Rebar_Data" ("ID"),
    FOREIGN KEY ("NameID") REFERENCES "Frame_Section_Property_Definitions_Concrete_Rectangular" ("ID")
);

CREATE TABLE IF NOT EXISTS "Frame_Assignments_Section_Properties" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Story" TEXT,
    "Label" TEXT,
    "UniqueName" INTEGER,
    "Shape" TEXT,
    "Auto_Select_List" TEXT,
    "Section_Property" TEXT,
    "Section_PropertyID" INTEGER,
    FOREIGN KEY ("Section_Property") REFERENCES "Frame_Section_Property_Definitions_Concrete_Rectangular" ("Name"),
    FOREIGN KEY ("Section_PropertyID") REFERENCES "Frame_Section_Property_Definitions_Concrete_Rectangular" ("ID")
);

CREATE TABLE IF NOT EXISTS "Column_Object_Connectivity" (
    "Unique_Name" INTEGER UNIQUE,
    "Story" TEXT,
    "ColumnBay" TEXT,
    "UniquePtI" INTEGER,
    "UniquePtJ" INTEGER,
    "Length" REAL,
    "GUID" TEXT,
    "ElementID" INTEGER,
    FOREIGN KEY ("ElementID") REFERENCES "Frame_Assignments_Section_Properties" ("ID")
);

CREATE TABLE IF NOT EXISTS "Load_Combination_Definitions" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Name" TEXT UNIQUE,
    "Type" TEXT,
    "Is_Auto" TEXT,
    "Load_Name" TEXT,
    "SF" REAL,
    "GUID" TEXT,
    "Notes" TEXT
);

CREATE TABLE IF NOT EXISTS "Element_Forces_Columns" (
    "ID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Story" TEXT,
    "Column" TEXT,
    "Unique_Name" INTEGER,
    "Output_Case" TEXT,
    "Case_Type" TEXT,
    "Station" REAL,
    "P" REAL,
    "V2" REAL,
    "V3" REAL,
    "T" REAL,
    "M2" REAL,
    "M3" REAL,
    "Element" INTEGER,
    "Elem_Station" REAL,
    "Location" REAL,
    "ElementID" INTEGER,
    "Load_case_id" INTEGER,
    FOREIGN KEY ("Output_Case") REFERENCES "Load_Combination_Definitions" ("Name"),
    FOREIGN KEY ("ElementID") REFERENCES "Frame_Assignments_Section_Properties" ("ID"),
    FOREIGN KEY ("Load_case_id") REFERENCES "Load_Combination_Definitions" ("ID")
);
"#;

/// The single canonical general-input row that static links point at
pub const GENERAL_INPUT_SEED_SQL: &str =
    r#"INSERT OR IGNORE INTO "General_Input" ("id") VALUES (1)"#;

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?(\w+)[`"\]]?"#)
        .expect("table name pattern is valid")
});

/// Split a script into statements on lines ending with `;`, dropping blank
/// lines and `--` comments.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);

        if line.ends_with(';') {
            statements.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

/// Table created by a `CREATE TABLE` statement, if it is one.
pub fn extract_table_name(statement: &str) -> Option<String> {
    TABLE_NAME_RE
        .captures(statement)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn create_table_statements() -> Vec<String> {
    split_sql_statements(CREATE_TABLES_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sql_statements_ignores_comments_and_blank_lines() {
        let sql = "-- header\nCREATE TABLE a (x INT);\n\n  CREATE TABLE b (\n y INT\n);\n";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a (x INT);");
        assert_eq!(stmts[1], "CREATE TABLE b ( y INT );");
    }

    #[test]
    fn test_extract_table_name_handles_quote_styles() {
        assert_eq!(
            extract_table_name(r#"CREATE TABLE IF NOT EXISTS "Story_Definitions" (x)"#).as_deref(),
            Some("Story_Definitions")
        );
        assert_eq!(
            extract_table_name("create table `Genral` (id int)").as_deref(),
            Some("Genral")
        );
        assert_eq!(extract_table_name("INSERT INTO t VALUES (1)"), None);
    }

    #[test]
    fn test_script_defines_every_table_once() {
        let mut created: Vec<String> = create_table_statements()
            .iter()
            .filter_map(|s| extract_table_name(s))
            .collect();
        created.sort();
        let mut expected: Vec<String> = NEW_TABLES.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(created, expected);
    }

    #[test]
    fn test_script_executes_on_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES_SQL).unwrap();
        conn.execute(GENERAL_INPUT_SEED_SQL, []).unwrap();
        conn.execute(GENERAL_INPUT_SEED_SQL, []).unwrap();
        let n: i64 = conn
            .query_row(r#"SELECT COUNT(*) FROM "General_Input""#, [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
