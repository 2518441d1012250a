//! Source export column names mapped onto the normalized schema.

use crate::schema::tables;

/// `(source column, normalized column)` pairs for one table
pub type ColumnMapping = &'static [(&'static str, &'static str)];

/// Tables copied from the source export, in import order. Source and
/// normalized tables share a name.
pub const TABLE_MAPPINGS: [(&str, ColumnMapping); 10] = [
    (
        tables::STORY_DEFINITIONS,
        &[
            ("Tower", "Tower"),
            ("Name", "Name"),
            ("Height", "Height"),
            ("Master Story", "Master_Story"),
            ("Similar To", "Similar_To"),
            ("Splice Story", "Splice_Story"),
            ("Splice Height", "Splice_Height"),
            ("Color", "Color"),
            ("GUID", "GUID"),
        ],
    ),
    (
        tables::CONCRETE_MATERIALS,
        &[
            ("Material", "Material"),
            ("Fc", "Fc"),
            ("LtWtConc", "LtWtConc"),
            ("IsUserFr", "IsUserFr"),
            ("SSCurveOpt", "SSCurveOpt"),
            ("SSHysType", "SSHysType"),
            ("SFc", "SFc"),
            ("SCap", "SCap"),
            ("FinalSlope", "FinalSlope"),
            ("FAngle", "FAngle"),
            ("DAngle", "DAngle"),
        ],
    ),
    (
        tables::REBAR_MATERIALS,
        &[
            ("Material", "Material"),
            ("Fy", "Fy"),
            ("Fu", "Fu"),
            ("Fye", "Fye"),
            ("Fue", "Fue"),
            ("SSCurveOpt", "SSCurveOpt"),
            ("SSHysType", "SSHysType"),
            ("SHard", "SHard"),
            ("SCap", "SCap"),
            ("FinalSlope", "FinalSlope"),
        ],
    ),
    (
        tables::LOAD_COMBINATIONS,
        &[
            ("Name", "Name"),
            ("Type", "Type"),
            ("Is Auto", "Is_Auto"),
            ("Load Name", "Load_Name"),
            ("SF", "SF"),
            ("GUID", "GUID"),
            ("Notes", "Notes"),
        ],
    ),
    (
        tables::JOINTS,
        &[
            ("Story", "Story"),
            ("Element Name", "Element_Name"),
            ("Object Type", "Object_Type"),
            ("Object Label", "Object_Label"),
            ("Object Name", "Object_Name"),
            ("Global X", "Global_X"),
            ("Global Y", "Global_Y"),
            ("Global Z", "Global_Z"),
        ],
    ),
    (
        tables::COLUMN_CONNECTIVITY,
        &[
            ("Unique Name", "Unique_Name"),
            ("Story", "Story"),
            ("ColumnBay", "ColumnBay"),
            ("UniquePtI", "UniquePtI"),
            ("UniquePtJ", "UniquePtJ"),
            ("Length", "Length"),
            ("GUID", "GUID"),
        ],
    ),
    (
        tables::COLUMN_REINFORCING,
        &[
            ("Name", "Name"),
            ("Longitudinal Bar Material", "Longitudinal_Bar_Material"),
            ("Tie Bar Material", "Tie_Bar_Material"),
            ("Reinforcement Configuration", "Reinforcement_Configuration"),
            ("Is Designed?", "Is_Designed"),
            ("Clear Cover to Ties", "Clear_Cover_to_Ties"),
            ("Number Bars 3-Dir", "Number_Bars_3_Dir"),
            ("Number Bars 2-Dir", "Number_Bars_2_Dir"),
            ("Longitudinal Bar Size", "Longitudinal_Bar_Size"),
            ("Corner Bar Size", "Corner_Bar_Size"),
            ("Tie Bar Size", "Tie_Bar_Size"),
            ("Tie Bar Spacing", "Tie_Bar_Spacing"),
            ("Number Ties 3-Dir", "Number_Ties_3_Dir"),
            ("Number Ties 2-Dir", "Number_Ties_2_Dir"),
        ],
    ),
    (
        tables::RECTANGULAR_SECTIONS,
        &[
            ("Name", "Name"),
            ("Material", "Material"),
            ("From File?", "From_File"),
            ("Depth", "Depth"),
            ("Width", "Width"),
            ("Rigid Zone?", "Rigid_Zone"),
            ("Notional Size Type", "Notional_Size_Type"),
            ("Notional Auto Factor", "Notional_Auto_Factor"),
            ("Design Type", "Design_Type"),
            ("Area Modifier", "Area_Modifier"),
            ("As2 Modifier", "As2_Modifier"),
            ("As3 Modifier", "As3_Modifier"),
            ("J Modifier", "J_Modifier"),
            ("I22 Modifier", "I22_Modifier"),
            ("I33 Modifier", "I33_Modifier"),
            ("Mass Modifier", "Mass_Modifier"),
            ("Weight Modifier", "Weight_Modifier"),
            ("Color", "Color"),
            ("GUID", "GUID"),
            ("Notes", "Notes"),
        ],
    ),
    (
        tables::FRAME_ASSIGNMENTS,
        &[
            ("Story", "Story"),
            ("Label", "Label"),
            ("UniqueName", "UniqueName"),
            ("Shape", "Shape"),
            ("Auto Select List", "Auto_Select_List"),
            ("Section Property", "Section_Property"),
        ],
    ),
    (
        tables::COLUMN_FORCES,
        &[
            ("Story", "Story"),
            ("Column", "Column"),
            ("Unique Name", "Unique_Name"),
            ("Output Case", "Output_Case"),
            ("Case Type", "Case_Type"),
            ("Station", "Station"),
            ("P", "P"),
            ("V2", "V2"),
            ("V3", "V3"),
            ("T", "T"),
            ("M2", "M2"),
            ("M3", "M3"),
            ("Element", "Element"),
            ("Elem Station", "Elem_Station"),
            ("Location", "Location"),
        ],
    ),
];

/// Normalized columns never copied from the source: link-managed keys and
/// columns the export does not carry.
pub const IGNORED_COLUMNS: [(&str, &[&str]); 7] = [
    (tables::STORY_DEFINITIONS, &["Notes"]),
    (tables::REBAR_MATERIALS, &["GeneralID"]),
    (
        tables::COLUMN_REINFORCING,
        &["Longitudinal_Bar_MaterialID", "Tie_Bar_MaterialID", "NameID"],
    ),
    (tables::RECTANGULAR_SECTIONS, &["MaterialID"]),
    (tables::FRAME_ASSIGNMENTS, &["Section_PropertyID"]),
    (tables::COLUMN_CONNECTIVITY, &["ElementID"]),
    (tables::COLUMN_FORCES, &["ElementID", "Load_case_id"]),
];

pub fn column_mapping(table: &str) -> Option<ColumnMapping> {
    TABLE_MAPPINGS
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, mapping)| *mapping)
}

pub fn new_column_name(table: &str, source_column: &str) -> Option<&'static str> {
    column_mapping(table)?
        .iter()
        .find(|(src, _)| *src == source_column)
        .map(|(_, dst)| *dst)
}

pub fn source_column_name(table: &str, new_column: &str) -> Option<&'static str> {
    column_mapping(table)?
        .iter()
        .find(|(_, dst)| *dst == new_column)
        .map(|(src, _)| *src)
}

pub fn is_ignored(table: &str, new_column: &str) -> bool {
    IGNORED_COLUMNS
        .iter()
        .any(|(name, cols)| *name == table && cols.contains(&new_column))
}

/// Mapped pairs whose source column is present in `available`, minus ignored columns
pub fn columns_to_copy(table: &str, available: &[String]) -> Vec<(&'static str, &'static str)> {
    column_mapping(table)
        .unwrap_or(&[])
        .iter()
        .filter(|(src, dst)| available.iter().any(|a| a == src) && !is_ignored(table, dst))
        .copied()
        .collect()
}

pub fn tables_to_import() -> impl Iterator<Item = &'static str> {
    TABLE_MAPPINGS.iter().map(|(name, _)| *name)
}
