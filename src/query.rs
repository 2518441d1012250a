//! Read-only lookups over the linked store.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use crate::db::{quote_ident, Store};
use crate::error::Result;
use crate::schema;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Story {
    pub id: i64,
    pub tower: Option<String>,
    pub name: String,
    pub height: Option<f64>,
    pub master_story: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAssignment {
    pub id: i64,
    pub story: Option<String>,
    pub label: Option<String>,
    pub unique_name: Option<i64>,
    pub shape: Option<String>,
    pub section_property: Option<String>,
    pub section_property_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnConnectivity {
    pub unique_name: Option<i64>,
    pub story: Option<String>,
    pub column_bay: Option<String>,
    pub unique_pt_i: Option<i64>,
    pub unique_pt_j: Option<i64>,
    pub length: Option<f64>,
    pub element_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionProperty {
    pub id: i64,
    pub name: Option<String>,
    pub material: Option<String>,
    pub depth: Option<f64>,
    pub width: Option<f64>,
    pub area_modifier: Option<f64>,
    pub i22_modifier: Option<f64>,
    pub i33_modifier: Option<f64>,
    pub material_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadCombination {
    pub id: i64,
    pub name: Option<String>,
    pub combo_type: Option<String>,
    pub is_auto: Option<String>,
    pub load_name: Option<String>,
    pub scale_factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReinforcement {
    pub id: i64,
    pub name: Option<String>,
    pub longitudinal_bar_material: Option<String>,
    pub tie_bar_material: Option<String>,
    pub configuration: Option<String>,
    pub clear_cover: Option<f64>,
    pub bars_3_dir: Option<i64>,
    pub bars_2_dir: Option<i64>,
    pub longitudinal_bar_size: Option<f64>,
    pub tie_bar_size: Option<f64>,
    pub tie_bar_spacing: Option<f64>,
    pub number_ties_3_dir: Option<i64>,
    pub number_ties_2_dir: Option<i64>,
    pub longitudinal_bar_material_id: Option<i64>,
    pub tie_bar_material_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcreteMaterial {
    pub id: i64,
    pub material: Option<String>,
    pub fc: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebarMaterial {
    pub id: i64,
    pub material: Option<String>,
    pub fy: Option<f64>,
    pub fu: Option<f64>,
    pub general_id: Option<i64>,
}

/// Assessment factors shared by the whole model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralInput {
    pub id: i64,
    /// 1.0 when unset
    pub knowledge_factor: f64,
    pub lambda_c: Option<f64>,
    pub lambda_s: Option<f64>,
    pub performance_level: Option<String>,
    pub phi: Option<f64>,
}

/// One station of one output case for a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnForce {
    pub id: i64,
    pub story: Option<String>,
    pub column: Option<String>,
    pub unique_name: Option<i64>,
    pub output_case: Option<String>,
    pub case_type: Option<String>,
    pub station: Option<f64>,
    pub p: Option<f64>,
    pub v2: Option<f64>,
    pub v3: Option<f64>,
    pub t: Option<f64>,
    pub m2: Option<f64>,
    pub m3: Option<f64>,
    pub element_id: Option<i64>,
    pub load_case_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentSummary {
    pub max_m2: f64,
    pub max_m3: f64,
    /// sqrt(max_m2² + max_m3²)
    pub max_combined: f64,
}

/// A force row followed through its resolved keys to section and concrete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementDesign {
    pub assignment: FrameAssignment,
    pub section: Option<SectionProperty>,
    pub concrete: Option<ConcreteMaterial>,
}

/// Optional tables with lower-bound strengths, keyed by material `ID`
pub const CONCRETE_LOWER_BOUND_TABLE: &str = "Material_Properties_Concrete_LowerBound";
pub const REBAR_LOWER_BOUND_TABLE: &str = "Material_Properties_Rebar_LowerBound";

const GENERAL_INPUT_COLUMNS: &str = r#""id", "Knowledge_Factor", "Concrete_Strength_Factor_Lambda_c", "Steel_Strength_Factor_Lambda_s", "Performance_Level", "Safety_Factor_Phi""#;
const STORY_COLUMNS: &str =
    r#""ID", "Tower", "Name", "Height", "Master_Story", "Color", "Notes""#;
const ASSIGNMENT_COLUMNS: &str =
    r#""ID", "Story", "Label", "UniqueName", "Shape", "Section_Property", "Section_PropertyID""#;
const SECTION_COLUMNS: &str = r#""ID", "Name", "Material", "Depth", "Width", "Area_Modifier", "I22_Modifier", "I33_Modifier", "MaterialID""#;
const FORCE_COLUMNS: &str = r#""ID", "Story", "Column", "Unique_Name", "Output_Case", "Case_Type", "Station", "P", "V2", "V3", "T", "M2", "M3", "ElementID", "Load_case_id""#;

fn general_input_from_row(row: &Row) -> rusqlite::Result<GeneralInput> {
    let knowledge_factor: Option<f64> = row.get(1)?;
    Ok(GeneralInput {
        id: row.get(0)?,
        knowledge_factor: knowledge_factor.filter(|k| *k != 0.0).unwrap_or(1.0),
        lambda_c: row.get(2)?,
        lambda_s: row.get(3)?,
        performance_level: row.get(4)?,
        phi: row.get(5)?,
    })
}

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        tower: row.get(1)?,
        name: row.get(2)?,
        height: row.get(3)?,
        master_story: row.get(4)?,
        color: row.get(5)?,
        notes: row.get(6)?,
    })
}

fn assignment_from_row(row: &Row) -> rusqlite::Result<FrameAssignment> {
    Ok(FrameAssignment {
        id: row.get(0)?,
        story: row.get(1)?,
        label: row.get(2)?,
        unique_name: row.get(3)?,
        shape: row.get(4)?,
        section_property: row.get(5)?,
        section_property_id: row.get(6)?,
    })
}

fn section_from_row(row: &Row) -> rusqlite::Result<SectionProperty> {
    Ok(SectionProperty {
        id: row.get(0)?,
        name: row.get(1)?,
        material: row.get(2)?,
        depth: row.get(3)?,
        width: row.get(4)?,
        area_modifier: row.get(5)?,
        i22_modifier: row.get(6)?,
        i33_modifier: row.get(7)?,
        material_id: row.get(8)?,
    })
}

fn force_from_row(row: &Row) -> rusqlite::Result<ColumnForce> {
    Ok(ColumnForce {
        id: row.get(0)?,
        story: row.get(1)?,
        column: row.get(2)?,
        unique_name: row.get(3)?,
        output_case: row.get(4)?,
        case_type: row.get(5)?,
        station: row.get(6)?,
        p: row.get(7)?,
        v2: row.get(8)?,
        v3: row.get(9)?,
        t: row.get(10)?,
        m2: row.get(11)?,
        m3: row.get(12)?,
        element_id: row.get(13)?,
        load_case_id: row.get(14)?,
    })
}

fn max_abs(values: impl Iterator<Item = Option<f64>>) -> f64 {
    values.flatten().map(f64::abs).fold(0.0, f64::max)
}

pub struct QueryService<'a> {
    store: &'a Store,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn story_by_name(&self, name: &str) -> Result<Option<Story>> {
        let sql = format!(
            r#"SELECT {} FROM "Story_Definitions" WHERE "Name" = ?1"#,
            STORY_COLUMNS
        );
        let story = self
            .store
            .connection()
            .query_row(&sql, params![name], story_from_row)
            .optional()?;
        if story.is_none() {
            debug!(name, "Story not found");
        }
        Ok(story)
    }

    /// All stories, highest first
    pub fn all_stories(&self) -> Result<Vec<Story>> {
        let sql = format!(
            r#"SELECT {} FROM "Story_Definitions" ORDER BY "Height" DESC"#,
            STORY_COLUMNS
        );
        let mut stmt = self.store.connection().prepare(&sql)?;
        let stories = stmt
            .query_map([], story_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stories)
    }

    pub fn frame_assignment(&self, label: &str, story: &str) -> Result<Option<FrameAssignment>> {
        let sql = format!(
            r#"SELECT {} FROM "Frame_Assignments_Section_Properties" WHERE "Label" = ?1 AND "Story" = ?2 ORDER BY "ID" LIMIT 1"#,
            ASSIGNMENT_COLUMNS
        );
        Ok(self
            .store
            .connection()
            .query_row(&sql, params![label, story], assignment_from_row)
            .optional()?)
    }

    /// Frame assignments on `story`, optionally only labels containing `search`
    pub fn story_columns(&self, story: &str, search: Option<&str>) -> Result<Vec<FrameAssignment>> {
        let conn = self.store.connection();
        let rows = match search {
            Some(term) => {
                let sql = format!(
                    r#"SELECT {} FROM "Frame_Assignments_Section_Properties" WHERE "Story" = ?1 AND "Label" LIKE ?2 ORDER BY "UniqueName""#,
                    ASSIGNMENT_COLUMNS
                );
                let pattern = format!("%{}%", term);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![story, pattern], assignment_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let sql = format!(
                    r#"SELECT {} FROM "Frame_Assignments_Section_Properties" WHERE "Story" = ?1 ORDER BY "UniqueName""#,
                    ASSIGNMENT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![story], assignment_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn column_connectivity(&self, unique_name: i64) -> Result<Option<ColumnConnectivity>> {
        Ok(self
            .store
            .connection()
            .query_row(
                r#"SELECT "Unique_Name", "Story", "ColumnBay", "UniquePtI", "UniquePtJ", "Length", "ElementID"
                   FROM "Column_Object_Connectivity" WHERE "Unique_Name" = ?1"#,
                params![unique_name],
                |row| {
                    Ok(ColumnConnectivity {
                        unique_name: row.get(0)?,
                        story: row.get(1)?,
                        column_bay: row.get(2)?,
                        unique_pt_i: row.get(3)?,
                        unique_pt_j: row.get(4)?,
                        length: row.get(5)?,
                        element_id: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn section_property(&self, name: &str) -> Result<Option<SectionProperty>> {
        let sql = format!(
            r#"SELECT {} FROM "Frame_Section_Property_Definitions_Concrete_Rectangular" WHERE "Name" = ?1"#,
            SECTION_COLUMNS
        );
        Ok(self
            .store
            .connection()
            .query_row(&sql, params![name], section_from_row)
            .optional()?)
    }

    pub fn load_combination(&self, name: &str) -> Result<Option<LoadCombination>> {
        Ok(self
            .store
            .connection()
            .query_row(
                r#"SELECT "ID", "Name", "Type", "Is_Auto", "Load_Name", "SF"
                   FROM "Load_Combination_Definitions" WHERE "Name" = ?1"#,
                params![name],
                |row| {
                    Ok(LoadCombination {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        combo_type: row.get(2)?,
                        is_auto: row.get(3)?,
                        load_name: row.get(4)?,
                        scale_factor: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    /// Reinforcement defined for the section named `section`
    pub fn column_reinforcement(&self, section: &str) -> Result<Option<ColumnReinforcement>> {
        Ok(self
            .store
            .connection()
            .query_row(
                r#"SELECT "ID", "Name", "Longitudinal_Bar_Material", "Tie_Bar_Material",
                          "Reinforcement_Configuration", "Clear_Cover_to_Ties",
                          "Number_Bars_3_Dir", "Number_Bars_2_Dir", "Longitudinal_Bar_Size",
                          "Tie_Bar_Size", "Tie_Bar_Spacing", "Number_Ties_3_Dir", "Number_Ties_2_Dir",
                          "Longitudinal_Bar_MaterialID", "Tie_Bar_MaterialID"
                   FROM "Frame_Section_Property_Definitions_Concrete_Column_Reinforcing"
                   WHERE "Name" = ?1 LIMIT 1"#,
                params![section],
                |row| {
                    Ok(ColumnReinforcement {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        longitudinal_bar_material: row.get(2)?,
                        tie_bar_material: row.get(3)?,
                        configuration: row.get(4)?,
                        clear_cover: row.get(5)?,
                        bars_3_dir: row.get(6)?,
                        bars_2_dir: row.get(7)?,
                        longitudinal_bar_size: row.get(8)?,
                        tie_bar_size: row.get(9)?,
                        tie_bar_spacing: row.get(10)?,
                        number_ties_3_dir: row.get(11)?,
                        number_ties_2_dir: row.get(12)?,
                        longitudinal_bar_material_id: row.get(13)?,
                        tie_bar_material_id: row.get(14)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn concrete_material(&self, name: &str) -> Result<Option<ConcreteMaterial>> {
        Ok(self
            .store
            .connection()
            .query_row(
                r#"SELECT "ID", "Material", "Fc" FROM "Material_Properties_Concrete_Data" WHERE "Material" = ?1"#,
                params![name],
                |row| {
                    Ok(ConcreteMaterial {
                        id: row.get(0)?,
                        material: row.get(1)?,
                        fc: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn rebar_material(&self, name: &str) -> Result<Option<RebarMaterial>> {
        Ok(self
            .store
            .connection()
            .query_row(
                r#"SELECT "ID", "Material", "Fy", "Fu", "GeneralID" FROM "Material_Properties_Rebar_Data" WHERE "Material" = ?1"#,
                params![name],
                |row| {
                    Ok(RebarMaterial {
                        id: row.get(0)?,
                        material: row.get(1)?,
                        fy: row.get(2)?,
                        fu: row.get(3)?,
                        general_id: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn general_input(&self, id: i64) -> Result<Option<GeneralInput>> {
        let sql = format!(
            r#"SELECT {} FROM "General_Input" WHERE "id" = ?1"#,
            GENERAL_INPUT_COLUMNS
        );
        Ok(self
            .store
            .connection()
            .query_row(&sql, params![id], general_input_from_row)
            .optional()?)
    }

    pub fn all_general_inputs(&self) -> Result<Vec<GeneralInput>> {
        let sql = format!(
            r#"SELECT {} FROM "General_Input" ORDER BY "id""#,
            GENERAL_INPUT_COLUMNS
        );
        let mut stmt = self.store.connection().prepare(&sql)?;
        let rows = stmt
            .query_map([], general_input_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Lower-bound concrete strength for a resolved material id; falls back
    /// to `Fc` when no lower-bound value is recorded.
    pub fn concrete_lower_bound(&self, material_id: i64) -> Result<Option<f64>> {
        self.lower_bound(
            CONCRETE_LOWER_BOUND_TABLE,
            "Fc_LB",
            schema::tables::CONCRETE_MATERIALS,
            "Fc",
            material_id,
        )
    }

    /// Lower-bound rebar yield strength; falls back to `Fy`.
    pub fn rebar_lower_bound(&self, material_id: i64) -> Result<Option<f64>> {
        self.lower_bound(
            REBAR_LOWER_BOUND_TABLE,
            "Fy_LB",
            schema::tables::REBAR_MATERIALS,
            "Fy",
            material_id,
        )
    }

    fn lower_bound(
        &self,
        bound_table: &str,
        bound_column: &str,
        table: &str,
        column: &str,
        material_id: i64,
    ) -> Result<Option<f64>> {
        let conn = self.store.connection();
        if self.store.table_exists(bound_table)? {
            let sql = format!(
                "SELECT {} FROM {} WHERE \"ID\" = ?1",
                quote_ident(bound_column),
                quote_ident(bound_table)
            );
            let bound: Option<f64> = conn
                .query_row(&sql, params![material_id], |row| row.get(0))
                .optional()?
                .flatten();
            if let Some(value) = bound.filter(|v| *v != 0.0) {
                return Ok(Some(value));
            }
            debug!(table = bound_table, material_id, "No lower bound recorded");
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE \"ID\" = ?1",
            quote_ident(column),
            quote_ident(table)
        );
        Ok(conn
            .query_row(&sql, params![material_id], |row| row.get(0))
            .optional()?
            .flatten())
    }

    /// Force row with the largest |P| for a column on a story
    pub fn governing_force(&self, column: &str, story: &str) -> Result<Option<ColumnForce>> {
        let sql = format!(
            r#"SELECT {} FROM "Element_Forces_Columns" WHERE "Column" = ?1 AND "Story" = ?2 ORDER BY ABS("P") DESC, "ID" LIMIT 1"#,
            FORCE_COLUMNS
        );
        Ok(self
            .store
            .connection()
            .query_row(&sql, params![column, story], force_from_row)
            .optional()?)
    }

    /// All force rows for a column on a story, by station
    pub fn column_forces(&self, column: &str, story: &str) -> Result<Vec<ColumnForce>> {
        let sql = format!(
            r#"SELECT {} FROM "Element_Forces_Columns" WHERE "Column" = ?1 AND "Story" = ?2 ORDER BY "Station", "ID""#,
            FORCE_COLUMNS
        );
        let mut stmt = self.store.connection().prepare(&sql)?;
        let rows = stmt
            .query_map(params![column, story], force_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Peak moments over all stations and cases; `None` when the column has no force rows
    pub fn max_moments(&self, column: &str, story: &str) -> Result<Option<MomentSummary>> {
        let forces = self.column_forces(column, story)?;
        if forces.is_empty() {
            return Ok(None);
        }
        let max_m2 = max_abs(forces.iter().map(|f| f.m2));
        let max_m3 = max_abs(forces.iter().map(|f| f.m3));
        Ok(Some(MomentSummary {
            max_m2,
            max_m3,
            max_combined: (max_m2 * max_m2 + max_m3 * max_m3).sqrt(),
        }))
    }

    /// Follow a force row's resolved keys: element, section, concrete.
    ///
    /// `None` when the force row does not exist or its element is unresolved.
    pub fn element_design(&self, force_id: i64) -> Result<Option<ElementDesign>> {
        let conn = self.store.connection();
        let element_id: Option<i64> = conn
            .query_row(
                r#"SELECT "ElementID" FROM "Element_Forces_Columns" WHERE "ID" = ?1"#,
                params![force_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let Some(element_id) = element_id else {
            return Ok(None);
        };

        let sql = format!(
            r#"SELECT {} FROM "Frame_Assignments_Section_Properties" WHERE "ID" = ?1"#,
            ASSIGNMENT_COLUMNS
        );
        let Some(assignment) = conn
            .query_row(&sql, params![element_id], assignment_from_row)
            .optional()?
        else {
            return Ok(None);
        };

        let section = match assignment.section_property_id {
            Some(id) => {
                let sql = format!(
                    r#"SELECT {} FROM "Frame_Section_Property_Definitions_Concrete_Rectangular" WHERE "ID" = ?1"#,
                    SECTION_COLUMNS
                );
                conn.query_row(&sql, params![id], section_from_row).optional()?
            }
            None => None,
        };

        let concrete = match section.as_ref().and_then(|s| s.material_id) {
            Some(id) => conn
                .query_row(
                    r#"SELECT "ID", "Material", "Fc" FROM "Material_Properties_Concrete_Data" WHERE "ID" = ?1"#,
                    params![id],
                    |row| {
                        Ok(ConcreteMaterial {
                            id: row.get(0)?,
                            material: row.get(1)?,
                            fc: row.get(2)?,
                        })
                    },
                )
                .optional()?,
            None => None,
        };

        Ok(Some(ElementDesign {
            assignment,
            section,
            concrete,
        }))
    }
}
