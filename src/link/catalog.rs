//! Built-in link rules for the structural schema.
//!
//! Lookup pairs name both sides explicitly: the reinforcing table stores
//! material names in `Tie_Bar_Material`, the rebar table in `Material`.

use crate::link::loader::RuleSet;
use crate::link::rule::{ColumnPair, ColumnRef, LinkAction, LinkRule};
use crate::schema::tables::{
    COLUMN_CONNECTIVITY, COLUMN_FORCES, COLUMN_REINFORCING, CONCRETE_MATERIALS, FRAME_ASSIGNMENTS,
    GENERAL_INPUT, JOINTS, LOAD_COMBINATIONS, REBAR_MATERIALS, RECTANGULAR_SECTIONS,
    STORY_DEFINITIONS,
};

fn rule(
    id: u32,
    priority: i32,
    source: (&str, &str),
    target: (&str, &str),
    action: LinkAction,
) -> LinkRule {
    LinkRule {
        id,
        priority,
        source: ColumnRef::new(source.0, source.1),
        target: ColumnRef::new(target.0, target.1),
        action,
        note: None,
    }
}

fn id_fill(lookup: &str, target_lookup: &str) -> LinkAction {
    LinkAction::IdFill {
        lookup: ColumnPair::new(lookup, target_lookup),
    }
}

fn element_join() -> LinkAction {
    LinkAction::IdFillComplex {
        join_on: vec![
            ColumnPair::new("Unique_Name", "UniqueName"),
            ColumnPair::new("Story", "Story"),
        ],
    }
}

#[rustfmt::skip]
pub fn builtin_link_rules() -> Vec<LinkRule> {
    use LinkAction::{Direct, Validation};

    vec![
        // Text relationships, documented only
        rule(1, 1, (COLUMN_REINFORCING, "Longitudinal_Bar_Material"), (REBAR_MATERIALS, "Material"), Direct),
        rule(2, 1, (COLUMN_REINFORCING, "Tie_Bar_Material"), (REBAR_MATERIALS, "Material"), Direct),
        rule(3, 1, (RECTANGULAR_SECTIONS, "Material"), (CONCRETE_MATERIALS, "Material"), Direct),
        rule(4, 1, (JOINTS, "Story"), (STORY_DEFINITIONS, "Name"), Direct),
        rule(5, 1, (COLUMN_CONNECTIVITY, "UniquePtI"), (JOINTS, "Element_Name"), Direct),
        rule(6, 1, (COLUMN_CONNECTIVITY, "UniquePtJ"), (JOINTS, "Element_Name"), Direct),
        rule(7, 1, (FRAME_ASSIGNMENTS, "Section_Property"), (RECTANGULAR_SECTIONS, "Name"), Direct),
        rule(8, 1, (COLUMN_FORCES, "Output_Case"), (LOAD_COMBINATIONS, "Name"), Direct),
        rule(9, 1, (COLUMN_REINFORCING, "Name"), (RECTANGULAR_SECTIONS, "Name"), Direct),
        // Checked after linking
        rule(10, 1, (COLUMN_FORCES, "Story"), (FRAME_ASSIGNMENTS, "Story"), Validation),
        rule(11, 1, (COLUMN_FORCES, "Unique_Name"), (FRAME_ASSIGNMENTS, "UniqueName"), Validation),
        rule(12, 1, (COLUMN_CONNECTIVITY, "Story"), (FRAME_ASSIGNMENTS, "Story"), Validation),
        rule(13, 1, (COLUMN_CONNECTIVITY, "Unique_Name"), (FRAME_ASSIGNMENTS, "UniqueName"), Validation),
        // Surrogate keys from one lookup column
        rule(14, 2, (COLUMN_REINFORCING, "Tie_Bar_MaterialID"), (REBAR_MATERIALS, "ID"), id_fill("Tie_Bar_Material", "Material")),
        rule(15, 2, (COLUMN_REINFORCING, "Longitudinal_Bar_MaterialID"), (REBAR_MATERIALS, "ID"), id_fill("Longitudinal_Bar_Material", "Material")),
        rule(16, 2, (COLUMN_REINFORCING, "NameID"), (RECTANGULAR_SECTIONS, "ID"), id_fill("Name", "Name")),
        rule(17, 2, (FRAME_ASSIGNMENTS, "Section_PropertyID"), (RECTANGULAR_SECTIONS, "ID"), id_fill("Section_Property", "Name")),
        rule(18, 2, (RECTANGULAR_SECTIONS, "MaterialID"), (CONCRETE_MATERIALS, "ID"), id_fill("Material", "Material")),
        rule(19, 2, (COLUMN_FORCES, "Load_case_id"), (LOAD_COMBINATIONS, "ID"), id_fill("Output_Case", "Name")),
        // Surrogate keys from a (unique name, story) pair
        rule(20, 3, (COLUMN_FORCES, "ElementID"), (FRAME_ASSIGNMENTS, "ID"), element_join()),
        rule(21, 3, (COLUMN_CONNECTIVITY, "ElementID"), (FRAME_ASSIGNMENTS, "ID"), element_join()),
        LinkRule {
            note: Some("General_Input holds a single row".to_string()),
            ..rule(22, 1, (REBAR_MATERIALS, "GeneralID"), (GENERAL_INPUT, "id"), LinkAction::StaticId { value: 1 })
        },
    ]
}

/// The built-in catalog as a rule set in execution order
pub fn builtin_rules() -> RuleSet {
    RuleSet::from_catalog(builtin_link_rules())
}
