//! Property tests for column normalization

use std::collections::HashSet;

use civic_query::schema::naming::sanitize_identifiers;
use civic_query::{CanonicalField, DataTable, SchemaNormalizer};
use proptest::prelude::*;

const SOURCE_NAMES: &[&str] = &[
    "race", "subject_race", "Driver Race", "sex", "gender", "subject_sex", "age", "date",
    "stop_date", "Incident Date", "time", "arrest", "arrest_made", "citation", "warning",
    "outcome", "disposition", "lat", "lng", "district", "precinct", "officer_race",
    "searched", "contraband", "force_used", "beat", "beat", "notes", "id", "driver_race",
];

fn column_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            prop::sample::select(SOURCE_NAMES).prop_map(str::to_string),
            "[a-zA-Z_ ]{1,12}",
        ],
        0..10,
    )
}

fn table_of(columns: Vec<String>) -> DataTable {
    let row = columns.iter().map(|c| Some(format!("v_{}", c))).collect();
    DataTable::new(columns, vec![row])
}

proptest! {
    #[test]
    fn prop_required_fields_always_present(columns in column_names()) {
        let normalized = SchemaNormalizer::default().normalize(table_of(columns));
        for field in CanonicalField::REQUIRED {
            prop_assert!(normalized.table.column_index(field.name()).is_some());
        }
    }

    #[test]
    fn prop_output_columns_are_unique(columns in column_names()) {
        let normalized = SchemaNormalizer::default().normalize(table_of(columns));
        let output = normalized.table.columns();
        let unique: HashSet<&String> = output.iter().collect();
        prop_assert_eq!(unique.len(), output.len());
    }

    #[test]
    fn prop_repeated_names_keep_first(columns in column_names()) {
        let mut columns = columns;
        columns.push("beat".to_string());
        columns.push("beat".to_string());
        let normalized = SchemaNormalizer::default().normalize(table_of(columns));
        let beats = normalized.table.columns().iter().filter(|c| *c == "beat").count();
        prop_assert_eq!(beats, 1);
        prop_assert!(normalized.mappings.iter().any(|m| m.source == "beat" && m.dropped));
    }

    #[test]
    fn prop_normalization_is_idempotent(columns in column_names()) {
        let normalizer = SchemaNormalizer::default();
        let once = normalizer.normalize(table_of(columns));
        let twice = normalizer.normalize(once.table.clone());
        prop_assert_eq!(once.table.columns(), twice.table.columns());
        prop_assert_eq!(once.table.rows(), twice.table.rows());
        prop_assert!(twice.synthesized.is_empty());
    }

    #[test]
    fn prop_stored_names_are_unique(columns in column_names()) {
        let normalized = SchemaNormalizer::default().normalize(table_of(columns));
        let stored = sanitize_identifiers(normalized.table.columns());
        let unique: HashSet<&String> = stored.iter().collect();
        prop_assert_eq!(unique.len(), stored.len());
    }
}
