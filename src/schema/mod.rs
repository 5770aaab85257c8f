//! Canonical schema, column standardization and identifier naming

pub mod canonical;
pub mod naming;
pub mod normalizer;

pub use canonical::CanonicalField;
pub use naming::{metadata_table_for, sanitize_identifiers, table_name_for, TABLE_PLACEHOLDER};
pub use normalizer::{ColumnMapping, NormalizedTable, SchemaNormalizer};
