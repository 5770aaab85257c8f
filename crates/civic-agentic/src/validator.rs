//! SQL Validator
//!
//! Checks that generated SQL is a single read-only query the store can run,
//! and that it reads no table other than the one it was generated for.

use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, Query, Statement, Visit, Visitor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

/// Why a generated query was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query is empty")]
    Empty,

    #[error("query does not parse: {0}")]
    Parse(String),

    #[error("expected exactly one statement, found {0}")]
    StatementCount(usize),

    #[error("only SELECT queries are allowed, found {0}")]
    NotReadOnly(String),

    #[error("query reads {found}, expected only {expected}")]
    ForeignTable { found: String, expected: String },

    #[error("query does not read {0}")]
    Unbound(String),
}

/// Validate that `sql` is exactly one `SELECT` in the SQLite dialect that
/// reads `table` and nothing else
pub fn validate_select(sql: &str, table: &str) -> Result<(), ValidationError> {
    let tables = tables_read_by(sql)?;
    if let Some(found) = tables.iter().find(|t| !t.eq_ignore_ascii_case(table)) {
        return Err(ValidationError::ForeignTable {
            found: found.clone(),
            expected: table.to_string(),
        });
    }
    if tables.is_empty() {
        return Err(ValidationError::Unbound(table.to_string()));
    }
    Ok(())
}

/// Tables a single read-only query reads, lower-cased, without CTE names
pub fn tables_read_by(sql: &str) -> Result<Vec<String>, ValidationError> {
    let statement = parse_single_select(sql)?;
    let mut collector = RelationCollector::default();
    let _ = statement.visit(&mut collector);

    let RelationCollector { ctes, mut relations } = collector;
    relations.retain(|r| !ctes.contains(r));
    Ok(relations)
}

fn parse_single_select(sql: &str) -> Result<Statement, ValidationError> {
    if sql.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| ValidationError::Parse(e.to_string()))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(statements.remove(0)),
        [other] => Err(ValidationError::NotReadOnly(statement_kind(other))),
        many => Err(ValidationError::StatementCount(many.len())),
    }
}

#[derive(Default)]
struct RelationCollector {
    ctes: Vec<String>,
    relations: Vec<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            self.ctes.extend(
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase()),
            );
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        // Schema-qualified names compare on the table part
        if let Some(ident) = relation.0.last() {
            let name = ident.value.to_lowercase();
            if !self.relations.contains(&name) {
                self.relations.push(name);
            }
        }
        ControlFlow::Continue(())
    }
}

fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "police_data_seattle";

    #[test]
    fn test_accepts_select() {
        assert!(validate_select(
            "SELECT CAST(substr(time, 1, 2) AS INTEGER) as hour, COUNT(*) as stop_count \
             FROM police_data_seattle WHERE time IS NOT NULL GROUP BY hour ORDER BY stop_count DESC",
            TABLE
        )
        .is_ok());
        assert!(validate_select(
            "SELECT strftime('%Y-%m', stop_date) as month, COUNT(*) FROM Police_Data_Seattle \
             GROUP BY month",
            TABLE
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_writes_and_batches() {
        assert_eq!(
            validate_select("DROP TABLE police_data_seattle", TABLE),
            Err(ValidationError::NotReadOnly("DROP".to_string()))
        );
        assert_eq!(
            validate_select("SELECT 1; DELETE FROM t", TABLE),
            Err(ValidationError::StatementCount(2))
        );
        assert_eq!(validate_select("   ", TABLE), Err(ValidationError::Empty));
        assert!(matches!(
            validate_select("SELEC * FRM t", TABLE),
            Err(ValidationError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_other_tables() {
        for sql in [
            "SELECT * FROM police_data_chicago",
            "SELECT * FROM police_data_seattle_metadata",
            "SELECT * FROM query_cache",
            "SELECT name FROM sqlite_master",
            "SELECT a.* FROM police_data_seattle a JOIN police_data_chicago b ON a.beat = b.beat",
            "SELECT * FROM police_data_seattle WHERE beat IN (SELECT beat FROM query_cache)",
        ] {
            assert!(
                matches!(
                    validate_select(sql, TABLE),
                    Err(ValidationError::ForeignTable { .. })
                ),
                "accepted: {}",
                sql
            );
        }
        assert_eq!(
            validate_select("SELECT 1", TABLE),
            Err(ValidationError::Unbound(TABLE.to_string()))
        );
    }

    #[test]
    fn test_tables_read_by_skips_ctes() {
        let tables = tables_read_by(
            "WITH by_race AS (SELECT driver_race, COUNT(*) AS n FROM police_data_seattle \
             GROUP BY driver_race) SELECT * FROM by_race ORDER BY n DESC",
        )
        .unwrap();
        assert_eq!(tables, vec!["police_data_seattle".to_string()]);
        assert_eq!(tables_read_by("SELECT 1").unwrap(), Vec::<String>::new());
    }
}
