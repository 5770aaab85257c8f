//! Relational store
//!
//! A thin layer over a SQLite pool: create-or-replace of department tables
//! with their metadata sidecar, raw query execution into [`ResultSet`]s, and
//! schema introspection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, QueryBuilder, Row, Sqlite, Statement, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::ingest::MetadataRecord;
use crate::schema::CanonicalField;
use crate::schema::naming::{is_plain_identifier, metadata_table_for, sanitize_identifiers};
use crate::table::DataTable;

/// Bound parameters per INSERT statement
const MAX_BINDS_PER_INSERT: usize = 900;

/// Rows returned by a query, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(index) => self.rows.iter().filter_map(|r| r.get(index)).collect(),
            None => Vec::new(),
        }
    }

    /// Rows as `(column, value)` pairs
    pub fn pairs(&self) -> Vec<Vec<(String, Value)>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}

/// One column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Storage affinity chosen for a column on persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    /// Canonical outcome flag stored as 0/1
    Flag,
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Boolean | ColumnKind::Flag | ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    /// Flag fields accept any yes/no spelling; other columns are inferred
    fn for_column<'a, I>(name: &str, values: impl Fn() -> I) -> Self
    where
        I: Iterator<Item = Option<&'a str>>,
    {
        let flag = CanonicalField::from_name(name).is_some_and(|f| f.is_flag());
        if flag && values().flatten().all(|v| parse_flag(v).is_some()) {
            ColumnKind::Flag
        } else {
            ColumnKind::infer(values())
        }
    }

    fn infer<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Self {
        let (mut boolean, mut integer, mut real, mut any) = (true, true, true, false);
        for value in values.flatten() {
            any = true;
            boolean &= parse_bool(value).is_some();
            // Leading zeros are identifiers (beats, zip codes), not numbers
            let padded = value.len() > 1 && value.starts_with('0') && !value.starts_with("0.");
            integer &= !padded && value.parse::<i64>().is_ok();
            real &= !padded && value.parse::<f64>().is_ok_and(f64::is_finite);
            if !(boolean || integer || real) {
                return ColumnKind::Text;
            }
        }
        match (any, boolean, integer, real) {
            (false, ..) => ColumnKind::Text,
            (true, true, ..) => ColumnKind::Boolean,
            (true, _, true, _) => ColumnKind::Integer,
            (true, _, _, true) => ColumnKind::Real,
            _ => ColumnKind::Text,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// SQLite-backed table store
#[derive(Clone)]
pub struct TableStore {
    pool: SqlitePool,
}

impl TableStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let in_memory = config.database_url.contains(":memory:");
        info!("Connecting to table store: {}", config.database_url);

        let mut options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.connection_timeout);
        if in_memory {
            // An in-memory database lives exactly as long as its connection
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            warn!("Failed to connect to table store: {}", e);
            e
        })?;
        Ok(Self { pool })
    }

    /// Private in-memory store
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace `table_name` and its metadata sidecar in one transaction
    ///
    /// Returns the column names as stored.
    pub async fn replace_table(
        &self,
        table_name: &str,
        data: &DataTable,
        metadata: &MetadataRecord,
    ) -> Result<Vec<String>, StoreError> {
        ensure_identifier(table_name)?;
        let columns = sanitize_identifiers(data.columns());
        let kinds: Vec<ColumnKind> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnKind::for_column(name, || data.column_values(i)))
            .collect();

        let metadata_table = metadata_table_for(table_name);
        let document = serde_json::to_string(metadata)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table_name))
            .execute(&mut *tx)
            .await?;
        let definition = columns
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| format!("\"{}\" {}", name, kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("CREATE TABLE \"{}\" ({})", table_name, definition))
            .execute(&mut *tx)
            .await?;

        let rows_per_insert = (MAX_BINDS_PER_INSERT / columns.len().max(1)).max(1);
        for chunk in data.rows().chunks(rows_per_insert) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO \"{}\" ({}) ",
                table_name,
                columns
                    .iter()
                    .map(|c| format!("\"{}\"", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            builder.push_values(chunk, |mut b, row| {
                for (cell, kind) in row.iter().zip(&kinds) {
                    let cell = cell.as_deref();
                    match (kind, cell) {
                        (_, None) => b.push_bind(None::<String>),
                        (ColumnKind::Boolean, Some(v)) => {
                            b.push_bind(parse_bool(v).map(i64::from))
                        }
                        (ColumnKind::Flag, Some(v)) => b.push_bind(parse_flag(v).map(i64::from)),
                        (ColumnKind::Integer, Some(v)) => b.push_bind(v.parse::<i64>().ok()),
                        (ColumnKind::Real, Some(v)) => b.push_bind(v.parse::<f64>().ok()),
                        (ColumnKind::Text, Some(v)) => b.push_bind(v.to_string()),
                    };
                }
            });
            builder.build().execute(&mut *tx).await?;
        }

        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", metadata_table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE \"{}\" (document TEXT NOT NULL)",
            metadata_table
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("INSERT INTO \"{}\" (document) VALUES (?)", metadata_table))
            .bind(document)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Stored {} rows in {} ({} columns)",
            data.row_count(),
            table_name,
            columns.len()
        );
        Ok(columns)
    }

    /// Run one statement and collect every row
    pub async fn run_query(&self, sql: &str) -> Result<ResultSet, StoreError> {
        debug!("Executing: {}", sql);
        let rows: Vec<SqliteRow> = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                let statement = (&self.pool).prepare(sql).await?;
                statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            }
        };

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
            .collect::<Result<Vec<Vec<Value>>, sqlx::Error>>()?;

        Ok(ResultSet { columns, rows })
    }

    pub async fn table_exists(&self, table_name: &str) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn table_schema(&self, table_name: &str) -> Result<TableSchema, StoreError> {
        ensure_identifier(table_name)?;
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table_name))
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(StoreError::MissingTable(table_name.to_string()));
        }

        let columns = rows
            .iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: row.try_get::<i64, _>("notnull")? == 0,
                    is_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    pub async fn sample_rows(&self, table_name: &str, limit: usize) -> Result<ResultSet, StoreError> {
        ensure_identifier(table_name)?;
        if !self.table_exists(table_name).await? {
            return Err(StoreError::MissingTable(table_name.to_string()));
        }
        self.run_query(&format!("SELECT * FROM \"{}\" LIMIT {}", table_name, limit))
            .await
    }

    /// Distinct non-null values of a column, as text
    pub async fn distinct_values(
        &self,
        table_name: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        ensure_identifier(table_name)?;
        ensure_identifier(column)?;
        let values: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT CAST(\"{col}\" AS TEXT) FROM \"{table}\" WHERE \"{col}\" IS NOT NULL LIMIT ?",
            col = column,
            table = table_name
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    /// Metadata sidecar for `table_name`, if the table was loaded
    pub async fn load_metadata(
        &self,
        table_name: &str,
    ) -> Result<Option<MetadataRecord>, StoreError> {
        let metadata_table = metadata_table_for(table_name);
        ensure_identifier(&metadata_table)?;
        if !self.table_exists(&metadata_table).await? {
            return Ok(None);
        }
        let document: Option<String> =
            sqlx::query_scalar(&format!("SELECT document FROM \"{}\" LIMIT 1", metadata_table))
                .fetch_optional(&self.pool)
                .await?;
        document
            .map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(StoreError::from)
    }

    pub async fn close(self) {
        info!("Closing table store");
        self.pool.close().await;
    }
}

fn ensure_identifier(name: &str) -> Result<(), StoreError> {
    if is_plain_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::String(
            String::from_utf8_lossy(&row.try_get_unchecked::<Vec<u8>, _>(index)?).into_owned(),
        ),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}
