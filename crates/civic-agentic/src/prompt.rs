//! Prompt construction for the generative tier
//!
//! Pure functions of the question and a [`SchemaSnapshot`]; nothing here talks
//! to a model, so the prompts are unit-testable on their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distinct-value lists are capped at this many entries
pub const MAX_CATEGORICAL_VALUES: usize = 10;

/// Sample rows shown to the model
pub const PROMPT_SAMPLE_ROWS: usize = 3;

/// Columns shown per sample row
const SAMPLE_COLUMNS_PER_ROW: usize = 8;

/// What the model is told about the table it writes SQL against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub table_name: String,
    /// Column names as discovered in the store
    pub columns: Vec<String>,
    /// Sample rows as `(column, value)` pairs in column order
    pub sample_rows: Vec<Vec<(String, serde_json::Value)>>,
    /// Known value sets of low-cardinality columns, keyed by column
    pub categorical: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    pub fn new(table_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            ..Default::default()
        }
    }

    /// Attach sample rows, keeping at most [`PROMPT_SAMPLE_ROWS`]
    pub fn with_sample_rows(mut self, rows: Vec<Vec<(String, serde_json::Value)>>) -> Self {
        self.sample_rows = rows.into_iter().take(PROMPT_SAMPLE_ROWS).collect();
        self
    }

    /// Attach a categorical value set, keeping at most [`MAX_CATEGORICAL_VALUES`]
    pub fn with_categorical(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        let values = values.into_iter().take(MAX_CATEGORICAL_VALUES).collect();
        self.categorical.insert(key.into(), values);
        self
    }
}

/// Lazily supplies a snapshot; only consulted when the generative tier runs
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<SchemaSnapshot>;
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", s),
        serde_json::Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Build the system prompt grounded in the table's real schema
pub fn build_system_prompt(snapshot: &SchemaSnapshot) -> String {
    let table = &snapshot.table_name;
    let columns_list = snapshot.columns.join(", ");

    let mut sample_data = String::new();
    for (i, row) in snapshot.sample_rows.iter().enumerate() {
        let details: Vec<String> = row
            .iter()
            .take(SAMPLE_COLUMNS_PER_ROW)
            .map(|(col, val)| format!("{}: {}", col, render_value(val)))
            .collect();
        sample_data.push_str(&format!("Row {}: {}...\n", i + 1, details.join(", ")));
    }

    let mut categorical = String::new();
    for (key, values) in &snapshot.categorical {
        categorical.push_str(&format!("- {}: {:?}\n", key, values));
    }

    format!(
        r#"You are a SQLite query generator. Generate ONLY valid SQLite SQL queries.

**DATABASE: SQLite (NOT MySQL/PostgreSQL)**

**TABLE INFO:**
Table: {table}
Columns: {columns_list}

**SAMPLE DATA (showing actual formats):**
{sample_data}
**CATEGORICAL VALUES:**
{categorical}
**SQLITE SYNTAX RULES:**
1. Use SQLite functions: strftime(), substr(), CAST(), datetime()
2. For hour extraction: CAST(substr(time, 1, 2) AS INTEGER) NOT HOUR()
3. For dates: strftime('%Y-%m', stop_date) NOT DATE_FORMAT()
4. Always end with complete ORDER BY clause
5. Use exact table name: {table}
6. Use exact column names from above list

**REQUIRED EXAMPLES:**
- Time analysis: "SELECT CAST(substr(time, 1, 2) AS INTEGER) as hour, COUNT(*) as stop_count FROM {table} WHERE time IS NOT NULL GROUP BY hour ORDER BY stop_count DESC"
- Race analysis: "SELECT driver_race, COUNT(*) as count FROM {table} WHERE driver_race IS NOT NULL GROUP BY driver_race ORDER BY count DESC"
- Monthly: "SELECT strftime('%Y-%m', stop_date) as month, COUNT(*) as stops FROM {table} WHERE stop_date IS NOT NULL GROUP BY month ORDER BY month"

**CRITICAL:**
- Return ONLY one complete SELECT statement
- NO explanations, NO thinking, NO incomplete queries
- Always include complete ORDER BY clause"#,
        table = table,
        columns_list = columns_list,
        sample_data = sample_data,
        categorical = categorical,
    )
}

/// Build the user prompt for a question
pub fn build_user_prompt(question: &str) -> String {
    format!("Generate SQL for: {}", question.trim())
}
