//! Dashboard KPI metrics for a loaded department
//!
//! Every figure is a query through the [`QueryExecutor`], so metrics share the
//! result cache and are dropped with it when the department is reloaded.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::database::{ResultSet, TableSchema};
use crate::error::MetricsError;
use crate::execution::QueryExecutor;
use crate::ingest::metadata::parse_date;
use crate::ingest::DateRange;
use crate::schema::CanonicalField;

/// Count of one stop outcome and its share of all stops
///
/// `None` fields render as "N/A": the dataset has no way to tell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMetric {
    pub count: Option<i64>,
    /// Percentage of all stops, one decimal
    pub rate: Option<f64>,
}

impl OutcomeMetric {
    fn of(count: i64, total: i64) -> Self {
        let rate = (total > 0).then(|| (count as f64 / total as f64 * 1000.0).round() / 10.0);
        Self {
            count: Some(count),
            rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiMetrics {
    pub total_stops: i64,
    pub arrests: OutcomeMetric,
    pub citations: OutcomeMetric,
    pub warnings: OutcomeMetric,
    pub average_age: Option<f64>,
    pub date_range: Option<DateRange>,
    pub gender_distribution: Vec<CategoryCount>,
    pub race_distribution: Vec<CategoryCount>,
}

/// Outcome flags and the `stop_outcome` keyword used when the flag is absent
const OUTCOMES: [(CanonicalField, &str); 3] = [
    (CanonicalField::ArrestMade, "arrest"),
    (CanonicalField::CitationIssued, "citation"),
    (CanonicalField::WarningIssued, "warning"),
];

/// Compute KPI metrics for `department`
pub async fn kpi_metrics(
    executor: &QueryExecutor,
    department: &str,
) -> Result<KpiMetrics, MetricsError> {
    let schema = executor.table_schema(department).await?;

    let total = scalar_i64(
        &executor
            .execute("SELECT COUNT(*) AS total_stops FROM police_data", department)
            .await?,
    );
    if total == 0 {
        return Ok(KpiMetrics::default());
    }

    let mut outcomes = [OutcomeMetric::default(); 3];
    for (slot, (flag, keyword)) in outcomes.iter_mut().zip(OUTCOMES) {
        let Some(query) = outcome_query(&schema, flag, keyword) else {
            continue;
        };
        let count = scalar_i64(&executor.execute(&query, department).await?);
        // A zero citation or warning count means the source does not record it
        if count > 0 || flag == CanonicalField::ArrestMade {
            *slot = OutcomeMetric::of(count, total);
        }
    }
    let [arrests, citations, warnings] = outcomes;

    let average_age = if schema.has_column(CanonicalField::DriverAge.name()) {
        executor
            .execute(
                "SELECT AVG(CAST(driver_age AS REAL)) AS average_age FROM police_data \
                 WHERE CAST(driver_age AS REAL) > 0 AND CAST(driver_age AS REAL) < 120",
                department,
            )
            .await?
            .rows
            .first()
            .and_then(|r| r.first())
            .and_then(Value::as_f64)
            .map(|age| (age * 10.0).round() / 10.0)
    } else {
        None
    };

    let date_range = if schema.has_column(CanonicalField::StopDate.name()) {
        let dates = executor
            .execute(
                "SELECT DISTINCT stop_date FROM police_data WHERE stop_date IS NOT NULL",
                department,
            )
            .await?;
        date_range_of(&dates)
    } else {
        None
    };

    let metrics = KpiMetrics {
        total_stops: total,
        arrests,
        citations,
        warnings,
        average_age,
        date_range,
        gender_distribution: distribution(executor, &schema, department, CanonicalField::DriverGender)
            .await?,
        race_distribution: distribution(executor, &schema, department, CanonicalField::DriverRace)
            .await?,
    };
    info!("Generated metrics for {}: {} stops", department, metrics.total_stops);
    Ok(metrics)
}

fn outcome_query(schema: &TableSchema, flag: CanonicalField, keyword: &str) -> Option<String> {
    if schema.has_column(flag.name()) {
        Some(format!(
            "SELECT COALESCE(SUM(CASE WHEN {} = 1 THEN 1 ELSE 0 END), 0) AS n FROM police_data",
            flag.name()
        ))
    } else if schema.has_column(CanonicalField::StopOutcome.name()) {
        Some(format!(
            "SELECT COUNT(*) AS n FROM police_data WHERE LOWER(stop_outcome) LIKE '%{}%'",
            keyword
        ))
    } else {
        None
    }
}

async fn distribution(
    executor: &QueryExecutor,
    schema: &TableSchema,
    department: &str,
    field: CanonicalField,
) -> Result<Vec<CategoryCount>, MetricsError> {
    let column = field.name();
    if !schema.has_column(column) {
        return Ok(Vec::new());
    }
    let result = executor
        .execute(
            &format!(
                "SELECT {col} AS value, COUNT(*) AS count FROM police_data \
                 WHERE {col} IS NOT NULL GROUP BY {col} ORDER BY count DESC, value",
                col = column
            ),
            department,
        )
        .await?;

    Ok(result
        .rows
        .iter()
        .filter_map(|row| match (row.first(), row.get(1).and_then(Value::as_i64)) {
            (Some(Value::String(value)), Some(count)) => Some(CategoryCount {
                value: value.clone(),
                count,
            }),
            (Some(Value::Null), _) | (None, _) | (_, None) => None,
            (Some(other), Some(count)) => Some(CategoryCount {
                value: other.to_string(),
                count,
            }),
        })
        .collect())
}

fn scalar_i64(result: &ResultSet) -> i64 {
    result
        .rows
        .first()
        .and_then(|r| r.first())
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn date_range_of(dates: &ResultSet) -> Option<DateRange> {
    let mut parsed = dates
        .rows
        .iter()
        .filter_map(|r| r.first().and_then(Value::as_str))
        .filter_map(parse_date);
    let first = parsed.next()?;
    let (start, end) = parsed.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Some(DateRange {
        start_date: Some(start),
        end_date: Some(end),
    })
}
