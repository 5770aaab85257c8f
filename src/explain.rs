//! One-sentence explanations of query results
//!
//! Dispatch is ordered: the first rule that recognises the question and the
//! result shape writes the sentence.

use serde_json::Value;
use thiserror::Error;
use tracing::error;

use civic_agentic::vocabulary::{groups_in, DemographicGroup};

use crate::database::ResultSet;

pub const NO_DATA: &str = "No data found for your query.";
pub const EXPLANATION_FAILED: &str = "Results obtained, but explanation generation failed.";
pub const SEARCH_UNAVAILABLE: &str = "**Search data not available**: The current dataset doesn't include search-related information. Only stop outcomes like arrests, citations, and warnings are available.";

const GROUP_COLUMNS: &[&str] = &["driver_race", "subject_race", "race", "driver_gender"];
const GROUP_COUNT_COLUMNS: &[&str] = &["total_arrests", "arrests", "count", "arrest_count"];

#[derive(Debug, Error)]
enum ExplainError {
    #[error("column {0} holds non-numeric values")]
    NotNumeric(String),
}

/// Explain `result` as an answer to `question`
pub fn explain(question: &str, result: &ResultSet, query: &str) -> String {
    summarize(question, result).unwrap_or_else(|e| {
        error!("Error generating explanation for {}: {}", query, e);
        EXPLANATION_FAILED.to_string()
    })
}

fn summarize(question: &str, result: &ResultSet) -> Result<String, ExplainError> {
    if result.is_empty() {
        return Ok(NO_DATA.to_string());
    }
    let q = question.to_lowercase();

    if let Some(sentence) = comparative_rate(result)? {
        return Ok(sentence);
    }
    if q.contains("arrest") {
        if let Some(sentence) = group_arrests(&q, result)? {
            return Ok(sentence);
        }
    }
    if (q.contains("search rate") || q.contains("searched"))
        && !result.columns.iter().any(|c| c.to_lowercase().contains("search"))
    {
        return Ok(SEARCH_UNAVAILABLE.to_string());
    }
    if let Some(sentence) = scalar(result)? {
        return Ok(sentence);
    }

    let rows = result.len();
    if result.has_column("total_arrests") {
        let total = column_sum(result, "total_arrests")?;
        let top_group = if result.columns.len() > 1 {
            display_value(&result.rows[0][0])
        } else {
            "N/A".to_string()
        };
        let top = number(result.get(0, "total_arrests"), "total_arrests")?;
        return Ok(format!(
            "Arrest analysis shows {} total arrests across {} groups. {} had the highest number of arrests ({}).",
            format_number(total),
            rows,
            top_group,
            format_number(top)
        ));
    }

    if let Some(count_column) = result
        .columns
        .iter()
        .find(|c| c.to_lowercase().contains("count"))
    {
        let total = column_sum(result, count_column)?;
        return Ok(format!(
            "Analysis shows {} total records across {} groups.",
            format_number(total),
            rows
        ));
    }

    let shown = result
        .columns
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let more = if result.columns.len() > 3 { "..." } else { "" };
    Ok(format!(
        "Query returned {} rows with data about: {}{}.",
        rows, shown, more
    ))
}

fn group_column(result: &ResultSet) -> Option<&str> {
    GROUP_COLUMNS
        .iter()
        .copied()
        .find(|c| result.has_column(c))
}

fn group_label(value: &Value) -> String {
    let raw = display_value(value);
    DemographicGroup::find(&raw)
        .map(|g| g.label.to_string())
        .unwrap_or(raw)
}

fn comparative_rate(result: &ResultSet) -> Result<Option<String>, ExplainError> {
    let Some(group) = group_column(result) else {
        return Ok(None);
    };
    if !result.has_column("arrest_rate") || result.len() < 2 {
        return Ok(None);
    }

    let mut rated = Vec::with_capacity(result.len());
    for row in 0..result.len() {
        let rate = number(result.get(row, "arrest_rate"), "arrest_rate")?;
        let label = result.get(row, group).map(group_label).unwrap_or_default();
        rated.push((label, rate));
    }
    let by_rate = |a: &&(String, f64), b: &&(String, f64)| a.1.total_cmp(&b.1);
    let (Some(highest), Some(lowest)) = (rated.iter().max_by(by_rate), rated.iter().min_by(by_rate))
    else {
        return Ok(None);
    };

    Ok(Some(format!(
        "{} drivers had the highest arrest rate at {:.2}%, while {} drivers had the lowest at {:.2}%.",
        highest.0, highest.1, lowest.0, lowest.1
    )))
}

fn group_arrests(question: &str, result: &ResultSet) -> Result<Option<String>, ExplainError> {
    let Some(group) = groups_in(question).first().copied() else {
        return Ok(None);
    };
    let Some(race_column) = ["driver_race", "subject_race", "race"]
        .into_iter()
        .find(|c| result.has_column(c))
    else {
        return Ok(None);
    };

    let matching: Vec<usize> = (0..result.len())
        .filter(|&row| {
            result
                .get(row, race_column)
                .and_then(Value::as_str)
                .is_some_and(|v| v.eq_ignore_ascii_case(group.value))
        })
        .collect();

    let Some(&first) = matching.first() else {
        return Ok(Some(format!(
            "No arrest data found for {} individuals in this dataset.",
            group.label
        )));
    };

    let count = match GROUP_COUNT_COLUMNS.iter().find(|c| result.has_column(c)) {
        Some(column) => number(result.get(first, column), column)?,
        None => matching.len() as f64,
    };
    Ok(Some(format!(
        "According to the data, **{}** {} individuals were arrested.",
        format_number(count),
        group.label
    )))
}

fn scalar(result: &ResultSet) -> Result<Option<String>, ExplainError> {
    if result.len() != 1 || result.columns.len() != 1 {
        return Ok(None);
    }
    let column = result.columns[0].as_str();
    let value = &result.rows[0][0];

    let sentence = match column {
        "average_age" => match value.as_f64() {
            Some(age) => format!("The average age of drivers stopped is **{:.1}** years.", age),
            None => "The average driver age could not be determined from this dataset.".to_string(),
        },
        "total_stops" | "total_arrests" | "total_citations" | "total_warnings" => {
            let n = format_number(number(Some(value), column)?);
            match column {
                "total_stops" => format!("The dataset contains **{}** total stops.", n),
                "total_arrests" => format!("There were **{}** arrests in total.", n),
                "total_citations" => format!("**{}** citations were issued.", n),
                _ => format!("**{}** warnings were issued.", n),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(sentence))
}

fn number(value: Option<&Value>, column: &str) -> Result<f64, ExplainError> {
    match value {
        Some(Value::Null) | None => Ok(0.0),
        Some(v) => v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| ExplainError::NotNumeric(column.to_string())),
    }
}

fn column_sum(result: &ResultSet, column: &str) -> Result<f64, ExplainError> {
    result
        .column(column)
        .into_iter()
        .map(|v| number(Some(v), column))
        .sum()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    }
}

/// Integers with thousands separators, other values to two decimals
pub fn format_number(value: f64) -> String {
    if value.fract() != 0.0 || value.abs() >= 1e15 {
        return format!("{:.2}", value);
    }
    let digits = (value.abs() as u64).to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(10000.0), "10,000");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(-1234567.0), "-1,234,567");
        assert_eq!(format_number(12.345), "12.35");
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(explain("anything", &ResultSet::default(), "SELECT 1"), NO_DATA);
    }

    #[test]
    fn test_comparative_rates() {
        let r = result(
            &["driver_race", "total_stops", "arrests", "arrest_rate"],
            vec![
                vec![json!("black"), json!(200), json!(25), json!(12.5)],
                vec![json!("white"), json!(300), json!(12), json!(4.0)],
            ],
        );
        assert_eq!(
            explain("arrest rate for black vs white", &r, ""),
            "Black drivers had the highest arrest rate at 12.50%, while White drivers had the lowest at 4.00%."
        );
    }

    #[test]
    fn test_group_arrests() {
        let r = result(
            &["driver_race", "total_arrests"],
            vec![vec![json!("black"), json!(1234)]],
        );
        assert_eq!(
            explain("How many blacks were arrested?", &r, ""),
            "According to the data, **1,234** Black individuals were arrested."
        );

        let r = result(
            &["driver_race", "total_arrests"],
            vec![vec![json!("white"), json!(3)]],
        );
        assert_eq!(
            explain("How many blacks were arrested?", &r, ""),
            "No arrest data found for Black individuals in this dataset."
        );
    }

    #[test]
    fn test_search_unavailable() {
        let r = result(&["driver_race", "stops"], vec![vec![json!("white"), json!(3)]]);
        assert_eq!(explain("Who gets searched most?", &r, ""), SEARCH_UNAVAILABLE);
    }

    #[test]
    fn test_scalars() {
        let r = result(&["total_stops"], vec![vec![json!(10000)]]);
        assert_eq!(
            explain("How many total stops?", &r, ""),
            "The dataset contains **10,000** total stops."
        );
        let r = result(&["average_age"], vec![vec![json!(34.56)]]);
        assert_eq!(
            explain("average age", &r, ""),
            "The average age of drivers stopped is **34.6** years."
        );
    }

    #[test]
    fn test_grouped_and_counts() {
        let r = result(
            &["driver_gender", "total_arrests"],
            vec![vec![json!("M"), json!(30)], vec![json!("F"), json!(10)]],
        );
        assert_eq!(
            explain("arrests by gender", &r, ""),
            "Arrest analysis shows 40 total arrests across 2 groups. M had the highest number of arrests (30)."
        );

        let r = result(
            &["hour", "stop_count"],
            vec![vec![json!(17), json!(500)], vec![json!(3), json!(20)]],
        );
        assert_eq!(
            explain("peak hours", &r, ""),
            "Analysis shows 520 total records across 2 groups."
        );

        let r = result(
            &["a", "b", "c", "d"],
            vec![vec![json!(1), json!(2), json!(3), json!(4)]],
        );
        assert_eq!(
            explain("something", &r, ""),
            "Query returned 1 rows with data about: a, b, c..."
        );
    }

    #[test]
    fn test_non_numeric_counts_fail_gracefully() {
        let r = result(&["district", "stop_count"], vec![vec![json!("N"), json!("many")]]);
        assert_eq!(explain("stops by district", &r, ""), EXPLANATION_FAILED);
    }
}
