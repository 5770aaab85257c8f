//! Metadata record stored beside each department table

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::source::SourceDescriptor;
use crate::table::DataTable;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Earliest and latest date in the first date-like column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Describes a loaded dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub source: String,
    pub url: String,
    pub description: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub memory_usage_mb: f64,
    pub load_seconds: f64,
    pub loaded_at: DateTime<Utc>,
    pub date_range: DateRange,
    /// Always true; generated sources are rejected before a record is built
    pub real_data: bool,
}

impl MetadataRecord {
    pub fn build(table: &DataTable, descriptor: &SourceDescriptor, elapsed: Duration) -> Self {
        Self {
            source: descriptor.source_name.clone(),
            url: descriptor.url.clone(),
            description: descriptor.description.clone(),
            rows: table.row_count(),
            columns: table.columns().to_vec(),
            memory_usage_mb: table.memory_usage_mb(),
            load_seconds: elapsed.as_secs_f64(),
            loaded_at: Utc::now(),
            date_range: date_range(table),
            real_data: true,
        }
    }
}

/// Best-effort parse of a date or timestamp; the time part is discarded
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        })
}

fn date_range(table: &DataTable) -> DateRange {
    let Some(index) = table
        .columns()
        .iter()
        .position(|c| c.to_lowercase().contains("date"))
    else {
        return DateRange::default();
    };

    table
        .column_values(index)
        .flatten()
        .filter_map(parse_date)
        .fold(DateRange::default(), |range, date| DateRange {
            start_date: Some(range.start_date.map_or(date, |d| d.min(date))),
            end_date: Some(range.end_date.map_or(date, |d| d.max(date))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2015, 3, 7);
        assert_eq!(parse_date("2015-03-07"), expected);
        assert_eq!(parse_date("03/07/2015"), expected);
        assert_eq!(parse_date("2015-03-07T10:15:00"), expected);
        assert_eq!(parse_date("03/07/2015 10:15:00 PM"), expected);
        assert_eq!(parse_date("2015-03-07T10:15:00+00:00"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_record_date_range() {
        let table = DataTable::new(
            vec!["driver_race".into(), "stop_date".into()],
            vec![
                vec![Some("white".into()), Some("2016-05-01".into())],
                vec![Some("black".into()), Some("not a date".into())],
                vec![Some("black".into()), Some("2014-01-31".into())],
                vec![Some("asian".into()), None],
            ],
        );
        let descriptor = SourceDescriptor::new("City Open Data", "CSV", "https://example.org");
        let record = MetadataRecord::build(&table, &descriptor, Duration::from_millis(1500));

        assert_eq!(record.rows, 4);
        assert!(record.real_data);
        assert_eq!(record.load_seconds, 1.5);
        assert_eq!(record.date_range.start_date, NaiveDate::from_ymd_opt(2014, 1, 31));
        assert_eq!(record.date_range.end_date, NaiveDate::from_ymd_opt(2016, 5, 1));
    }
}
