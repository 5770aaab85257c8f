//! Deterministic question patterns
//!
//! The pattern tier recognises a bounded set of question intents and emits a
//! parameterised SQLite template bound only to the resolved table name.
//! Recognisers run in the fixed order of [`PATTERN_RULES`]; the first match
//! wins, so a broader rule must come after every narrower rule it would
//! otherwise shadow.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::vocabulary::{groups_in, mentions_gender, mentions_race, DemographicGroup};

/// Default and maximum row limits for "top N" questions
const DEFAULT_TOP_N: u32 = 10;
const MAX_TOP_N: u32 = 100;

static TOP_N: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\btop\s+(\d{1,6})\b").expect("static regex"));

/// Demographic column a grouped template aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Race,
    Gender,
}

impl Dimension {
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Race => "driver_race",
            Dimension::Gender => "driver_gender",
        }
    }
}

/// A recognised question intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPattern {
    /// "How many total stops?"
    TotalStops,
    /// "How many arrests were there?"
    ArrestCount,
    /// "Arrest rate for black vs white"
    ComparativeArrestRate {
        first: &'static DemographicGroup,
        second: &'static DemographicGroup,
    },
    /// "How many blacks were arrested?"
    GroupArrestCount { group: &'static DemographicGroup },
    /// "Arrest rate by race"
    ArrestRateBy(Dimension),
    CitationCount,
    WarningCount,
    /// Hour-of-day histogram
    PeakHours,
    /// Monthly time series
    MonthlyTrend,
    TopDistricts { limit: u32 },
    AverageAge,
    /// Stops per demographic value
    Breakdown(Dimension),
}

/// One entry of the ordered recogniser table
pub struct PatternRule {
    pub name: &'static str,
    pub recognize: fn(&str) -> Option<QuestionPattern>,
}

/// Recognisers in strict priority order
pub const PATTERN_RULES: &[PatternRule] = &[
    PatternRule {
        name: "total_stops",
        recognize: recognize_total_stops,
    },
    PatternRule {
        name: "arrest_count",
        recognize: recognize_arrest_count,
    },
    PatternRule {
        name: "comparative_arrest_rate",
        recognize: recognize_comparative_rate,
    },
    PatternRule {
        name: "group_arrest_count",
        recognize: recognize_group_arrests,
    },
    PatternRule {
        name: "arrest_rate_by",
        recognize: recognize_arrest_rate_by,
    },
    PatternRule {
        name: "citation_count",
        recognize: recognize_citations,
    },
    PatternRule {
        name: "warning_count",
        recognize: recognize_warnings,
    },
    PatternRule {
        name: "peak_hours",
        recognize: recognize_peak_hours,
    },
    PatternRule {
        name: "monthly_trend",
        recognize: recognize_monthly,
    },
    PatternRule {
        name: "top_districts",
        recognize: recognize_top_districts,
    },
    PatternRule {
        name: "average_age",
        recognize: recognize_average_age,
    },
    PatternRule {
        name: "breakdown",
        recognize: recognize_breakdown,
    },
];

fn contains_any(q: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| q.contains(n))
}

fn recognize_total_stops(q: &str) -> Option<QuestionPattern> {
    let asks_total = contains_any(q, &["total number of stops", "how many stops", "total stops"]);
    // "how many stops by district" is a grouping question, not a total
    let grouped = contains_any(q, &[" by ", " per ", "each "]);
    (asks_total && !grouped).then_some(QuestionPattern::TotalStops)
}

fn recognize_arrest_count(q: &str) -> Option<QuestionPattern> {
    let asks = contains_any(q, &["how many arrests", "number of arrests", "total arrests"]);
    (asks && !mentions_race(q) && !mentions_gender(q)).then_some(QuestionPattern::ArrestCount)
}

fn recognize_comparative_rate(q: &str) -> Option<QuestionPattern> {
    if !q.contains("arrest rate") {
        return None;
    }
    match groups_in(q).as_slice() {
        [first, second, ..] => Some(QuestionPattern::ComparativeArrestRate {
            first: *first,
            second: *second,
        }),
        _ => None,
    }
}

fn recognize_group_arrests(q: &str) -> Option<QuestionPattern> {
    if !q.contains("arrest") || q.contains("rate") {
        return None;
    }
    match groups_in(q).as_slice() {
        [group] => Some(QuestionPattern::GroupArrestCount { group: *group }),
        _ => None,
    }
}

fn recognize_arrest_rate_by(q: &str) -> Option<QuestionPattern> {
    if !q.contains("arrest") {
        return None;
    }
    if mentions_race(q) {
        Some(QuestionPattern::ArrestRateBy(Dimension::Race))
    } else if mentions_gender(q) {
        Some(QuestionPattern::ArrestRateBy(Dimension::Gender))
    } else {
        None
    }
}

fn recognize_citations(q: &str) -> Option<QuestionPattern> {
    ((q.contains("citation") && q.contains("issued")) || q.contains("how many citations"))
        .then_some(QuestionPattern::CitationCount)
}

fn recognize_warnings(q: &str) -> Option<QuestionPattern> {
    ((q.contains("warning") && q.contains("issued")) || q.contains("how many warnings"))
        .then_some(QuestionPattern::WarningCount)
}

fn recognize_peak_hours(q: &str) -> Option<QuestionPattern> {
    (q.contains("peak hour") || q.contains("hour")).then_some(QuestionPattern::PeakHours)
}

fn recognize_monthly(q: &str) -> Option<QuestionPattern> {
    contains_any(q, &["month", "over time", "trend"]).then_some(QuestionPattern::MonthlyTrend)
}

fn recognize_top_districts(q: &str) -> Option<QuestionPattern> {
    if !contains_any(q, &["district", "precinct"]) {
        return None;
    }
    if !contains_any(q, &["highest", "top", "most", " by ", " per ", "each "]) {
        return None;
    }
    let limit = TOP_N
        .captures(q)
        .and_then(|c| c[1].parse::<u32>().ok())
        .map(|n| n.clamp(1, MAX_TOP_N))
        .unwrap_or(DEFAULT_TOP_N);
    Some(QuestionPattern::TopDistricts { limit })
}

fn recognize_average_age(q: &str) -> Option<QuestionPattern> {
    contains_any(q, &["average age", "mean age"]).then_some(QuestionPattern::AverageAge)
}

fn recognize_breakdown(q: &str) -> Option<QuestionPattern> {
    if mentions_race(q) {
        Some(QuestionPattern::Breakdown(Dimension::Race))
    } else if mentions_gender(q) {
        Some(QuestionPattern::Breakdown(Dimension::Gender))
    } else if contains_any(q, &["demographic", "breakdown"]) {
        Some(QuestionPattern::Breakdown(Dimension::Race))
    } else {
        None
    }
}

/// Match a question against the rule table; first match wins
pub fn classify(question: &str) -> Option<(&'static str, QuestionPattern)> {
    let q = question.to_lowercase();
    PATTERN_RULES
        .iter()
        .find_map(|rule| (rule.recognize)(&q).map(|p| (rule.name, p)))
}

/// The query returned whenever nothing better can be produced
pub fn fallback_query(table: &str) -> String {
    format!("SELECT COUNT(*) as total_stops FROM {}", table)
}

const ARREST_FLAG: &str = "SUM(CASE WHEN arrest_made = 1 THEN 1 ELSE 0 END)";

impl QuestionPattern {
    /// Render the template for `table`
    pub fn to_sql(&self, table: &str) -> String {
        match self {
            QuestionPattern::TotalStops => fallback_query(table),
            QuestionPattern::ArrestCount => format!(
                "SELECT COUNT(*) as total_arrests FROM {} WHERE arrest_made = 1",
                table
            ),
            QuestionPattern::ComparativeArrestRate { first, second } => format!(
                "SELECT driver_race, COUNT(*) as total_stops, {flag} as arrests, \
                 ROUND(100.0 * {flag} / COUNT(*), 2) as arrest_rate \
                 FROM {table} WHERE lower(driver_race) IN ('{a}', '{b}') \
                 GROUP BY driver_race ORDER BY arrest_rate DESC",
                flag = ARREST_FLAG,
                table = table,
                a = first.value,
                b = second.value
            ),
            QuestionPattern::GroupArrestCount { group } => format!(
                "SELECT '{value}' as driver_race, COALESCE({flag}, 0) as total_arrests \
                 FROM {table} WHERE lower(driver_race) = '{value}'",
                value = group.value,
                flag = ARREST_FLAG,
                table = table
            ),
            QuestionPattern::ArrestRateBy(dim) => format!(
                "SELECT {col}, COUNT(*) as total_stops, {flag} as arrests, \
                 ROUND(100.0 * {flag} / COUNT(*), 2) as arrest_rate \
                 FROM {table} WHERE {col} IS NOT NULL GROUP BY {col} ORDER BY arrests DESC",
                col = dim.column(),
                flag = ARREST_FLAG,
                table = table
            ),
            QuestionPattern::CitationCount => format!(
                "SELECT COUNT(*) as total_citations FROM {} WHERE citation_issued = 1",
                table
            ),
            QuestionPattern::WarningCount => format!(
                "SELECT COUNT(*) as total_warnings FROM {} WHERE warning_issued = 1",
                table
            ),
            QuestionPattern::PeakHours => format!(
                "SELECT CAST(substr(time, 1, 2) AS INTEGER) as hour, COUNT(*) as stop_count \
                 FROM {} WHERE time IS NOT NULL AND length(time) >= 2 \
                 GROUP BY hour ORDER BY stop_count DESC",
                table
            ),
            QuestionPattern::MonthlyTrend => format!(
                "SELECT strftime('%Y-%m', stop_date) as month, COUNT(*) as stops \
                 FROM {} WHERE stop_date IS NOT NULL GROUP BY month ORDER BY month",
                table
            ),
            QuestionPattern::TopDistricts { limit } => format!(
                "SELECT district, COUNT(*) as stops FROM {} WHERE district IS NOT NULL \
                 GROUP BY district ORDER BY stops DESC LIMIT {}",
                table, limit
            ),
            QuestionPattern::AverageAge => format!(
                "SELECT ROUND(AVG(CAST(driver_age AS REAL)), 1) as average_age FROM {} \
                 WHERE driver_age IS NOT NULL AND driver_age > 0 AND driver_age < 120",
                table
            ),
            QuestionPattern::Breakdown(dim) => format!(
                "SELECT {col}, COUNT(*) as stops FROM {table} WHERE {col} IS NOT NULL \
                 GROUP BY {col} ORDER BY stops DESC",
                col = dim.column(),
                table = table
            ),
        }
    }
}

/// Questions the pattern tier answers, for display in a UI
pub fn sample_questions() -> Vec<&'static str> {
    vec![
        "How many total stops?",
        "How many blacks were arrested?",
        "What is the arrest rate for black vs white drivers?",
        "Show me arrest counts by race",
        "Which race has the most stops?",
        "What are the peak hours for police stops?",
        "Which districts have the highest number of stops?",
        "Show stops by month over time",
        "What is the average age of drivers stopped?",
    ]
}
