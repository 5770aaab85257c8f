//! Repair of model-generated SQL
//!
//! Model output arrives wrapped in reasoning blocks and code fences, is
//! sometimes cut off mid-clause, and regularly uses MySQL/PostgreSQL functions
//! SQLite does not have. [`SqlSanitizer`] strips the wrapping, completes the
//! obvious truncations and then applies an ordered, extensible set of
//! [`RewriteRule`]s.

use regex::Regex;

/// A single dialect correction
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: &'static str,
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// `pattern` uses `regex` syntax; `replacement` may reference groups as `${1}`
    pub fn new(
        name: &'static str,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn apply(&self, sql: &str) -> String {
        self.pattern
            .replace_all(sql, self.replacement.as_str())
            .into_owned()
    }
}

/// Built-in dialect rules: (name, pattern, replacement)
const STANDARD_RULES: &[(&str, &str, &str)] = &[
    (
        "extract_hour",
        r"(?i)\bEXTRACT\s*\(\s*HOUR\s+FROM\s+([^()]+?)\s*\)",
        "CAST(substr(${1}, 1, 2) AS INTEGER)",
    ),
    (
        "hour",
        r"(?i)\bHOUR\s*\(\s*([^()]+?)\s*\)",
        "CAST(substr(${1}, 1, 2) AS INTEGER)",
    ),
    (
        "date_format",
        r"(?i)\bDATE_FORMAT\s*\(\s*([^(),]+?)\s*,\s*('[^']*')\s*\)",
        "strftime(${2}, ${1})",
    ),
    (
        "date_trunc_month",
        r"(?i)\bDATE_TRUNC\s*\(\s*'month'\s*,\s*([^()]+?)\s*\)",
        "strftime('%Y-%m', ${1})",
    ),
    (
        "month",
        r"(?i)\bMONTH\s*\(\s*([^()]+?)\s*\)",
        "CAST(strftime('%m', ${1}) AS INTEGER)",
    ),
    (
        "year",
        r"(?i)\bYEAR\s*\(\s*([^()]+?)\s*\)",
        "CAST(strftime('%Y', ${1}) AS INTEGER)",
    ),
    ("now", r"(?i)\bNOW\s*\(\s*\)", "datetime('now')"),
];

/// Cleans raw model output into a single SQLite statement
#[derive(Debug, Clone)]
pub struct SqlSanitizer {
    rules: Vec<RewriteRule>,
}

impl Default for SqlSanitizer {
    fn default() -> Self {
        let rules = STANDARD_RULES
            .iter()
            .filter_map(|&(name, pattern, replacement)| {
                RewriteRule::new(name, pattern, replacement).ok()
            })
            .collect();
        Self { rules }
    }
}

impl SqlSanitizer {
    /// Sanitizer with no dialect rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; rules run in insertion order
    pub fn with_rule(mut self, rule: RewriteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn sanitize(&self, raw: &str) -> String {
        let text = strip_reasoning(raw);
        let text = strip_code_fences(&text);
        let mut sql = strip_terminators(&text);

        for rule in &self.rules {
            sql = rule.apply(&sql);
        }

        complete_order_by(&sql)
    }
}

/// Remove `<think>...</think>` blocks; an unterminated block runs to the end
fn strip_reasoning(text: &str) -> String {
    let mut out = text.to_string();
    while let Some(start) = out.find("<think>") {
        match out[start..].find("</think>") {
            Some(rel_end) => {
                let end = start + rel_end + "</think>".len();
                out.replace_range(start..end, "");
            }
            None => out.truncate(start),
        }
    }
    // Some models omit the opening tag
    if let Some(end) = out.find("</think>") {
        out = out[end + "</think>".len()..].to_string();
    }
    out
}

fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if !text.contains("```") {
        return text.to_string();
    }
    let inner = text.split("```").nth(1).unwrap_or(text);
    let inner = inner.trim_start();
    let inner = ["sqlite", "sql", "SQL"]
        .iter()
        .find_map(|tag| inner.strip_prefix(tag))
        .unwrap_or(inner);
    inner.trim().to_string()
}

fn strip_terminators(text: &str) -> String {
    text.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string()
}

fn complete_order_by(sql: &str) -> String {
    let sql = sql.trim_end();
    let upper = sql.to_uppercase();

    if upper.ends_with(" ORDER") {
        return format!("{} BY COUNT(*) DESC", sql);
    }
    if upper.ends_with(" ORDER BY") {
        return format!("{} COUNT(*) DESC", sql);
    }
    if upper.contains("GROUP BY")
        && !upper.contains("ORDER BY")
        && !upper.contains(" LIMIT ")
        && upper.contains("COUNT(")
    {
        return format!("{} ORDER BY COUNT(*) DESC", sql);
    }
    sql.to_string()
}
