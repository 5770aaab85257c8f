//! Table and column identifiers
//!
//! Everything that ends up interpolated into SQL text passes through here, so
//! the output alphabet is restricted to ASCII letters, digits and `_`.

use std::collections::HashSet;

/// Placeholder table name that generated queries may use
pub const TABLE_PLACEHOLDER: &str = "police_data";

const GENERIC_WORDS: &[&str] = &["police", "department", "dept"];

/// Deterministic table name for a department identifier
///
/// `"Seattle Police Department"` becomes `police_data_seattle`. A name that is
/// already a department table name is returned unchanged.
pub fn table_name_for(department: &str) -> String {
    let lowered = department.trim().to_lowercase();
    if let Some(rest) = lowered.strip_prefix("police_data_") {
        if !rest.is_empty() && is_plain_identifier(&lowered) {
            return lowered;
        }
    }

    let slug = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty() && !GENERIC_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join("_");

    if slug.is_empty() {
        format!("{}_default", TABLE_PLACEHOLDER)
    } else {
        format!("{}_{}", TABLE_PLACEHOLDER, slug)
    }
}

/// Sidecar table holding the metadata record
pub fn metadata_table_for(table: &str) -> String {
    format!("{}_metadata", table)
}

/// ASCII letters, digits and `_`, not starting with a digit
pub fn is_plain_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Make `name` a legal unquoted SQLite identifier
///
/// `position` names an otherwise empty column (`column_3`).
pub fn sanitize_identifier(name: &str, position: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    let out = out.trim_matches('_');

    if out.is_empty() {
        format!("column_{}", position)
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{}", out)
    } else {
        out.to_string()
    }
}

/// Sanitize every name and suffix repeats with `_2`, `_3`, ...
pub fn sanitize_identifiers(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let base = sanitize_identifier(name, i);
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_for_department() {
        assert_eq!(table_name_for("Seattle Police Department"), "police_data_seattle");
        assert_eq!(
            table_name_for("Los Angeles Police Dept."),
            "police_data_los_angeles"
        );
        assert_eq!(table_name_for("  NYPD -- 42nd  "), "police_data_nypd_42nd");
        assert_eq!(table_name_for("Police Department"), "police_data_default");
        assert_eq!(table_name_for("police_data_seattle"), "police_data_seattle");
    }

    #[test]
    fn test_table_name_is_safe() {
        let name = table_name_for("x'; DROP TABLE t; --");
        assert_eq!(name, "police_data_x_drop_table_t");
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Subject Age (yrs)", 0), "subject_age_yrs");
        assert_eq!(sanitize_identifier("2019 count", 0), "c_2019_count");
        assert_eq!(sanitize_identifier("???", 4), "column_4");
        assert_eq!(sanitize_identifier("", 1), "column_1");
    }

    #[test]
    fn test_sanitize_identifiers_dedupes() {
        let names = vec!["Beat".to_string(), "beat".to_string(), "beat ".to_string()];
        assert_eq!(sanitize_identifiers(&names), vec!["beat", "beat_2", "beat_3"]);
    }
}
