//! Column standardization
//!
//! Each source column is reduced to a [`ColumnKey`] and tested against an
//! ordered table of [`MappingRule`]s; the first predicate that holds names the
//! canonical field. Unmatched columns pass through untouched. Rows are never
//! dropped or reordered.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use super::canonical::CanonicalField;
use crate::table::DataTable;

/// Lower-cased views of a source column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKey {
    /// Trimmed and lower-cased
    pub lower: String,
    /// Lower-cased with every separator removed
    pub compact: String,
    /// Words split on separators and camelCase boundaries
    pub tokens: Vec<String>,
}

impl ColumnKey {
    pub fn new(name: &str) -> Self {
        let trimmed = name.trim();
        Self {
            lower: trimmed.to_lowercase(),
            compact: trimmed
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect(),
            tokens: split_words(trimmed),
        }
    }

    fn has(&self, fragment: &str) -> bool {
        self.compact.contains(fragment)
    }

    fn has_token(&self, word: &str) -> bool {
        self.tokens.iter().any(|t| t == word)
    }

    fn is(&self, compact: &str) -> bool {
        self.compact == compact
    }

    fn officer_qualified(&self) -> bool {
        self.has("officer") || self.has_token("ofc") || self.has_token("ofcr")
    }
}

fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// One entry of the ordered predicate table
pub struct MappingRule {
    pub target: CanonicalField,
    pub matches: fn(&ColumnKey) -> bool,
}

/// Predicates in strict priority order; the first match wins
pub const MAPPING_RULES: &[MappingRule] = &[
    MappingRule {
        target: CanonicalField::DriverRace,
        matches: |k| (k.has("race") || k.has("ethnic")) && !k.officer_qualified(),
    },
    MappingRule {
        target: CanonicalField::DriverGender,
        matches: |k| {
            (k.has("gender") || k.tokens.iter().any(|t| t == "sex" || t.ends_with("sex")))
                && !k.officer_qualified()
        },
    },
    MappingRule {
        target: CanonicalField::DriverAge,
        matches: |k| k.has_token("age") && !k.officer_qualified(),
    },
    MappingRule {
        target: CanonicalField::SearchConducted,
        matches: |k| {
            (k.has("search") && (k.has("conducted") || k.has("performed")))
                || k.has_token("searched")
        },
    },
    MappingRule {
        target: CanonicalField::ContrabandFound,
        matches: |k| (k.has("contraband") && k.has("found")) || k.is("contraband"),
    },
    MappingRule {
        target: CanonicalField::ArrestMade,
        matches: |k| {
            (k.has("arrest") && (k.has("made") || k.has("performed")))
                || k.is("arrest")
                || k.is("arrested")
        },
    },
    MappingRule {
        target: CanonicalField::CitationIssued,
        matches: |k| (k.has("citation") && k.has("issued")) || k.is("citation"),
    },
    MappingRule {
        target: CanonicalField::WarningIssued,
        matches: |k| (k.has("warning") && k.has("issued")) || k.is("warning"),
    },
    MappingRule {
        target: CanonicalField::UseOfForce,
        matches: |k| k.has("force") && (k.has_token("use") || k.has_token("used") || k.has("useof")),
    },
    MappingRule {
        target: CanonicalField::StopOutcome,
        matches: |k| k.has("outcome") || k.has("disposition"),
    },
    MappingRule {
        target: CanonicalField::Lat,
        matches: |k| {
            (k.has_token("lat") || k.has("latitude"))
                && !(k.has_token("lon") || k.has_token("lng") || k.has("longitude"))
        },
    },
    MappingRule {
        target: CanonicalField::Longitude,
        matches: |k| {
            k.has_token("lon") || k.has_token("lng") || k.has_token("long") || k.has("longitude")
        },
    },
    MappingRule {
        target: CanonicalField::District,
        matches: |k| k.has("district") || k.has("precinct"),
    },
    MappingRule {
        target: CanonicalField::StopDate,
        matches: |k| {
            k.tokens.iter().any(|t| {
                t.starts_with("date") || (t.ends_with("date") && !t.ends_with("update"))
            })
        },
    },
    MappingRule {
        target: CanonicalField::Time,
        matches: |k| k.has_token("time"),
    },
];

/// Where one source column went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub source: String,
    /// `None` when no rule matched and the column passed through
    pub target: Option<CanonicalField>,
    /// Lost a duplicate-target conflict and was removed
    pub dropped: bool,
}

/// Result of normalizing one table
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub table: DataTable,
    pub mappings: Vec<ColumnMapping>,
    /// Required fields added as all-null columns
    pub synthesized: Vec<CanonicalField>,
}

/// Maps arbitrary source columns onto the canonical schema
pub struct SchemaNormalizer {
    rules: &'static [MappingRule],
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self {
            rules: MAPPING_RULES,
        }
    }
}

impl SchemaNormalizer {
    /// Canonical field for a single source column name
    pub fn classify(&self, column: &str) -> Option<CanonicalField> {
        let key = ColumnKey::new(column);
        if let Some(field) = CanonicalField::from_name(&key.lower) {
            return Some(field);
        }
        self.rules
            .iter()
            .find(|rule| (rule.matches)(&key))
            .map(|rule| rule.target)
    }

    pub fn normalize(&self, mut table: DataTable) -> NormalizedTable {
        let sources: Vec<String> = table.columns().to_vec();
        let targets: Vec<Option<CanonicalField>> =
            sources.iter().map(|c| self.classify(c)).collect();

        // Winner per canonical target: an exact-name source, else the first claimant
        let mut winners: HashMap<CanonicalField, usize> = HashMap::new();
        for (i, target) in targets.iter().enumerate() {
            let Some(field) = target else { continue };
            let exact = sources[i].trim().eq_ignore_ascii_case(field.name());
            match winners.get(field) {
                None => {
                    winners.insert(*field, i);
                }
                Some(&current) if exact => {
                    let current_exact = sources[current].trim().eq_ignore_ascii_case(field.name());
                    if !current_exact {
                        winners.insert(*field, i);
                    }
                }
                Some(_) => {}
            }
        }

        // Output names form a set: a repeated pass-through name keeps its first column
        let mut keep = Vec::with_capacity(sources.len());
        let mut names = Vec::with_capacity(sources.len());
        let mut emitted = HashSet::with_capacity(sources.len());
        let mut mappings = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let target = targets[i];
            let name = target.map_or_else(|| source.clone(), |f| f.name().to_string());
            let dropped = target.is_some_and(|f| winners.get(&f) != Some(&i))
                || emitted.contains(&name);
            if dropped {
                debug!("Dropping column '{}': duplicate of '{}'", source, name);
            } else {
                keep.push(i);
                emitted.insert(name.clone());
                names.push(name);
            }
            mappings.push(ColumnMapping {
                source: source.clone(),
                target,
                dropped,
            });
        }

        table.select_columns(&keep);
        table.set_columns(names);

        let mut synthesized = Vec::new();
        for field in CanonicalField::REQUIRED {
            if table.column_index(field.name()).is_none() {
                table.push_null_column(field.name());
                synthesized.push(field);
            }
        }

        info!(
            "Standardized {} columns: {} mapped, {} dropped, {} synthesized",
            sources.len(),
            mappings.iter().filter(|m| m.target.is_some() && !m.dropped).count(),
            mappings.iter().filter(|m| m.dropped).count(),
            synthesized.len()
        );

        NormalizedTable {
            table,
            mappings,
            synthesized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: &str) -> Option<&'static str> {
        SchemaNormalizer::default().classify(name).map(|f| f.name())
    }

    fn table(columns: &[&str]) -> DataTable {
        DataTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            vec![columns.iter().map(|c| Some(format!("v_{}", c))).collect()],
        )
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("subjectRace"), vec!["subject", "race"]);
        assert_eq!(split_words("Stop_Date-Time"), vec!["stop", "date", "time"]);
        assert_eq!(split_words("LAT"), vec!["lat"]);
    }

    #[test]
    fn test_classify_common_sources() {
        assert_eq!(classify("race"), Some("driver_race"));
        assert_eq!(classify("Subject Race"), Some("driver_race"));
        assert_eq!(classify("subject_sex"), Some("driver_gender"));
        assert_eq!(classify("Subject Age"), Some("driver_age"));
        assert_eq!(classify("search_conducted"), Some("search_conducted"));
        assert_eq!(classify("Frisk Searched"), Some("search_conducted"));
        assert_eq!(classify("contraband_found"), Some("contraband_found"));
        assert_eq!(classify("arrest"), Some("arrest_made"));
        assert_eq!(classify("Arrest Flag Made"), Some("arrest_made"));
        assert_eq!(classify("citation_issued"), Some("citation_issued"));
        assert_eq!(classify("warning"), Some("warning_issued"));
        assert_eq!(classify("use of force"), Some("use_of_force"));
        assert_eq!(classify("Stop Resolution Outcome"), Some("stop_outcome"));
        assert_eq!(classify("disposition"), Some("stop_outcome"));
        assert_eq!(classify("Latitude"), Some("lat"));
        assert_eq!(classify("lng"), Some("longitude"));
        assert_eq!(classify("Precinct"), Some("district"));
        assert_eq!(classify("date"), Some("stop_date"));
        assert_eq!(classify("Reported Date"), Some("stop_date"));
        assert_eq!(classify("datetime"), Some("stop_date"));
        assert_eq!(classify("Reported Time"), Some("time"));
    }

    #[test]
    fn test_officer_columns_not_driver_fields() {
        assert_eq!(classify("Officer Race"), None);
        assert_eq!(classify("officer_gender"), None);
        assert_eq!(classify("Officer YOB age"), None);
    }

    #[test]
    fn test_no_false_substring_hits() {
        assert_eq!(classify("violation"), None);
        assert_eq!(classify("stage"), None);
        assert_eq!(classify("updated_at"), None);
        assert_eq!(classify("reason_for_stop"), None);
    }

    #[test]
    fn test_exact_name_wins_duplicate() {
        let out = SchemaNormalizer::default().normalize(table(&["lng", "longitude", "lat"]));
        assert_eq!(out.table.columns(), &["longitude", "lat", "stop_date", "driver_race", "driver_gender"]);
        assert_eq!(out.table.rows()[0][0], Some("v_longitude".to_string()));
        assert!(out.mappings[0].dropped);
        assert!(!out.mappings[1].dropped);
    }

    #[test]
    fn test_first_claimant_wins_otherwise() {
        let out = SchemaNormalizer::default().normalize(table(&["subject_race", "race_ethnicity"]));
        assert_eq!(out.table.columns()[0], "driver_race");
        assert_eq!(out.table.rows()[0][0], Some("v_subject_race".to_string()));
        assert_eq!(out.table.column_index("race_ethnicity"), None);
    }

    #[test]
    fn test_repeated_passthrough_names_collapse() {
        let out = SchemaNormalizer::default().normalize(DataTable::new(
            vec!["beat".into(), "beat".into(), "race".into()],
            vec![vec![Some("1".into()), Some("2".into()), Some("white".into())]],
        ));
        assert_eq!(
            out.table.columns(),
            &["beat", "driver_race", "stop_date", "driver_gender"]
        );
        assert_eq!(out.table.rows()[0][0], Some("1".to_string()));
        assert!(!out.mappings[0].dropped);
        assert!(out.mappings[1].dropped);
        assert_eq!(out.mappings[1].target, None);
    }

    #[test]
    fn test_required_fields_synthesized() {
        let out = SchemaNormalizer::default().normalize(table(&["beat", "officer_id"]));
        assert_eq!(
            out.table.columns(),
            &["beat", "officer_id", "stop_date", "driver_race", "driver_gender"]
        );
        assert_eq!(out.table.rows()[0][2], None);
        assert_eq!(out.synthesized.len(), 3);
    }

    #[test]
    fn test_seattle_columns() {
        let out = SchemaNormalizer::default().normalize(table(&["race", "sex", "arrest", "date"]));
        assert_eq!(
            out.table.columns(),
            &["driver_race", "driver_gender", "arrest_made", "stop_date"]
        );
        assert!(out.synthesized.is_empty());
    }
}
