//! Canonical police-stop attributes

use serde::{Deserialize, Serialize};
use std::fmt;

/// One attribute of the canonical stop record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    StopDate,
    Time,
    DriverRace,
    DriverGender,
    DriverAge,
    SearchConducted,
    ContrabandFound,
    ArrestMade,
    CitationIssued,
    WarningIssued,
    UseOfForce,
    StopOutcome,
    Lat,
    Longitude,
    District,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 15] = [
        CanonicalField::StopDate,
        CanonicalField::Time,
        CanonicalField::DriverRace,
        CanonicalField::DriverGender,
        CanonicalField::DriverAge,
        CanonicalField::SearchConducted,
        CanonicalField::ContrabandFound,
        CanonicalField::ArrestMade,
        CanonicalField::CitationIssued,
        CanonicalField::WarningIssued,
        CanonicalField::UseOfForce,
        CanonicalField::StopOutcome,
        CanonicalField::Lat,
        CanonicalField::Longitude,
        CanonicalField::District,
    ];

    /// Identity fields present in every stored table
    pub const REQUIRED: [CanonicalField; 3] = [
        CanonicalField::StopDate,
        CanonicalField::DriverRace,
        CanonicalField::DriverGender,
    ];

    /// Column name in the store
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::StopDate => "stop_date",
            CanonicalField::Time => "time",
            CanonicalField::DriverRace => "driver_race",
            CanonicalField::DriverGender => "driver_gender",
            CanonicalField::DriverAge => "driver_age",
            CanonicalField::SearchConducted => "search_conducted",
            CanonicalField::ContrabandFound => "contraband_found",
            CanonicalField::ArrestMade => "arrest_made",
            CanonicalField::CitationIssued => "citation_issued",
            CanonicalField::WarningIssued => "warning_issued",
            CanonicalField::UseOfForce => "use_of_force",
            CanonicalField::StopOutcome => "stop_outcome",
            CanonicalField::Lat => "lat",
            CanonicalField::Longitude => "longitude",
            CanonicalField::District => "district",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// 0/1 outcome flags
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            CanonicalField::SearchConducted
                | CanonicalField::ContrabandFound
                | CanonicalField::ArrestMade
                | CanonicalField::CitationIssued
                | CanonicalField::WarningIssued
                | CanonicalField::UseOfForce
        )
    }

    /// Low-cardinality text columns worth listing in prompts
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            CanonicalField::DriverRace
                | CanonicalField::DriverGender
                | CanonicalField::StopOutcome
                | CanonicalField::District
        )
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for field in CanonicalField::ALL {
            assert_eq!(CanonicalField::from_name(field.name()), Some(field));
        }
        assert_eq!(CanonicalField::from_name("officer_race"), None);
    }

    #[test]
    fn test_flags() {
        assert!(CanonicalField::ArrestMade.is_flag());
        assert!(!CanonicalField::DriverAge.is_flag());
        let categorical: Vec<_> = CanonicalField::ALL
            .into_iter()
            .filter(CanonicalField::is_categorical)
            .map(|f| f.name())
            .collect();
        assert_eq!(
            categorical,
            vec!["driver_race", "driver_gender", "stop_outcome", "district"]
        );
        assert_eq!(
            serde_json::to_string(&CanonicalField::UseOfForce).expect("serialize"),
            "\"use_of_force\""
        );
    }
}
