//! Dataset descriptors and the catalog of known department sources
//!
//! Only real published datasets are accepted. The HTTP download itself happens
//! outside this crate; callers try [`KnownSource::candidates`] in order and
//! hand the bytes with the matching descriptor to [`crate::loader::DatasetLoader`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::IngestionError;

/// Describes where a payload came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub source_name: String,
    /// Free-form format label, e.g. `CSV (ZIP compressed)`
    pub format: String,
    pub last_updated: String,
    pub description: String,
    pub url: String,
}

const SYNTHETIC_MARKERS: &[&str] = &["synthetic", "mock", "fake", "generated", "dummy"];

impl SourceDescriptor {
    pub fn new(
        source_name: impl Into<String>,
        format: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            format: format.into(),
            last_updated: String::new(),
            description: String::new(),
            url: url.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_last_updated(mut self, last_updated: impl Into<String>) -> Self {
        self.last_updated = last_updated.into();
        self
    }

    /// Reject sources that declare themselves as generated data
    pub fn ensure_real(&self) -> Result<(), IngestionError> {
        let label = format!("{} {}", self.source_name, self.description).to_lowercase();
        match SYNTHETIC_MARKERS.iter().find(|m| label.contains(*m)) {
            Some(marker) => {
                warn!("Rejecting {} source '{}'", marker, self.source_name);
                Err(IngestionError::SyntheticSource(self.source_name.clone()))
            }
            None => Ok(()),
        }
    }
}

/// A department with a published stop dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownSource {
    pub key: &'static str,
    pub department: &'static str,
    aliases: &'static [&'static str],
    pub description: &'static str,
    pub portal: &'static str,
    pub primary_url: &'static str,
    pub backup_url: &'static str,
}

const STANFORD_OPEN_POLICING: &str = "Stanford Open Policing Project";

const KNOWN_SOURCES: &[KnownSource] = &[
    KnownSource {
        key: "seattle",
        department: "Seattle Police Department",
        aliases: &["seattle"],
        description: "Seattle Police Department traffic stops (319,959 records, 2006-2015)",
        portal: "Seattle.gov Open Data",
        primary_url: "https://stacks.stanford.edu/file/druid:yg821jf8611/yg821jf8611_wa_seattle_2020_04_01.csv.zip",
        backup_url: "https://data.seattle.gov/api/views/28ny-9ts8/rows.csv?accessType=DOWNLOAD",
    },
    KnownSource {
        key: "philadelphia",
        department: "Philadelphia Police Department",
        aliases: &["philadelphia", "philly"],
        description: "Philadelphia Police Department traffic stops",
        portal: "Philadelphia Open Data",
        primary_url: "https://stacks.stanford.edu/file/druid:yg821jf8611/yg821jf8611_pa_philadelphia_2020_04_01.csv.zip",
        backup_url: "https://www.opendataphilly.org/dataset/police-complaints/resource/934f32d8-d8b6-4ba9-8ce1-5e9b4c8bb1cb",
    },
    KnownSource {
        key: "chicago",
        department: "Chicago Police Department",
        aliases: &["chicago"],
        description: "Chicago Police Department traffic stops",
        portal: "Chicago Data Portal",
        primary_url: "https://stacks.stanford.edu/file/druid:yg821jf8611/yg821jf8611_il_chicago_2020_04_01.csv.zip",
        backup_url: "https://data.cityofchicago.org/api/views/ijzp-q8t2/rows.csv?accessType=DOWNLOAD",
    },
    KnownSource {
        key: "los_angeles",
        department: "Los Angeles Police Department",
        aliases: &["los angeles", "lapd"],
        description: "Los Angeles Police Department traffic stops",
        portal: "LA Open Data",
        primary_url: "https://stacks.stanford.edu/file/druid:yg821jf8611/yg821jf8611_ca_los_angeles_2020_04_01.csv.zip",
        backup_url: "https://data.lacity.org/api/views/2nrs-mtv8/rows.csv?accessType=DOWNLOAD",
    },
];

impl KnownSource {
    /// Download order: primary first, then the portal backup
    pub fn candidates(&self) -> [SourceDescriptor; 2] {
        [self.descriptor(), self.backup_descriptor()]
    }

    /// Descriptor for the primary download
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(STANFORD_OPEN_POLICING, "CSV (ZIP compressed)", self.primary_url)
            .with_description(self.description)
            .with_last_updated("2020-04-01")
    }

    fn backup_descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(self.portal, "CSV", self.backup_url)
            .with_description(self.description)
    }
}

/// Lookup over the known department sources
pub struct SourceCatalog;

impl SourceCatalog {
    pub fn available_departments() -> Vec<&'static str> {
        KNOWN_SOURCES.iter().map(|s| s.department).collect()
    }

    /// Find the source for a free-form department name
    pub fn find(department: &str) -> Option<&'static KnownSource> {
        let lowered = department.to_lowercase();
        let found = KNOWN_SOURCES
            .iter()
            .find(|s| s.aliases.iter().any(|a| lowered.contains(a)));
        if found.is_none() {
            warn!(
                "No real data found for {}. Available departments: {}",
                department,
                Self::available_departments().join(", ")
            );
        }
        found
    }
}
