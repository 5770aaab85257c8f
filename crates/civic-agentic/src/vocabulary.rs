//! Demographic vocabulary
//!
//! The only user-derived values ever embedded in a pattern template come from
//! this fixed table, never from the question text itself.

/// A named demographic group and the words that refer to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemographicGroup {
    /// Stored (lower-case) value in `driver_race`
    pub value: &'static str,
    /// Display label
    pub label: &'static str,
    terms: &'static [&'static str],
}

pub const RACE_GROUPS: &[DemographicGroup] = &[
    DemographicGroup {
        value: "black",
        label: "Black",
        terms: &["black", "blacks", "african"],
    },
    DemographicGroup {
        value: "white",
        label: "White",
        terms: &["white", "whites", "caucasian", "caucasians"],
    },
    DemographicGroup {
        value: "hispanic",
        label: "Hispanic",
        terms: &["hispanic", "hispanics", "latino", "latinos", "latina", "latinx"],
    },
    DemographicGroup {
        value: "asian",
        label: "Asian",
        terms: &["asian", "asians"],
    },
    // Stored value only: "other" in a question is ordinary English
    DemographicGroup {
        value: "other",
        label: "Other",
        terms: &[],
    },
];

const GENDER_TERMS: &[&str] = &["gender", "sex", "male", "female", "men", "women"];

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

impl DemographicGroup {
    fn matches_word(&self, word: &str) -> bool {
        self.terms.contains(&word)
    }

    /// Look up a group by a word or stored value (case-insensitive)
    pub fn find(word: &str) -> Option<&'static DemographicGroup> {
        let word = word.trim().to_lowercase();
        RACE_GROUPS
            .iter()
            .find(|g| g.value == word || g.matches_word(&word))
    }
}

/// Groups named in the question, in order of first mention, without repeats
pub fn groups_in(question_lower: &str) -> Vec<&'static DemographicGroup> {
    let mut found: Vec<&'static DemographicGroup> = Vec::new();
    for word in words(question_lower) {
        if let Some(group) = RACE_GROUPS.iter().find(|g| g.matches_word(word)) {
            if !found.contains(&group) {
                found.push(group);
            }
        }
    }
    found
}

/// Whether the question refers to race, either generically or by naming a group
pub fn mentions_race(question_lower: &str) -> bool {
    question_lower.contains("race")
        || question_lower.contains("ethnic")
        || !groups_in(question_lower).is_empty()
}

/// Whether the question refers to gender
pub fn mentions_gender(question_lower: &str) -> bool {
    words(question_lower).any(|w| GENDER_TERMS.contains(&w))
}
