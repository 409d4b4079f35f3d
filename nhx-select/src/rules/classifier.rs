//! Series label classification against inclusion/exclusion pattern tables

use serde::{Deserialize, Serialize};

/// Case-insensitive label matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Pattern {
    /// Label contains the text anywhere
    Contains(String),
    /// Label starts with the text
    Prefix(String),
}

impl Pattern {
    pub fn contains(text: impl Into<String>) -> Self {
        Pattern::Contains(text.into())
    }

    pub fn prefix(text: impl Into<String>) -> Self {
        Pattern::Prefix(text.into())
    }

    pub fn matches(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        match self {
            Pattern::Contains(text) => label.contains(&text.to_lowercase()),
            Pattern::Prefix(text) => label.starts_with(&text.to_lowercase()),
        }
    }
}

/// Outcome of classifying a raw series label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    /// Known structural scan naming convention
    Include,
    /// Non-diagnostic or calibration series
    Exclude,
    /// Matches neither table; dropped from candidacy
    Unclassified,
}

/// Non-diagnostic / calibration series
pub fn default_exclude_patterns() -> Vec<Pattern> {
    vec![
        Pattern::contains("localizer"),
        Pattern::contains("scout"),
        Pattern::contains("calibration"),
    ]
}

/// Structural T1 naming conventions
pub fn default_include_patterns() -> Vec<Pattern> {
    vec![
        Pattern::contains("t1"),
        Pattern::contains("mprage"),
        Pattern::contains("fspgr"),
        Pattern::contains("spgr"),
    ]
}

/// Pure classifier over (label, pattern tables)
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    exclude: Vec<Pattern>,
    include: Vec<Pattern>,
}

impl PatternClassifier {
    pub fn new(exclude: Vec<Pattern>, include: Vec<Pattern>) -> Self {
        Self { exclude, include }
    }

    /// Exclusion is checked first; a label matching both tables is excluded.
    pub fn classify(&self, label: &str) -> Classification {
        if self.exclude.iter().any(|p| p.matches(label)) {
            Classification::Exclude
        } else if self.include.iter().any(|p| p.matches(label)) {
            Classification::Include
        } else {
            Classification::Unclassified
        }
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(default_exclude_patterns(), default_include_patterns())
    }
}
