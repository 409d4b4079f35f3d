//! Dataset inference from identifier structure
//!
//! **Algorithm:** evaluate an ordered rule list against the raw identifier;
//! the first rule whose conditions all hold names the dataset. No match
//! gives [`DatasetLabel::Unknown`], which callers count and report.
//!
//! Matching is case-sensitive: the naming conventions are exact tokens
//! (`OAS2_`, `_S_`), not words.

use crate::models::DatasetLabel;
use serde::{Deserialize, Serialize};

/// One inference rule; every present condition must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRule {
    /// Identifier starts with this token
    #[serde(default)]
    pub prefix: Option<String>,
    /// Identifier contains this token anywhere
    #[serde(default)]
    pub contains: Option<String>,
    pub label: DatasetLabel,
}

impl InferenceRule {
    pub fn new(prefix: Option<&str>, contains: Option<&str>, label: DatasetLabel) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            contains: contains.map(str::to_string),
            label,
        }
    }

    /// A rule without conditions never matches
    pub fn matches(&self, id: &str) -> bool {
        if self.prefix.is_none() && self.contains.is_none() {
            return false;
        }
        let prefix_ok = self.prefix.as_deref().map_or(true, |p| id.starts_with(p));
        let contains_ok = self.contains.as_deref().map_or(true, |c| id.contains(c));
        prefix_ok && contains_ok
    }
}

/// Rule order used by the multi-cohort exports
pub fn default_rules() -> Vec<InferenceRule> {
    vec![
        InferenceRule::new(Some("sub-"), Some("OAS"), DatasetLabel::Oasis3),
        InferenceRule::new(Some("sub-"), Some("IXI"), DatasetLabel::Ixi),
        InferenceRule::new(Some("sub-"), Some("PPMI"), DatasetLabel::Ppmi),
        InferenceRule::new(Some("sub-"), Some("SRPB"), DatasetLabel::Srpbs),
        InferenceRule::new(None, Some("_S_"), DatasetLabel::Adni),
        InferenceRule::new(Some("OAS2_"), None, DatasetLabel::Oasis2),
        InferenceRule::new(Some("OAS1_"), None, DatasetLabel::Oasis1),
    ]
}

/// Ordered rule evaluator
#[derive(Debug, Clone)]
pub struct DatasetInference {
    rules: Vec<InferenceRule>,
}

impl DatasetInference {
    pub fn new(rules: Vec<InferenceRule>) -> Self {
        Self { rules }
    }

    pub fn infer(&self, raw_id: &str) -> DatasetLabel {
        let id = raw_id.trim();
        self.rules
            .iter()
            .find(|rule| rule.matches(id))
            .map(|rule| rule.label)
            .unwrap_or(DatasetLabel::Unknown)
    }
}

impl Default for DatasetInference {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let inference = DatasetInference::default();
        let cases = [
            ("sub-OAS30001", DatasetLabel::Oasis3),
            ("sub-IXI002", DatasetLabel::Ixi),
            ("sub-PPMI3001", DatasetLabel::Ppmi),
            ("sub-SRPBS1001", DatasetLabel::Srpbs),
            ("002_S_0295", DatasetLabel::Adni),
            ("OAS2_0001", DatasetLabel::Oasis2),
            ("OAS1_0001_MR1", DatasetLabel::Oasis1),
            ("3001", DatasetLabel::Unknown),
            ("sub-3001", DatasetLabel::Unknown),
            ("", DatasetLabel::Unknown),
        ];
        for (id, expected) in cases {
            assert_eq!(inference.infer(id), expected, "identifier {:?}", id);
        }
    }

    #[test]
    fn test_first_match_wins() {
        // Carries both an OASIS-3 token and the ADNI infix
        let inference = DatasetInference::default();
        assert_eq!(inference.infer("sub-OAS_S_01"), DatasetLabel::Oasis3);
        // No sub- rule fires, so the ADNI infix decides
        assert_eq!(inference.infer("sub-002_S_0295"), DatasetLabel::Adni);
    }

    #[test]
    fn test_case_sensitive_tokens() {
        let inference = DatasetInference::default();
        assert_eq!(inference.infer("oas2_0001"), DatasetLabel::Unknown);
    }

    #[test]
    fn test_rule_without_conditions_never_matches() {
        let inference = DatasetInference::new(vec![InferenceRule::new(None, None, DatasetLabel::Ixi)]);
        assert_eq!(inference.infer("anything"), DatasetLabel::Unknown);
    }
}
