//! Subject identifier normalization
//!
//! Datasets spell the same subject differently: the standardized layout
//! writes `sub-OAS30001`, a measurement export writes `OAS30001`. Joins are
//! done on the normalized form, with known prefix tokens stripped.

/// Prefix tokens stripped by default
pub const DEFAULT_PREFIXES: &[&str] = &["sub-"];

/// Strips known dataset-prefix tokens from subject identifiers
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    prefixes: Vec<String>,
}

impl IdentifierNormalizer {
    /// Create a normalizer for the given prefix tokens
    ///
    /// Empty tokens are dropped; they would match every identifier.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Normalize a raw identifier
    ///
    /// Surrounding whitespace is trimmed, then leading prefix tokens are
    /// stripped (exact, case-sensitive match) until none matches. Stripping
    /// to a fixed point keeps the operation idempotent even for identifiers
    /// such as `sub-sub-01`.
    pub fn normalize(&self, raw: &str) -> String {
        let mut current = raw.trim();
        loop {
            let stripped = self
                .prefixes
                .iter()
                .find_map(|p| current.strip_prefix(p.as_str()));
            match stripped {
                Some(rest) => current = rest,
                None => return current.to_string(),
            }
        }
    }
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bids_prefix() {
        let n = IdentifierNormalizer::default();
        assert_eq!(n.normalize("sub-OAS30001"), "OAS30001");
        assert_eq!(n.normalize("3001"), "3001");
    }

    #[test]
    fn test_prefix_must_lead() {
        let n = IdentifierNormalizer::default();
        assert_eq!(n.normalize("OAS2_0001_sub-1"), "OAS2_0001_sub-1");
        assert_eq!(n.normalize("SUB-01"), "SUB-01");
    }

    #[test]
    fn test_idempotent() {
        let n = IdentifierNormalizer::new(["sub-", "ses-"]);
        for raw in [
            "sub-01",
            "sub-sub-01",
            "sub-ses-sub-9",
            "002_S_0295",
            "",
            "sub-",
            "  sub-IXI002 ",
        ] {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_empty_prefix_ignored() {
        let n = IdentifierNormalizer::new(["", "sub-"]);
        assert_eq!(n.normalize("7"), "7");
        assert_eq!(n.normalize("sub-7"), "7");
    }
}
