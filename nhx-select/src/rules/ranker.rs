//! Priority ranking of included series labels
//!
//! Vendor naming of structural sequences varies; an ordered substring table
//! lets curated canonical names outrank ad-hoc vendor strings. Rank is the
//! 0-based index of the first matching entry (lower is preferred); labels
//! matching no entry get the table length, which is still acceptable.

use super::classifier::Pattern;

/// Canonical sequence names, most preferred first
pub fn default_priority_table() -> Vec<String> {
    [
        "3D_T1-weighted",
        "3D_T1_weighted",
        "MPRAGE_GRAPPA",
        "MPRAGE",
        "SAG_3D_MPRAGE",
        "SAG_3D_T1_MPRAGE",
        "3D_T1_MPRAGE",
        "SAG_3D_FSPGR",
        "SAG_3D_T1_FSPGR",
        "FSPGR",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One (matcher, rank) pair
#[derive(Debug, Clone)]
struct PriorityEntry {
    matcher: Pattern,
    rank: usize,
}

/// Ordered priority table lookup
#[derive(Debug, Clone)]
pub struct PriorityRanker {
    entries: Vec<PriorityEntry>,
}

impl PriorityRanker {
    pub fn new<I, S>(table: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = table
            .into_iter()
            .enumerate()
            .map(|(rank, name)| PriorityEntry {
                matcher: Pattern::Contains(name.into()),
                rank,
            })
            .collect();
        Self { entries }
    }

    pub fn rank(&self, label: &str) -> usize {
        self.entries
            .iter()
            .find(|e| e.matcher.matches(label))
            .map(|e| e.rank)
            .unwrap_or_else(|| self.unranked())
    }

    /// Sentinel rank for labels matching no entry
    pub fn unranked(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PriorityRanker {
    fn default() -> Self {
        Self::new(default_priority_table())
    }
}
