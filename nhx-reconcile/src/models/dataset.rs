//! Source cohort labels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known source cohorts, plus `Unknown` for identifiers no rule recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetLabel {
    Adni,
    Ixi,
    Oasis1,
    Oasis2,
    Oasis3,
    Ppmi,
    Srpbs,
    Unknown,
}

impl DatasetLabel {
    /// Every label except `Unknown`
    pub const KNOWN: [DatasetLabel; 7] = [
        DatasetLabel::Adni,
        DatasetLabel::Ixi,
        DatasetLabel::Oasis1,
        DatasetLabel::Oasis2,
        DatasetLabel::Oasis3,
        DatasetLabel::Ppmi,
        DatasetLabel::Srpbs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetLabel::Adni => "ADNI",
            DatasetLabel::Ixi => "IXI",
            DatasetLabel::Oasis1 => "OASIS1",
            DatasetLabel::Oasis2 => "OASIS2",
            DatasetLabel::Oasis3 => "OASIS3",
            DatasetLabel::Ppmi => "PPMI",
            DatasetLabel::Srpbs => "SRPBS",
            DatasetLabel::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != DatasetLabel::Unknown
    }
}

impl fmt::Display for DatasetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized label text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dataset label '{}'", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for DatasetLabel {
    type Err = UnknownLabel;

    /// Case-insensitive; `SRPB` is accepted as an alias of `SRPBS`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADNI" => Ok(DatasetLabel::Adni),
            "IXI" => Ok(DatasetLabel::Ixi),
            "OASIS1" => Ok(DatasetLabel::Oasis1),
            "OASIS2" => Ok(DatasetLabel::Oasis2),
            "OASIS3" => Ok(DatasetLabel::Oasis3),
            "PPMI" => Ok(DatasetLabel::Ppmi),
            "SRPBS" | "SRPB" => Ok(DatasetLabel::Srpbs),
            "UNKNOWN" => Ok(DatasetLabel::Unknown),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}
