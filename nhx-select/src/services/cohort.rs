//! Subject list resolution
//!
//! Subjects come from one of two places:
//! - every directory directly under the source root, sorted
//! - the identifier column of a cohort table, filtered by requirement groups
//!
//! A requirement is in conjunctive normal form: every group must have at
//! least one satisfied alternative for the row to be kept.

use crate::services::tree_scanner::TreeScanner;
use nhx_common::table::{parse_number, Table};
use nhx_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One accepted alternative: `column` holds any of `values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub column: String,
    pub values: Vec<String>,
}

impl ColumnMatch {
    /// Trimmed string equality, or numeric equality when both sides parse
    /// (so `2` matches `2.0`)
    fn accepts(&self, cell: Option<&str>) -> bool {
        let Some(cell) = cell else {
            return false;
        };
        let cell = cell.trim();
        self.values.iter().any(|v| {
            let v = v.trim();
            if v == cell {
                return true;
            }
            matches!((parse_number(v), parse_number(cell)), (Some(a), Some(b)) if a == b)
        })
    }
}

/// Alternatives joined by OR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementGroup {
    pub any_of: Vec<ColumnMatch>,
}

/// Cohort table settings (`[select.cohort]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortConfig {
    pub table: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Groups joined by AND; empty keeps every row
    #[serde(default)]
    pub require: Vec<RequirementGroup>,
}

fn default_id_column() -> String {
    "PATNO".to_string()
}

/// Every directory under `source_root`, sorted by name
pub fn subjects_from_tree(scanner: &TreeScanner, source_root: &Path) -> Result<Vec<String>> {
    let dirs = scanner
        .list_dirs(source_root)
        .map_err(|e| Error::Config(format!("Cannot list source root: {}", e)))?;
    Ok(dirs
        .iter()
        .filter_map(|d| d.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect())
}

/// Subject identifiers from a cohort table, in table order, deduplicated
pub fn subjects_from_table(config: &CohortConfig) -> Result<Vec<String>> {
    let table = Table::read(&config.table).map_err(|e| match e {
        Error::NotFound(path) => Error::Config(format!("Cohort table not found: {}", path)),
        other => other,
    })?;
    let subjects = filter_cohort(&table, config)?;

    tracing::info!(
        table = %config.table.display(),
        rows = table.len(),
        subjects = subjects.len(),
        "Cohort loaded"
    );
    Ok(subjects)
}

/// Apply the requirement groups to an in-memory cohort table
pub fn filter_cohort(table: &Table, config: &CohortConfig) -> Result<Vec<String>> {
    let id_col = table.column_index(&config.id_column).ok_or_else(|| {
        Error::Config(format!(
            "Cohort table has no identifier column '{}'",
            config.id_column
        ))
    })?;

    // Resolve every referenced column up front
    let mut groups: Vec<Vec<(usize, &ColumnMatch)>> = Vec::with_capacity(config.require.len());
    for group in &config.require {
        let mut resolved = Vec::with_capacity(group.any_of.len());
        for alt in &group.any_of {
            let col = table.column_index(&alt.column).ok_or_else(|| {
                Error::Config(format!("Cohort table has no column '{}'", alt.column))
            })?;
            resolved.push((col, alt));
        }
        groups.push(resolved);
    }

    let mut seen = HashSet::new();
    let mut subjects = Vec::new();
    for row in 0..table.len() {
        let Some(id) = table.value(row, id_col) else {
            continue;
        };
        let keep = groups
            .iter()
            .all(|group| group.iter().any(|(col, alt)| alt.accepts(table.value(row, *col))));
        if keep && seen.insert(id.to_string()) {
            subjects.push(id.to_string());
        }
    }
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort_table() -> Table {
        let csv = "PATNO,COHORT,COHORT_DEFINITION,ENROLL_STATUS\n\
                   3001,2,Healthy Control,Enrolled\n\
                   3002,1,Parkinson's Disease,Enrolled\n\
                   3003,,Healthy Control,Enrolled\n\
                   3004,2,Healthy Control,Withdrew\n\
                   3001,2,Healthy Control,Enrolled\n\
                   ,2,Healthy Control,Enrolled\n";
        Table::from_reader(csv.as_bytes(), b',').unwrap()
    }

    fn healthy_enrolled() -> CohortConfig {
        CohortConfig {
            table: PathBuf::from("participants.csv"),
            id_column: "PATNO".to_string(),
            require: vec![
                RequirementGroup {
                    any_of: vec![
                        ColumnMatch {
                            column: "COHORT".to_string(),
                            values: vec!["2".to_string()],
                        },
                        ColumnMatch {
                            column: "COHORT_DEFINITION".to_string(),
                            values: vec!["Healthy Control".to_string()],
                        },
                    ],
                },
                RequirementGroup {
                    any_of: vec![ColumnMatch {
                        column: "ENROLL_STATUS".to_string(),
                        values: vec!["Enrolled".to_string()],
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_requirement_groups() {
        let subjects = filter_cohort(&cohort_table(), &healthy_enrolled()).unwrap();
        assert_eq!(subjects, vec!["3001", "3003"]);
    }

    #[test]
    fn test_no_requirements_keeps_all_ids() {
        let config = CohortConfig {
            require: Vec::new(),
            ..healthy_enrolled()
        };
        let subjects = filter_cohort(&cohort_table(), &config).unwrap();
        assert_eq!(subjects, vec!["3001", "3002", "3003", "3004"]);
    }

    #[test]
    fn test_numeric_value_match() {
        let m = ColumnMatch {
            column: "COHORT".to_string(),
            values: vec!["2".to_string()],
        };
        assert!(m.accepts(Some("2.0")));
        assert!(m.accepts(Some(" 2 ")));
        assert!(!m.accepts(Some("1")));
        assert!(!m.accepts(None));
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let mut config = healthy_enrolled();
        config.id_column = "SUBJECT".to_string();
        assert!(matches!(
            filter_cohort(&cohort_table(), &config),
            Err(Error::Config(_))
        ));

        let mut config = healthy_enrolled();
        config.require[1].any_of[0].column = "STATUS".to_string();
        assert!(matches!(
            filter_cohort(&cohort_table(), &config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_table_is_config_error() {
        let config = CohortConfig {
            table: PathBuf::from("/nonexistent/participants.csv"),
            ..healthy_enrolled()
        };
        assert!(matches!(subjects_from_table(&config), Err(Error::Config(_))));
    }
}
