//! Hard/soft null diagnosis.
//!
//! Hard nulls are cells a generic missing-value check catches (empty cells,
//! `NaN`). Soft nulls are real values that stand in for "no data" in this
//! dataset: infinities, a `-1` sentinel, placeholder strings and a zeroed
//! address. They are counted separately because soft nulls may carry signal
//! (a `0.0.0.0` source address can correlate with malicious traffic).
//!
//! Diagnosis is read-only: the table comes back exactly as it went in.

use crate::error::{Result, WrangleError};
use crate::table::{Column, ColumnData, ColumnKind, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Values treated as soft nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisCriteria {
    /// Exact text values counted as placeholders in text columns.
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,
    /// Literal marking an invalid address in address columns.
    #[serde(default = "default_invalid_address")]
    pub invalid_address: String,
    /// Numeric sentinel meaning "not applicable".
    #[serde(default = "default_negative_sentinel")]
    pub negative_sentinel: i64,
    /// Case-insensitive column-name fragments identifying address columns.
    #[serde(default = "default_address_markers")]
    pub address_markers: Vec<String>,
}

impl Default for DiagnosisCriteria {
    fn default() -> Self {
        Self {
            placeholders: default_placeholders(),
            invalid_address: default_invalid_address(),
            negative_sentinel: default_negative_sentinel(),
            address_markers: default_address_markers(),
        }
    }
}

fn default_placeholders() -> Vec<String> {
    ["", " ", "?", "None", "nan", "NULL"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_invalid_address() -> String {
    "0.0.0.0".to_string()
}

fn default_negative_sentinel() -> i64 {
    -1
}

fn default_address_markers() -> Vec<String> {
    vec!["ADDR".to_string(), "IP".to_string()]
}

impl DiagnosisCriteria {
    /// Whether a column name looks like it holds addresses.
    pub fn is_address_column(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.address_markers
            .iter()
            .any(|marker| upper.contains(&marker.to_uppercase()))
    }
}

/// Per-column counts of hard and soft nulls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDiagnosis {
    #[serde(rename = "hardNulls")]
    pub hard_nulls: usize,
    pub infs: usize,
    pub negatives: usize,
    pub placeholders: usize,
    pub bad_ips: usize,
}

impl ColumnDiagnosis {
    pub fn total(&self) -> usize {
        self.hard_nulls + self.infs + self.negatives + self.placeholders + self.bad_ips
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    /// Nonzero categories, labelled as they appear in the printed report.
    pub fn findings(&self) -> Vec<(&'static str, usize)> {
        [
            ("hardNulls", self.hard_nulls),
            ("infs", self.infs),
            ("negatives", self.negatives),
            ("placeholders", self.placeholders),
            ("bad_ips", self.bad_ips),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }
}

/// Diagnosis of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReport {
    pub column: String,
    pub kind: ColumnKind,
    #[serde(flatten)]
    pub counts: ColumnDiagnosis,
}

/// Diagnosis of a whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub total_rows: usize,
    pub duplicate_rows: usize,
    pub criteria: DiagnosisCriteria,
    pub columns: Vec<ColumnReport>,
}

impl DiagnosisReport {
    /// Scan every column of `table`.
    pub fn from_table(table: &Table, criteria: &DiagnosisCriteria) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|column| ColumnReport {
                column: column.name.clone(),
                kind: column.kind(),
                counts: diagnose_column(column, criteria),
            })
            .collect();
        Self {
            total_rows: table.height(),
            duplicate_rows: table.duplicate_rows(),
            criteria: criteria.clone(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDiagnosis> {
        self.columns
            .iter()
            .find(|c| c.column == name)
            .map(|c| &c.counts)
    }

    /// Columns with at least one finding.
    pub fn flagged(&self) -> impl Iterator<Item = &ColumnReport> {
        self.columns.iter().filter(|c| !c.counts.is_clean())
    }

    pub fn is_clean(&self) -> bool {
        self.duplicate_rows == 0 && self.flagged().next().is_none()
    }
}

/// Count hard and soft nulls in a single column.
pub fn diagnose_column(column: &Column, criteria: &DiagnosisCriteria) -> ColumnDiagnosis {
    let hard_nulls = (0..column.len()).filter(|&row| column.data.is_null(row)).count();
    let mut counts = ColumnDiagnosis {
        hard_nulls,
        ..ColumnDiagnosis::default()
    };

    match &column.data {
        ColumnData::Int(values) => {
            counts.negatives = values
                .iter()
                .filter(|v| **v == Some(criteria.negative_sentinel))
                .count();
        }
        ColumnData::Float(values) => {
            let sentinel = criteria.negative_sentinel as f64;
            for value in values.iter().flatten() {
                if value.is_infinite() {
                    counts.infs += 1;
                } else if *value == sentinel {
                    counts.negatives += 1;
                }
            }
        }
        ColumnData::Text(values) => {
            let present = || values.iter().flatten();
            counts.placeholders = present()
                .filter(|v| criteria.placeholders.iter().any(|p| p == *v))
                .count();
            if criteria.is_address_column(&column.name) {
                counts.bad_ips = present()
                    .filter(|v| **v == criteria.invalid_address)
                    .count();
            }
        }
    }
    counts
}

/// A diagnosed table together with its report.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub table: Table,
    pub report: DiagnosisReport,
}

/// Diagnose `table`, or the table stored at `path` when none is given.
pub fn diagnose_missing_values(
    table: Option<Table>,
    path: &Path,
    criteria: &DiagnosisCriteria,
) -> Result<Diagnosis> {
    let table = match table {
        Some(table) => table,
        None => {
            tracing::info!(path = %path.display(), "no table provided, loading from file");
            if !path.exists() {
                return Err(WrangleError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Table::read_csv(path)?
        }
    };

    let report = DiagnosisReport::from_table(&table, criteria);
    tracing::info!(
        rows = report.total_rows,
        duplicates = report.duplicate_rows,
        flagged_columns = report.flagged().count(),
        "diagnosis complete"
    );
    Ok(Diagnosis { table, report })
}
