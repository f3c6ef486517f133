// casewatch-core/src/domain/record.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::configuration::ColumnMapping;

// --- RAW SIDE (untyped, ephemeral) ---

/// One data row exactly as the source delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based line in the payload (header is line 1).
    pub line: usize,
    pub values: Vec<String>,
}

/// A header + rows, plus the mapping of the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
    pub mapping: ColumnMapping,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Header names the mapping needs but the payload lacks.
    pub fn missing_columns(&self) -> Vec<String> {
        self.mapping
            .required_columns()
            .into_iter()
            .filter(|c| self.column_index(c).is_none())
            .map(str::to_string)
            .collect()
    }
}

// --- CANONICAL SIDE ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    MissingDateFilled,
    NegativeValueCorrected,
    PopulationUnavailable,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::MissingDateFilled => "missing_date_filled",
            QualityFlag::NegativeValueCorrected => "negative_value_corrected",
            QualityFlag::PopulationUnavailable => "population_unavailable",
        }
    }

    /// `a|b` form used by the snapshot file and the store column.
    pub fn join(flags: &BTreeSet<QualityFlag>) -> String {
        flags
            .iter()
            .map(QualityFlag::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn split(joined: &str) -> Result<BTreeSet<QualityFlag>, String> {
        joined
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(QualityFlag::from_str)
            .collect()
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_date_filled" => Ok(QualityFlag::MissingDateFilled),
            "negative_value_corrected" => Ok(QualityFlag::NegativeValueCorrected),
            "population_unavailable" => Ok(QualityFlag::PopulationUnavailable),
            other => Err(format!("Unknown quality flag '{}'", other)),
        }
    }
}

/// The canonical unit of the pipeline. Keyed by `(region_code, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub region_code: String,
    pub date: NaiveDate,
    /// Cumulative. Can be negative until the validator has run.
    pub confirmed_cases: i64,
    /// Cumulative. Can be negative until the validator has run.
    pub deaths: i64,
    pub population: Option<i64>,
    pub incidence_per_100k: Option<f64>,
    pub new_cases: Option<i64>,
    pub new_deaths: Option<i64>,
    pub new_cases_avg_7d: Option<f64>,
    #[serde(default)]
    pub quality_flags: BTreeSet<QualityFlag>,
}

impl CaseRecord {
    /// A freshly normalized record: no derived metrics, no flags.
    pub fn new(
        region_code: impl Into<String>,
        date: NaiveDate,
        confirmed_cases: i64,
        deaths: i64,
        population: Option<i64>,
    ) -> Self {
        Self {
            region_code: region_code.into(),
            date,
            confirmed_cases,
            deaths,
            population,
            incidence_per_100k: None,
            new_cases: None,
            new_deaths: None,
            new_cases_avg_7d: None,
            quality_flags: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.region_code, self.date)
    }

    pub fn has_flag(&self, flag: QualityFlag) -> bool {
        self.quality_flags.contains(&flag)
    }

    pub fn flag(&mut self, flag: QualityFlag) {
        self.quality_flags.insert(flag);
    }
}
