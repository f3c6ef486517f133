// casewatch-core/src/domain/configuration.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

use crate::domain::error::DomainError;

/// Full pipeline configuration, as read from `casewatch.yaml`.
///
/// Passed explicitly to the fetcher and the sink; there is no global state.
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct PipelineConfig {
    #[validate(length(min = 1, message = "Pipeline name cannot be empty"))]
    pub name: String,

    #[validate(nested)]
    pub sources: SourcesConfig,

    #[validate(nested)]
    pub geography: GeographyConfig,

    #[serde(default)]
    #[validate(nested)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub output: OutputConfig,

    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    #[serde(rename = "clean-targets", default = "default_clean_targets")]
    pub clean_targets: Vec<String>,
}

impl PipelineConfig {
    /// Run the `validator` rules and flatten them into a domain error.
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate()
            .map_err(|e| DomainError::InvalidConfig(e.to_string().replace('\n', "; ")))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct SourcesConfig {
    #[validate(nested)]
    pub primary: SourceConfig,
    #[validate(nested)]
    pub fallback: SourceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct SourceConfig {
    #[validate(length(min = 1, message = "Source name cannot be empty"))]
    pub name: String,

    /// `http(s)://...` or `file://...`
    #[validate(length(min = 1, message = "Source url cannot be empty"))]
    pub url: String,

    #[serde(default)]
    #[validate(nested)]
    pub columns: ColumnMapping,

    /// Body encoding. `None` reads the payload as plain CSV.
    #[serde(default)]
    pub compression: Option<Compression>,

    #[serde(default = "default_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_source_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
}

/// Where each canonical field lives in a source's header.
///
/// Defaults follow the Our World in Data layout.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Validate)]
pub struct ColumnMapping {
    #[serde(default = "default_date_column")]
    #[validate(length(min = 1))]
    pub date: String,

    #[serde(default = "default_region_column")]
    #[validate(length(min = 1))]
    pub region: String,

    #[serde(default = "default_confirmed_column")]
    #[validate(length(min = 1))]
    pub confirmed: String,

    #[serde(default = "default_deaths_column")]
    #[validate(length(min = 1))]
    pub deaths: String,

    #[serde(default = "default_population_column")]
    pub population: Option<String>,

    #[serde(default)]
    pub filter: Option<RowFilter>,

    /// Read an empty `confirmed`/`deaths` cell as 0 instead of rejecting the row.
    /// OWID leaves both blank before a region's first case.
    #[serde(default)]
    pub empty_counts_as_zero: bool,
}

impl ColumnMapping {
    /// Every header a payload must carry to be usable with this mapping.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.date.as_str(),
            self.region.as_str(),
            self.confirmed.as_str(),
            self.deaths.as_str(),
        ];
        if let Some(pop) = &self.population {
            cols.push(pop.as_str());
        }
        if let Some(filter) = &self.filter {
            cols.push(filter.column.as_str());
        }
        cols
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            date: default_date_column(),
            region: default_region_column(),
            confirmed: default_confirmed_column(),
            deaths: default_deaths_column(),
            population: default_population_column(),
            filter: None,
            empty_counts_as_zero: false,
        }
    }
}

/// Keep only rows where `column` equals `equals` (case-insensitive).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RowFilter {
    pub column: String,
    pub equals: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct GeographyConfig {
    /// Raw region name (matched case-insensitively) -> region code.
    #[validate(custom(function = "validate_regions"))]
    pub regions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct NormalizationConfig {
    #[serde(default = "default_max_rejected_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_rejected_fraction: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            max_rejected_fraction: default_max_rejected_fraction(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct OutputConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    #[serde(rename = "target-path", default = "default_target_path")]
    pub target_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            archive_dir: None,
            target_path: default_target_path(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_store_table")]
    #[validate(custom(function = "validate_table_name"))]
    pub table: String,

    #[serde(default = "default_store_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            table: default_store_table(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

// --- CUSTOM RULES ---

fn validate_regions(regions: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if regions.is_empty() {
        return Err(ValidationError::new("regions_empty")
            .with_message("At least one region must be configured".into()));
    }
    if regions
        .iter()
        .any(|(name, code)| name.trim().is_empty() || code.trim().is_empty())
    {
        return Err(ValidationError::new("region_blank")
            .with_message("Region names and codes cannot be blank".into()));
    }
    Ok(())
}

/// The table name is interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<(), ValidationError> {
    let mut chars = table.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("table_identifier")
            .with_message("Table must be a plain SQL identifier ([A-Za-z_][A-Za-z0-9_]*)".into()))
    }
}

// --- DEFAULTS ---

fn default_clean_targets() -> Vec<String> {
    vec!["target".to_string()]
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    3_000
}
fn default_source_timeout_secs() -> u64 {
    30
}
fn default_date_column() -> String {
    "date".to_string()
}
fn default_region_column() -> String {
    "location".to_string()
}
fn default_confirmed_column() -> String {
    "total_cases".to_string()
}
fn default_deaths_column() -> String {
    "total_deaths".to_string()
}
fn default_population_column() -> Option<String> {
    Some("population".to_string())
}
fn default_max_rejected_fraction() -> f64 {
    0.10
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("covid_brazil_latest.csv")
}
fn default_target_path() -> PathBuf {
    PathBuf::from("target")
}
fn default_store_path() -> PathBuf {
    PathBuf::from("casewatch.duckdb")
}
fn default_store_table() -> String {
    "covid_cases".to_string()
}
fn default_store_timeout_secs() -> u64 {
    10
}
