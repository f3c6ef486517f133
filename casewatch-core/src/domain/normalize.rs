// casewatch-core/src/domain/normalize.rs

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::domain::configuration::GeographyConfig;
use crate::domain::error::DomainError;
use crate::domain::record::{CaseRecord, RawRecord, RawTable};

/// A row that failed the strict parse. Kept so exclusions stay auditable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejection {
    pub line: usize,
    pub region: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizationReport {
    pub rows_read: usize,
    /// Rows outside the configured geography (or the source row filter).
    pub out_of_scope: usize,
    pub in_scope: usize,
    pub accepted: usize,
    pub duplicates_dropped: usize,
    pub rejected: Vec<RowRejection>,
}

impl NormalizationReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn rejected_fraction(&self) -> f64 {
        if self.in_scope == 0 {
            0.0
        } else {
            self.rejected.len() as f64 / self.in_scope as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<CaseRecord>,
    pub report: NormalizationReport,
}

/// Resolved header positions for one table.
struct Columns {
    date: usize,
    region: usize,
    confirmed: usize,
    deaths: usize,
    population: Option<usize>,
    filter: Option<(usize, String)>,
    empty_counts_as_zero: bool,
}

pub struct Normalizer {
    /// lowercase raw name -> region code
    regions: HashMap<String, String>,
    max_rejected_fraction: f64,
}

impl Normalizer {
    pub fn new(geography: &GeographyConfig, max_rejected_fraction: f64) -> Self {
        let regions = geography
            .regions
            .iter()
            .map(|(name, code)| (name.trim().to_lowercase(), code.trim().to_string()))
            .collect();
        Self {
            regions,
            max_rejected_fraction,
        }
    }

    /// Raw table -> typed records, grouped by region and ascending by date.
    ///
    /// Per-row parse failures are excluded and counted. The whole call only
    /// fails when the excluded share of in-scope rows crosses the threshold.
    pub fn normalize(&self, table: &RawTable) -> Result<Normalized, DomainError> {
        let columns = self.resolve_columns(table)?;
        let mut report = NormalizationReport {
            rows_read: table.len(),
            ..Default::default()
        };

        // BTreeMap gives the (region, date) ordering for free; last row wins.
        let mut by_key: BTreeMap<(String, NaiveDate), CaseRecord> = BTreeMap::new();

        for raw in &table.records {
            if let Some((idx, expected)) = &columns.filter
                && !cell(raw, *idx).eq_ignore_ascii_case(expected)
            {
                report.out_of_scope += 1;
                continue;
            }

            let raw_region = cell(raw, columns.region);
            let Some(region_code) = self.regions.get(&raw_region.to_lowercase()) else {
                report.out_of_scope += 1;
                continue;
            };
            report.in_scope += 1;

            match parse_row(raw, &columns, region_code) {
                Ok(record) => {
                    let key = (record.region_code.clone(), record.date);
                    if by_key.insert(key, record).is_some() {
                        report.duplicates_dropped += 1;
                    }
                }
                Err(reason) => report.rejected.push(RowRejection {
                    line: raw.line,
                    region: raw_region.to_string(),
                    reason,
                }),
            }
        }

        let fraction = report.rejected_fraction();
        if fraction > self.max_rejected_fraction {
            return Err(DomainError::NormalizationThresholdExceeded {
                rejected: report.rejected_count(),
                in_scope: report.in_scope,
                fraction: fraction * 100.0,
                threshold: self.max_rejected_fraction * 100.0,
            });
        }

        let records: Vec<CaseRecord> = by_key.into_values().collect();
        report.accepted = records.len();

        tracing::info!(
            read = report.rows_read,
            in_scope = report.in_scope,
            accepted = report.accepted,
            rejected = report.rejected_count(),
            duplicates = report.duplicates_dropped,
            "Normalization done"
        );

        Ok(Normalized { records, report })
    }

    fn resolve_columns(&self, table: &RawTable) -> Result<Columns, DomainError> {
        let mapping = &table.mapping;
        let find = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                DomainError::InvalidConfig(format!(
                    "Column '{}' is mapped but absent from the payload header",
                    name
                ))
            })
        };

        let population = match &mapping.population {
            Some(name) => Some(find(name)?),
            None => None,
        };
        let filter = match &mapping.filter {
            Some(f) => Some((find(&f.column)?, f.equals.trim().to_string())),
            None => None,
        };

        Ok(Columns {
            date: find(&mapping.date)?,
            region: find(&mapping.region)?,
            confirmed: find(&mapping.confirmed)?,
            deaths: find(&mapping.deaths)?,
            population,
            filter,
            empty_counts_as_zero: mapping.empty_counts_as_zero,
        })
    }
}

fn cell(raw: &RawRecord, idx: usize) -> &str {
    raw.values.get(idx).map(|s| s.trim()).unwrap_or("")
}

fn parse_row(raw: &RawRecord, columns: &Columns, region_code: &str) -> Result<CaseRecord, String> {
    let date_text = cell(raw, columns.date);
    let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}'", date_text))?;

    let counter = |idx: usize, field: &str| match cell(raw, idx) {
        "" if columns.empty_counts_as_zero => Ok(0),
        text => parse_count(text).map_err(|e| format!("{}: {}", field, e)),
    };
    let confirmed = counter(columns.confirmed, "confirmed_cases")?;
    let deaths = counter(columns.deaths, "deaths")?;

    let population = match columns.population.map(|idx| cell(raw, idx)) {
        None | Some("") => None,
        Some(text) => Some(parse_count(text).map_err(|e| format!("population: {}", e))?),
    };

    Ok(CaseRecord::new(region_code, date, confirmed, deaths, population))
}

/// Integer text, or float text without a fractional part ("37.0").
///
/// Negative values parse fine; the validator decides what to do with them.
fn parse_count(text: &str) -> Result<i64, String> {
    if text.is_empty() {
        return Err("missing value".to_string());
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(v);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(format!("not an integer count '{}'", text)),
    }
}
