// casewatch-core/src/domain/validate.rs

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::error::DomainError;
use crate::domain::record::{CaseRecord, QualityFlag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    ConfirmedCases,
    Deaths,
}

/// Audit entry for one clamped counter. The record itself only keeps `corrected_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    pub region_code: String,
    pub date: NaiveDate,
    pub field: CounterField,
    pub raw_value: i64,
    pub corrected_value: i64,
}

/// A region excluded from the run because its series could not be ordered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionFailure {
    pub region_code: String,
    pub reason: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub regions_validated: usize,
    pub filled_dates: usize,
    pub corrected_values: usize,
    pub corrections: Vec<Correction>,
    pub failed_regions: Vec<RegionFailure>,
}

#[derive(Debug, Clone)]
pub struct Validated {
    pub records: Vec<CaseRecord>,
    pub report: ValidationReport,
}

/// Minimum distinct dates needed to establish an ordering.
const MIN_SERIES_LEN: usize = 2;

pub struct Validator;

impl Validator {
    /// Fill date gaps and clamp regressions, region by region.
    ///
    /// Never fails on a single record. A region whose series is unusable is
    /// reported in `failed_regions` and left out; the other regions proceed.
    pub fn validate(records: Vec<CaseRecord>) -> Validated {
        let mut by_region: BTreeMap<String, Vec<CaseRecord>> = BTreeMap::new();
        for record in records {
            by_region
                .entry(record.region_code.clone())
                .or_default()
                .push(record);
        }

        let mut out = Vec::new();
        let mut report = ValidationReport::default();

        for (region, series) in by_region {
            let count = series.len();
            match Self::validate_region(&region, series, &mut report) {
                Ok(mut clean) => {
                    report.regions_validated += 1;
                    out.append(&mut clean);
                }
                Err(DomainError::ValidationFailed {
                    region,
                    reason,
                    first_date,
                    last_date,
                }) => {
                    tracing::warn!(%region, %reason, "Region excluded from run");
                    report.failed_regions.push(RegionFailure {
                        region_code: region,
                        reason,
                        first_date,
                        last_date,
                        records: count,
                    });
                }
                Err(other) => {
                    report.failed_regions.push(RegionFailure {
                        region_code: region,
                        reason: other.to_string(),
                        first_date: None,
                        last_date: None,
                        records: count,
                    });
                }
            }
        }

        tracing::info!(
            regions = report.regions_validated,
            filled = report.filled_dates,
            corrected = report.corrected_values,
            failed = report.failed_regions.len(),
            "Validation done"
        );

        Validated {
            records: out,
            report,
        }
    }

    /// Corrections are only pushed to the report once the whole region passes.
    fn validate_region(
        region: &str,
        mut series: Vec<CaseRecord>,
        report: &mut ValidationReport,
    ) -> Result<Vec<CaseRecord>, DomainError> {
        series.sort_by_key(|r| r.date);
        let first_date = series.first().map(|r| r.date);
        let last_date = series.last().map(|r| r.date);
        let fail = |reason: String| DomainError::ValidationFailed {
            region: region.to_string(),
            reason,
            first_date,
            last_date,
        };

        if let Some(pair) = series.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(fail(format!("duplicate date {}", pair[0].date)));
        }
        if series.len() < MIN_SERIES_LEN {
            return Err(fail(format!(
                "{} distinct date(s), need at least {}",
                series.len(),
                MIN_SERIES_LEN
            )));
        }

        let mut out: Vec<CaseRecord> = Vec::with_capacity(series.len());
        let mut corrections = Vec::new();
        let mut filled = 0usize;

        for mut record in series {
            // Gap fill: carry the previous (already clean) record forward.
            if let Some(prev) = out.last().cloned() {
                let mut day = prev.date.succ_opt();
                while let Some(d) = day
                    && d < record.date
                {
                    let mut synthetic = CaseRecord::new(
                        region,
                        d,
                        prev.confirmed_cases,
                        prev.deaths,
                        prev.population,
                    );
                    synthetic.flag(QualityFlag::MissingDateFilled);
                    filled += 1;
                    out.push(synthetic);
                    day = d.succ_opt();
                }
            }

            let (prev_confirmed, prev_deaths) = out
                .last()
                .map(|p| (p.confirmed_cases, p.deaths))
                .unwrap_or((0, 0));

            let mut clamp = |field: CounterField, value: &mut i64, floor: i64| {
                if *value < 0 || *value < floor {
                    corrections.push(Correction {
                        region_code: region.to_string(),
                        date: record.date,
                        field,
                        raw_value: *value,
                        corrected_value: floor,
                    });
                    *value = floor;
                    true
                } else {
                    false
                }
            };
            let fixed_confirmed = clamp(
                CounterField::ConfirmedCases,
                &mut record.confirmed_cases,
                prev_confirmed,
            );
            let fixed_deaths = clamp(CounterField::Deaths, &mut record.deaths, prev_deaths);
            if fixed_confirmed || fixed_deaths {
                record.flag(QualityFlag::NegativeValueCorrected);
            }

            out.push(record);
        }

        report.filled_dates += filled;
        report.corrected_values += corrections.len();
        report.corrections.append(&mut corrections);
        Ok(out)
    }
}
