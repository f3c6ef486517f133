// casewatch-core/src/domain/metrics.rs

use std::collections::{HashMap, VecDeque};

use crate::domain::record::{CaseRecord, QualityFlag};

const PER_100K: f64 = 100_000.0;
const ROLLING_WINDOW: usize = 7;

pub struct MetricsEngine;

impl MetricsEngine {
    /// Derive incidence, daily increments and the 7-day average.
    ///
    /// Pure: no I/O and no state kept between calls. Expects validator output
    /// (ascending dates inside each region).
    pub fn compute(records: &[CaseRecord]) -> Vec<CaseRecord> {
        // region -> (previous record counters, trailing new_cases window)
        let mut running: HashMap<&str, ((i64, i64), VecDeque<Option<i64>>)> = HashMap::new();

        records
            .iter()
            .map(|record| {
                let mut out = record.clone();

                match out.population {
                    Some(pop) if pop > 0 => {
                        out.incidence_per_100k =
                            Some(round2(out.confirmed_cases as f64 / pop as f64 * PER_100K));
                    }
                    _ => {
                        out.incidence_per_100k = None;
                        out.flag(QualityFlag::PopulationUnavailable);
                    }
                }

                let (prev, window) = running
                    .entry(record.region_code.as_str())
                    .or_insert_with(|| ((i64::MIN, i64::MIN), VecDeque::new()));

                let first = prev.0 == i64::MIN;
                let (confirmed, deaths) = (out.confirmed_cases, out.deaths);
                out.new_cases = (!first).then(|| confirmed - prev.0);
                out.new_deaths = (!first).then(|| deaths - prev.1);
                *prev = (confirmed, deaths);

                window.push_back(out.new_cases);
                if window.len() > ROLLING_WINDOW {
                    window.pop_front();
                }
                let observed: Vec<i64> = window.iter().flatten().copied().collect();
                out.new_cases_avg_7d = if observed.is_empty() {
                    None
                } else {
                    Some(round2(observed.iter().sum::<i64>() as f64 / observed.len() as f64))
                };

                out
            })
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
