// casewatch-core/src/application/pipeline.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::application::fetch::{SourceFetcher, SourceTier};
use crate::application::sink::{PersistResult, Sink};
use crate::domain::configuration::PipelineConfig;
use crate::domain::error::DomainError;
use crate::domain::metrics::MetricsEngine;
use crate::domain::normalize::{NormalizationReport, Normalizer};
use crate::domain::validate::{ValidationReport, Validator};
use crate::error::{PipelineError, SourceFailure};

pub const RUN_RESULTS_FILE: &str = "run_results.json";

/// Everything an operator needs to judge one run, without re-running it.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub dataset: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub source_tier: SourceTier,
    pub primary_failure: Option<SourceFailure>,
    pub normalization: NormalizationReport,
    pub validation: ValidationReport,
    pub records: usize,
    pub latest_date: Option<NaiveDate>,
    pub persist: PersistResult,
}

/// fetch -> normalize -> validate -> metrics -> persist.
///
/// Errors before the sink (no source, normalization threshold, nothing valid)
/// abort with nothing written. Once the sink runs, the outcome of each sink is
/// in the report and `success` is false if either is stale.
#[instrument(skip_all, fields(dataset = %config.name))]
pub async fn run_pipeline(
    config: &PipelineConfig,
    fetcher: &SourceFetcher,
    sink: &Sink,
) -> Result<RunReport, PipelineError> {
    let started_at = Utc::now();
    let clock = std::time::Instant::now();

    // 1. EXTRACT (fatal if both sources fail)
    let fetched = fetcher.fetch().await.into_result()?;
    info!(tier = %fetched.tier, rows = fetched.table.len(), "Raw table acquired");

    // 2. NORMALIZE
    let normalizer = Normalizer::new(&config.geography, config.normalization.max_rejected_fraction);
    let normalized = normalizer.normalize(&fetched.table)?;

    // 3. VALIDATE (per-region failures are partial, not fatal)
    let in_count = normalized.records.len();
    let validated = Validator::validate(normalized.records);
    if in_count > 0 && validated.records.is_empty() {
        return Err(DomainError::NoUsableRegions {
            failed: validated.report.failed_regions.len(),
        }
        .into());
    }

    // 4. METRICS
    let enriched = MetricsEngine::compute(&validated.records);
    let latest_date = enriched.iter().map(|r| r.date).max();

    // 5. LOAD
    let persist = sink.persist(&enriched).await;
    let success = persist.is_complete();
    if !success {
        warn!(
            snapshot = persist.snapshot.is_written(),
            store = persist.store.is_written(),
            "Run finished with a stale sink"
        );
    }

    let report = RunReport {
        success,
        dataset: config.name.clone(),
        started_at,
        duration_ms: clock.elapsed().as_millis(),
        source_tier: fetched.tier,
        primary_failure: fetched.primary_failure,
        normalization: normalized.report,
        validation: validated.report,
        records: enriched.len(),
        latest_date,
        persist,
    };

    save_json(&config.output.target_path.join(RUN_RESULTS_FILE), &report)?;
    info!(records = report.records, latest = ?report.latest_date, success, "Run complete");

    Ok(report)
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), PipelineError> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| PipelineError::InternalError(format!("Serialization: {}", e)))?;
    crate::infrastructure::fs::atomic_write(path, content)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::fetch::RetryPolicy;
    use crate::domain::configuration::ColumnMapping;
    use crate::domain::record::{QualityFlag, RawTable};
    use crate::infrastructure::adapters::DuckDbStore;
    use crate::infrastructure::codec::parse_table;
    use crate::infrastructure::error::InfrastructureError;
    use crate::ports::source::TableSource;
    use crate::ports::store::CaseStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const CONFIG: &str = r#"
name: brazil
sources:
  primary:
    name: owid
    url: https://example.org/owid.csv
  fallback:
    name: mirror
    url: https://example.org/mirror.csv
geography:
  regions:
    Brazil: BR
    Argentina: AR
store:
  path: ":memory:"
"#;

    /// Serves a fixed CSV body, or fails like a dead endpoint.
    struct CannedSource {
        name: &'static str,
        body: Option<&'static str>,
    }

    #[async_trait]
    impl TableSource for CannedSource {
        fn name(&self) -> &str {
            self.name
        }
        fn location(&self) -> &str {
            "mock://"
        }
        async fn fetch_table(&self) -> Result<RawTable, InfrastructureError> {
            match self.body {
                Some(body) => parse_table(body.as_bytes(), &ColumnMapping::default()),
                None => Err(InfrastructureError::MalformedPayload("network unreachable".into())),
            }
        }
    }

    fn fetcher(primary: Option<&'static str>, fallback: Option<&'static str>) -> SourceFetcher {
        let policy = RetryPolicy {
            attempts: 1,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        };
        SourceFetcher::new(
            Box::new(CannedSource { name: "owid", body: primary }),
            policy,
            Box::new(CannedSource { name: "mirror", body: fallback }),
            policy,
        )
    }

    fn setup(dir: &Path) -> Result<(PipelineConfig, Sink, Arc<DuckDbStore>)> {
        let mut config: PipelineConfig = serde_yaml::from_str(CONFIG)?;
        config.output.snapshot_path = dir.join("covid_brazil_latest.csv");
        config.output.target_path = dir.join("target");
        let store = Arc::new(DuckDbStore::in_memory(&config.store.table)?);
        let sink = Sink::new(&config.output, &config.name, store.clone(), Duration::from_secs(5));
        Ok((config, sink, store))
    }

    const THREE_ROWS: &str = "date,location,total_cases,total_deaths,population\n\
        2021-01-01,Brazil,100,5,212559409\n\
        2021-01-02,Brazil,150,6,212559409\n\
        2021-01-03,Brazil,180,8,212559409\n";

    #[tokio::test]
    async fn test_fallback_serves_three_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, store) = setup(dir.path())?;

        let report = run_pipeline(&config, &fetcher(None, Some(THREE_ROWS)), &sink).await?;

        assert!(report.success);
        assert_eq!(report.source_tier, SourceTier::Fallback);
        assert_eq!(report.primary_failure.as_ref().unwrap().name, "owid");
        assert_eq!(report.records, 3);
        assert_eq!(report.latest_date, NaiveDate::from_ymd_opt(2021, 1, 3));
        assert_eq!(store.count_rows().await?, 3);

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
            dir.path().join("target").join(RUN_RESULTS_FILE),
        )?)?;
        assert_eq!(saved["source_tier"], "fallback");
        assert_eq!(saved["persist"]["store"]["status"], "written");
        assert_eq!(saved["persist"]["store"]["inserted"], 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_gaps_and_regressions_are_repaired_end_to_end() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, store) = setup(dir.path())?;
        const BODY: &str = "date,location,total_cases,total_deaths,population\n\
            2021-01-01,Brazil,10,1,0\n\
            2021-01-03,Brazil,20,2,0\n\
            2021-01-04,Brazil,15,2,0\n\
            2021-01-01,Chile,99,9,100\n";

        let report = run_pipeline(&config, &fetcher(Some(BODY), None), &sink).await?;
        assert_eq!(report.normalization.out_of_scope, 1);
        assert_eq!(report.validation.filled_dates, 1);
        assert_eq!(report.validation.corrected_values, 1);

        let rows = store.load_records(Some("BR")).await?;
        assert_eq!(rows.len(), 4);
        assert!(rows[1].has_flag(QualityFlag::MissingDateFilled));
        assert_eq!(rows[1].confirmed_cases, 10);
        assert!(rows[3].has_flag(QualityFlag::NegativeValueCorrected));
        assert_eq!(rows[3].confirmed_cases, 20);
        assert!(rows.iter().all(|r| r.incidence_per_100k.is_none()
            && r.has_flag(QualityFlag::PopulationUnavailable)));
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, store) = setup(dir.path())?;
        let fetcher = fetcher(Some(THREE_ROWS), None);

        run_pipeline(&config, &fetcher, &sink).await?;
        let first = store.load_records(None).await?;
        let snapshot_first = std::fs::read_to_string(&config.output.snapshot_path)?;

        let second_report = run_pipeline(&config, &fetcher, &sink).await?;
        let second = store.load_records(None).await?;

        assert_eq!(first, second);
        assert_eq!(
            snapshot_first,
            std::fs::read_to_string(&config.output.snapshot_path)?
        );
        let (_, counts) = second_report.persist.into_result()?;
        assert_eq!(counts.inserted, 0);
        assert_eq!(counts.updated, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_source_unavailable_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, store) = setup(dir.path())?;

        let err = run_pipeline(&config, &fetcher(None, None), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
        assert!(!config.output.snapshot_path.exists());
        assert_eq!(store.count_rows().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_regions_unusable_aborts_before_sink() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, _store) = setup(dir.path())?;
        const SINGLE_DATE: &str = "date,location,total_cases,total_deaths,population\n\
            2021-01-01,Brazil,10,1,100\n";

        let err = run_pipeline(&config, &fetcher(Some(SINGLE_DATE), None), &sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Domain(DomainError::NoUsableRegions { failed: 1 })
        ));
        assert!(!config.output.snapshot_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_header_only_payload_succeeds_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, sink, _store) = setup(dir.path())?;
        const HEADER_ONLY: &str = "date,location,total_cases,total_deaths,population\n";

        let report = run_pipeline(&config, &fetcher(Some(HEADER_ONLY), None), &sink).await?;

        assert!(report.success);
        assert_eq!(report.source_tier, SourceTier::Primary);
        assert_eq!(report.records, 0);
        assert_eq!(report.latest_date, None);
        Ok(())
    }
}
