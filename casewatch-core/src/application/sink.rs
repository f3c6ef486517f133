// casewatch-core/src/application/sink.rs

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::domain::configuration::OutputConfig;
use crate::domain::record::CaseRecord;
use crate::error::PipelineError;
use crate::infrastructure::codec::render_snapshot;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::store::{CaseStore, UpsertCounts};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SinkOutcome<T> {
    Written(T),
    Failed { reason: String },
}

impl<T> SinkOutcome<T> {
    pub fn is_written(&self) -> bool {
        matches!(self, SinkOutcome::Written(_))
    }

    fn describe(&self) -> String {
        match self {
            SinkOutcome::Written(_) => "ok".to_string(),
            SinkOutcome::Failed { reason } => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotWrite {
    pub path: PathBuf,
    pub rows: usize,
    /// Timestamped copy, when an archive directory is configured and the copy succeeded.
    pub archive: Option<PathBuf>,
}

/// Both sinks, reported independently. One can be fresh while the other is stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistResult {
    pub snapshot: SinkOutcome<SnapshotWrite>,
    pub store: SinkOutcome<UpsertCounts>,
}

impl PersistResult {
    pub fn is_complete(&self) -> bool {
        self.snapshot.is_written() && self.store.is_written()
    }

    pub fn into_result(self) -> Result<(SnapshotWrite, UpsertCounts), PipelineError> {
        match (self.snapshot, self.store) {
            (SinkOutcome::Written(snapshot), SinkOutcome::Written(counts)) => Ok((snapshot, counts)),
            (snapshot, store) => Err(PipelineError::PersistFailed {
                snapshot: snapshot.describe(),
                store: store.describe(),
            }),
        }
    }
}

pub struct Sink {
    snapshot_path: PathBuf,
    archive_dir: Option<PathBuf>,
    dataset: String,
    store: Arc<dyn CaseStore>,
    store_timeout: Duration,
}

impl Sink {
    pub fn new(
        output: &OutputConfig,
        dataset: impl Into<String>,
        store: Arc<dyn CaseStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            snapshot_path: output.snapshot_path.clone(),
            archive_dir: output.archive_dir.clone(),
            dataset: dataset.into(),
            store,
            store_timeout,
        }
    }

    /// Snapshot first, then the store. Neither undoes the other.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub async fn persist(&self, records: &[CaseRecord]) -> PersistResult {
        let snapshot = match self.write_snapshot(records) {
            Ok(written) => {
                info!(path = ?written.path, rows = written.rows, "Snapshot replaced");
                SinkOutcome::Written(written)
            }
            Err(e) => {
                error!(path = ?self.snapshot_path, error = %e, "Snapshot write failed");
                SinkOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let store = match self.write_store(records).await {
            Ok(counts) => SinkOutcome::Written(counts),
            Err(e) => {
                error!(engine = %self.store.engine_name(), error = %e, "Store upsert failed");
                SinkOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        PersistResult { snapshot, store }
    }

    fn write_snapshot(&self, records: &[CaseRecord]) -> Result<SnapshotWrite, InfrastructureError> {
        let body = render_snapshot(records)?;
        atomic_write(&self.snapshot_path, &body)?;

        let archive = self
            .archive_dir
            .as_deref()
            .and_then(|dir| self.write_archive(dir, &body));

        Ok(SnapshotWrite {
            path: self.snapshot_path.clone(),
            rows: records.len(),
            archive,
        })
    }

    // A missing archive copy is not worth failing a fresh snapshot over.
    fn write_archive(&self, dir: &Path, body: &[u8]) -> Option<PathBuf> {
        let file_name = format!(
            "covid_{}_{}.csv",
            self.dataset,
            Utc::now().format("%Y%m%dT%H%M%SZ")
        );
        let path = dir.join(file_name);
        match atomic_write(&path, body) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = ?path, error = %e, "Archive copy failed");
                None
            }
        }
    }

    async fn write_store(&self, records: &[CaseRecord]) -> Result<UpsertCounts, PipelineError> {
        match tokio::time::timeout(self.store_timeout, self.store.upsert_records(records)).await {
            Ok(result) => result,
            Err(_) => Err(InfrastructureError::Timeout {
                operation: format!("Upsert into {}", self.store.engine_name()),
                seconds: self.store_timeout.as_secs(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDbStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::fs;

    enum StoreMode {
        Broken,
        Hang,
    }

    struct MockStore {
        mode: StoreMode,
    }

    #[async_trait]
    impl CaseStore for MockStore {
        async fn upsert_records(&self, _records: &[CaseRecord]) -> Result<UpsertCounts, PipelineError> {
            match self.mode {
                StoreMode::Broken => Err(PipelineError::InternalError(
                    "connection refused".to_string(),
                )),
                StoreMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(UpsertCounts::default())
                }
            }
        }
        async fn count_rows(&self) -> Result<u64, PipelineError> {
            Ok(0)
        }
        async fn load_records(&self, _region: Option<&str>) -> Result<Vec<CaseRecord>, PipelineError> {
            Ok(vec![])
        }
        fn engine_name(&self) -> &str {
            "mock"
        }
    }

    fn records() -> Vec<CaseRecord> {
        (1..=3)
            .map(|d| {
                CaseRecord::new(
                    "BR",
                    NaiveDate::from_ymd_opt(2021, 1, d).unwrap(),
                    d as i64 * 10,
                    d as i64,
                    Some(1000),
                )
            })
            .collect()
    }

    fn output(dir: &Path, archive: bool) -> OutputConfig {
        OutputConfig {
            snapshot_path: dir.join("covid_brazil_latest.csv"),
            archive_dir: archive.then(|| dir.join("archive")),
            target_path: dir.join("target"),
        }
    }

    fn sink(output: &OutputConfig, store: Arc<dyn CaseStore>) -> Sink {
        Sink::new(output, "brazil", store, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_both_sinks_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(DuckDbStore::in_memory("covid_cases")?);
        let result = sink(&output(dir.path(), true), store.clone())
            .persist(&records())
            .await;

        assert!(result.is_complete());
        let (snapshot, counts) = result.into_result()?;
        assert_eq!(snapshot.rows, 3);
        assert_eq!(counts, UpsertCounts { inserted: 3, updated: 0 });
        assert_eq!(store.count_rows().await?, 3);

        let archive = snapshot.archive.unwrap();
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("covid_brazil_") && name.ends_with("Z.csv"));
        assert_eq!(fs::read(&archive)?, fs::read(&snapshot.path)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_keeps_fresh_snapshot() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = output(dir.path(), false);
        let result = sink(&out, Arc::new(MockStore { mode: StoreMode::Broken }))
            .persist(&records())
            .await;

        assert!(result.snapshot.is_written());
        assert!(!result.store.is_written());
        let content = fs::read_to_string(&out.snapshot_path)?;
        assert_eq!(content.lines().count(), 4);

        match result.into_result().unwrap_err() {
            PipelineError::PersistFailed { snapshot, store } => {
                assert_eq!(snapshot, "ok");
                assert!(store.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_store_timeout_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = sink(&output(dir.path(), false), Arc::new(MockStore { mode: StoreMode::Hang }))
            .persist(&records())
            .await;

        match &result.store {
            SinkOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            SinkOutcome::Written(_) => panic!("hanging store reported as written"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_store_timeout_rolls_back_the_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(DuckDbStore::in_memory("covid_cases")?);
        let start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let batch: Vec<CaseRecord> = (0..20_000u64)
            .map(|i| CaseRecord::new("BR", start + chrono::Days::new(i), 1, 0, Some(1000)))
            .collect();

        let result = Sink::new(
            &output(dir.path(), false),
            "brazil",
            store.clone(),
            Duration::from_millis(1),
        )
        .persist(&batch)
        .await;

        assert!(result.snapshot.is_written());
        assert!(matches!(&result.store, SinkOutcome::Failed { reason } if reason.contains("timed out")));
        // Reported as failed, and nothing landed behind the report's back.
        assert_eq!(store.count_rows().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_is_swapped_not_rewritten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = output(dir.path(), false);
        fs::write(&out.snapshot_path, "previous run\n")?;
        let held = dir.path().join("held_by_reader.csv");
        fs::hard_link(&out.snapshot_path, &held)?;

        let store = Arc::new(DuckDbStore::in_memory("covid_cases")?);
        let result = sink(&out, store).persist(&records()).await;

        assert!(result.snapshot.is_written());
        assert_eq!(fs::read_to_string(&out.snapshot_path)?.lines().count(), 4);
        assert_eq!(fs::read_to_string(&held)?, "previous run\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_block_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut out = output(dir.path(), false);
        // A non-empty directory on the snapshot name makes the rename fail.
        out.snapshot_path = dir.path().join("occupied");
        fs::create_dir_all(out.snapshot_path.join("inner"))?;

        let store = Arc::new(DuckDbStore::in_memory("covid_cases")?);
        let result = sink(&out, store.clone()).persist(&records()).await;

        assert!(!result.snapshot.is_written());
        assert!(result.store.is_written());
        assert_eq!(store.count_rows().await?, 3);
        match result.into_result().unwrap_err() {
            PipelineError::PersistFailed { snapshot, store } => {
                assert_ne!(snapshot, "ok");
                assert_eq!(store, "ok");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }
}
