// casewatch-core/src/ports/store.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::record::CaseRecord;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// The durable relational store, keyed by `(region_code, date)`.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert missing keys, overwrite every column of existing ones.
    /// Implementations write a whole batch in one transaction.
    async fn upsert_records(&self, records: &[CaseRecord]) -> Result<UpsertCounts, PipelineError>;

    async fn count_rows(&self) -> Result<u64, PipelineError>;

    /// Stored rows ordered by region then date, optionally for one region.
    async fn load_records(&self, region: Option<&str>) -> Result<Vec<CaseRecord>, PipelineError>;

    fn engine_name(&self) -> &str;
}
