// casewatch-core/src/ports/source.rs

// What the fetcher needs from a data provider: a named location that yields
// a raw table. HTTP, local files and test doubles all plug in here.

use async_trait::async_trait;

use crate::domain::record::RawTable;
use crate::infrastructure::error::InfrastructureError;

#[async_trait]
pub trait TableSource: Send + Sync {
    /// Human name used in logs and failure reports (ex: "owid").
    fn name(&self) -> &str;

    /// Where the data comes from (URL or path).
    fn location(&self) -> &str;

    /// One attempt. Retries and timeouts belong to the caller.
    ///
    /// A payload that cannot be parsed, or that misses a mapped column, is an
    /// error. A well-formed header without rows is a valid, empty table.
    async fn fetch_table(&self) -> Result<RawTable, InfrastructureError>;
}
