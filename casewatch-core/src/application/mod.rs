// casewatch-core/src/application/mod.rs

pub mod clean;
pub mod fetch;
pub mod pipeline;
pub mod sink;

// --- RE-EXPORTS (FACADE PATTERN) ---
// `use casewatch_core::application::{run_pipeline, SourceFetcher, Sink};`

pub use clean::clean_project;
pub use fetch::{FetchOutcome, Fetched, RetryPolicy, SourceFetcher, SourceTier};
pub use pipeline::{RUN_RESULTS_FILE, RunReport, run_pipeline};
pub use sink::{PersistResult, SinkOutcome, Sink, SnapshotWrite};
