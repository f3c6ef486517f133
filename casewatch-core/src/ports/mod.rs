// casewatch-core/src/ports/mod.rs

pub mod source;
pub mod store;

pub use source::TableSource;
pub use store::{CaseStore, UpsertCounts};
