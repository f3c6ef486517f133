// casewatch-core/src/domain/mod.rs

pub mod configuration;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod record;
pub mod validate;

// Re-exports to keep imports short elsewhere
pub use configuration::PipelineConfig;
pub use error::DomainError;
pub use metrics::MetricsEngine;
pub use normalize::{NormalizationReport, Normalized, Normalizer};
pub use record::{CaseRecord, QualityFlag, RawRecord, RawTable};
pub use validate::{Validated, ValidationReport, Validator};
