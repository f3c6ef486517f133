// casewatch-core/src/domain/error.rs

use chrono::NaiveDate;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error(
        "Normalization rejected {rejected} of {in_scope} in-scope rows ({fraction:.2}% > threshold {threshold:.2}%)"
    )]
    #[diagnostic(
        code(casewatch::domain::normalization),
        help("The source schema probably changed. Check the column mapping of the serving source.")
    )]
    NormalizationThresholdExceeded {
        rejected: usize,
        in_scope: usize,
        fraction: f64,
        threshold: f64,
    },

    #[error("Validation failed for region '{region}' ({first_date:?} .. {last_date:?}): {reason}")]
    #[diagnostic(code(casewatch::domain::validation))]
    ValidationFailed {
        region: String,
        reason: String,
        first_date: Option<NaiveDate>,
        last_date: Option<NaiveDate>,
    },

    #[error("No usable region left after validation ({failed} region(s) failed)")]
    #[diagnostic(
        code(casewatch::domain::no_usable_regions),
        help("Every region was excluded. Nothing is persisted so the previous dataset stays intact.")
    )]
    NoUsableRegions { failed: usize },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(casewatch::domain::config))]
    InvalidConfig(String),
}
