// casewatch-core/src/error.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;

/// One failed source, as reported back to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub name: String,
    pub location: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({}): {}", self.name, self.location, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    // --- DOMAIN ERRORS (thresholds, unusable series, config rules) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, HTTP, DB, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- RUN-LEVEL FAILURES ---
    #[error("Source unavailable: primary {primary}; fallback {fallback}")]
    SourceUnavailable {
        primary: SourceFailure,
        fallback: SourceFailure,
    },

    #[error("Persist failed (snapshot: {snapshot}; store: {store})")]
    PersistFailed { snapshot: String, store: String },

    // --- GENERIC ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Unsafe path traversal detected: {0}")]
    UnsafePath(String),
}

// Shortcut so `?` works on raw io calls
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for PipelineError {
    fn from(err: duckdb::Error) -> Self {
        PipelineError::Infrastructure(InfrastructureError::from(err))
    }
}
