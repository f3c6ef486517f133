// casewatch-core/src/application/fetch.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::configuration::{SourceConfig, SourcesConfig};
use crate::domain::record::RawTable;
use crate::error::{PipelineError, SourceFailure};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::sources::build_source;
use crate::ports::source::TableSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Primary,
    Fallback,
}

impl std::fmt::Display for SourceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTier::Primary => write!(f, "primary"),
            SourceTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// How hard to try one source before giving up on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Which source served the table, or why none did.
#[derive(Debug)]
pub enum FetchOutcome {
    Primary(RawTable),
    Fallback {
        table: RawTable,
        primary_failure: SourceFailure,
    },
    Failed {
        primary: SourceFailure,
        fallback: SourceFailure,
    },
}

/// A successful fetch, flattened for the rest of the run.
#[derive(Debug)]
pub struct Fetched {
    pub table: RawTable,
    pub tier: SourceTier,
    pub primary_failure: Option<SourceFailure>,
}

impl FetchOutcome {
    pub fn into_result(self) -> Result<Fetched, PipelineError> {
        match self {
            FetchOutcome::Primary(table) => Ok(Fetched {
                table,
                tier: SourceTier::Primary,
                primary_failure: None,
            }),
            FetchOutcome::Fallback {
                table,
                primary_failure,
            } => Ok(Fetched {
                table,
                tier: SourceTier::Fallback,
                primary_failure: Some(primary_failure),
            }),
            FetchOutcome::Failed { primary, fallback } => {
                Err(PipelineError::SourceUnavailable { primary, fallback })
            }
        }
    }
}

pub struct SourceFetcher {
    primary: Box<dyn TableSource>,
    primary_policy: RetryPolicy,
    fallback: Box<dyn TableSource>,
    fallback_policy: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(
        primary: Box<dyn TableSource>,
        primary_policy: RetryPolicy,
        fallback: Box<dyn TableSource>,
        fallback_policy: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            primary_policy,
            fallback,
            fallback_policy,
        }
    }

    /// Build both adapters from config. `base_dir` anchors relative `file://` urls.
    pub fn from_config(config: &SourcesConfig, base_dir: &Path) -> Result<Self, InfrastructureError> {
        Ok(Self::new(
            build_source(&config.primary, base_dir)?,
            RetryPolicy::from_config(&config.primary),
            build_source(&config.fallback, base_dir)?,
            RetryPolicy::from_config(&config.fallback),
        ))
    }

    /// Primary first, fallback only once the primary has exhausted its attempts.
    ///
    /// Never returns a partial table: a source either yields a complete parse
    /// or counts as failed.
    #[instrument(skip(self), fields(primary = %self.primary.name(), fallback = %self.fallback.name()))]
    pub async fn fetch(&self) -> FetchOutcome {
        let primary_failure = match try_source(self.primary.as_ref(), &self.primary_policy).await {
            Ok(table) => return FetchOutcome::Primary(table),
            Err(reason) => describe(self.primary.as_ref(), reason),
        };
        warn!(failure = %primary_failure, "Primary source failed, switching to fallback");

        match try_source(self.fallback.as_ref(), &self.fallback_policy).await {
            Ok(table) => FetchOutcome::Fallback {
                table,
                primary_failure,
            },
            Err(reason) => FetchOutcome::Failed {
                primary: primary_failure,
                fallback: describe(self.fallback.as_ref(), reason),
            },
        }
    }
}

fn describe(source: &dyn TableSource, reason: String) -> SourceFailure {
    SourceFailure {
        name: source.name().to_string(),
        location: source.location().to_string(),
        reason,
    }
}

async fn try_source(source: &dyn TableSource, policy: &RetryPolicy) -> Result<RawTable, String> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, source.fetch_table()).await {
            Ok(Ok(table)) => {
                info!(
                    source = %source.name(),
                    attempt,
                    rows = table.len(),
                    "Source table fetched"
                );
                return Ok(table);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                last_error = InfrastructureError::Timeout {
                    operation: format!("Fetch from '{}'", source.name()),
                    seconds: policy.timeout.as_secs(),
                }
                .to_string()
            }
        }

        warn!(
            source = %source.name(),
            attempt,
            attempts,
            error = %last_error,
            "Fetch attempt failed"
        );
        if attempt < attempts && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(last_error)
}
