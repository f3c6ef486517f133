// casewatch-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(casewatch::infra::database::duckdb),
        help("An error occurred inside the store engine.")
    )]
    DuckDB(#[from] duckdb::Error),

    #[error("Store Mutex Poisoned")]
    #[diagnostic(code(casewatch::infra::database::poisoned))]
    Poisoned,

    #[error("Upsert abandoned by its caller, transaction rolled back")]
    #[diagnostic(code(casewatch::infra::database::abandoned))]
    Abandoned,
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(casewatch::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(casewatch::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Pipeline configuration not found at '{0}'")]
    #[diagnostic(code(casewatch::infra::config_missing))]
    ConfigNotFound(String),

    // --- NETWORK ---
    #[error("HTTP Error: {0}")]
    #[diagnostic(code(casewatch::infra::http))]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    #[diagnostic(code(casewatch::infra::http_status))]
    HttpStatus { status: u16, url: String },

    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(code(casewatch::infra::timeout))]
    Timeout { operation: String, seconds: u64 },

    // --- PAYLOADS ---
    #[error("CSV Error: {0}")]
    #[diagnostic(code(casewatch::infra::csv))]
    Csv(#[from] csv::Error),

    #[error("Malformed payload: {0}")]
    #[diagnostic(
        code(casewatch::infra::payload),
        help("The body was readable but does not match the configured column mapping.")
    )]
    MalformedPayload(String),
}

// Shortcut for `?` on duckdb calls
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(err))
    }
}
