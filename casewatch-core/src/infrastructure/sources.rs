// casewatch-core/src/infrastructure/sources.rs
//
// TableSource adapters: HTTP(S) endpoints and local files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::domain::configuration::{ColumnMapping, Compression, SourceConfig};
use crate::domain::record::RawTable;
use crate::infrastructure::codec::{inflate, parse_table};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::source::TableSource;

const USER_AGENT: &str = concat!("casewatch/", env!("CARGO_PKG_VERSION"));
const FILE_SCHEME: &str = "file://";

pub struct HttpCsvSource {
    name: String,
    url: String,
    mapping: ColumnMapping,
    compression: Option<Compression>,
    client: reqwest::Client,
}

impl HttpCsvSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        mapping: ColumnMapping,
        timeout: Duration,
    ) -> Result<Self, InfrastructureError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            mapping,
            compression: None,
            client,
        })
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }
}

#[async_trait]
impl TableSource for HttpCsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch_table(&self) -> Result<RawTable, InfrastructureError> {
        debug!(source = %self.name, url = %self.url, "GET");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InfrastructureError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.bytes().await?;
        parse_table(&inflate(&body, self.compression)?, &self.mapping)
    }
}

pub struct FileCsvSource {
    name: String,
    location: String,
    path: PathBuf,
    mapping: ColumnMapping,
    compression: Option<Compression>,
}

impl FileCsvSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, mapping: ColumnMapping) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            location: format!("{}{}", FILE_SCHEME, path.display()),
            path,
            mapping,
            compression: None,
        }
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }
}

#[async_trait]
impl TableSource for FileCsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch_table(&self) -> Result<RawTable, InfrastructureError> {
        let body = tokio::fs::read(&self.path).await?;
        parse_table(&inflate(&body, self.compression)?, &self.mapping)
    }
}

/// Pick the adapter from the url scheme. Relative file paths resolve against `base_dir`.
pub fn build_source(
    config: &SourceConfig,
    base_dir: &Path,
) -> Result<Box<dyn TableSource>, InfrastructureError> {
    if let Some(raw_path) = config.url.strip_prefix(FILE_SCHEME) {
        let path = Path::new(raw_path);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };
        return Ok(Box::new(
            FileCsvSource::new(&config.name, path, config.columns.clone())
                .with_compression(config.compression),
        ));
    }

    if config.url.starts_with("http://") || config.url.starts_with("https://") {
        return Ok(Box::new(
            HttpCsvSource::new(
                &config.name,
                &config.url,
                config.columns.clone(),
                Duration::from_secs(config.timeout_secs),
            )?
            .with_compression(config.compression),
        ));
    }

    Err(InfrastructureError::ConfigError(format!(
        "Unsupported url scheme for source '{}': {}",
        config.name, config.url
    )))
}
