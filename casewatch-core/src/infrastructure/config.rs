// casewatch-core/src/infrastructure/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::domain::configuration::PipelineConfig;
use crate::error::PipelineError;
use crate::infrastructure::error::InfrastructureError;

const CANDIDATES: [&str; 2] = ["casewatch.yaml", "casewatch.yml"];

/// Load `casewatch.yaml`, layer environment overrides on top, anchor relative
/// paths to `project_dir` and run the validation rules.
#[instrument(skip(project_dir))]
pub fn load_pipeline_config(project_dir: &Path) -> Result<PipelineConfig, PipelineError> {
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading pipeline config");

    let content = fs::read_to_string(&config_path)?;
    let mut config: PipelineConfig =
        serde_yaml::from_str(&content).map_err(InfrastructureError::from)?;

    apply_env_overrides(&mut config);
    resolve_paths(&mut config, project_dir);
    config.check()?;

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, CANDIDATES
    )))
}

fn apply_env_overrides(config: &mut PipelineConfig) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Layering: CASEWATCH_* variables win over the file.
pub fn apply_env_overrides_from<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("CASEWATCH_PRIMARY_URL") {
        info!(old = %config.sources.primary.url, new = %val, "Overriding primary url via ENV");
        config.sources.primary.url = val;
    }
    if let Some(val) = lookup("CASEWATCH_FALLBACK_URL") {
        info!(old = %config.sources.fallback.url, new = %val, "Overriding fallback url via ENV");
        config.sources.fallback.url = val;
    }
    if let Some(val) = lookup("CASEWATCH_SNAPSHOT_PATH") {
        info!(old = ?config.output.snapshot_path, new = %val, "Overriding snapshot path via ENV");
        config.output.snapshot_path = PathBuf::from(val);
    }
    if let Some(val) = lookup("CASEWATCH_STORE_PATH") {
        info!(old = ?config.store.path, new = %val, "Overriding store path via ENV");
        config.store.path = PathBuf::from(val);
    }
    if let Some(val) = lookup("CASEWATCH_TARGET_PATH") {
        info!(old = ?config.output.target_path, new = %val, "Overriding target path via ENV");
        config.output.target_path = PathBuf::from(val);
    }
}

fn resolve_paths(config: &mut PipelineConfig, project_dir: &Path) {
    let anchor = |p: &Path| -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            project_dir.join(p)
        }
    };

    config.output.snapshot_path = anchor(&config.output.snapshot_path);
    config.output.target_path = anchor(&config.output.target_path);
    config.output.archive_dir = config.output.archive_dir.as_deref().map(anchor);
    if config.store.path.as_os_str() != ":memory:" {
        config.store.path = anchor(&config.store.path);
    }
}
