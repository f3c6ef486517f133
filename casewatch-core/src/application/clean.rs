// casewatch-core/src/application/clean.rs

use std::fs;
use std::path::{Component, Path};

use crate::error::PipelineError;
use crate::infrastructure::config::load_pipeline_config;

/// Remove the configured build artifacts (default `target`). Returns what was removed.
pub fn clean_project(project_dir: &Path) -> Result<Vec<String>, PipelineError> {
    tracing::info!("🧹 Initializing casewatch cleanup sequence...");

    let config = load_pipeline_config(project_dir)?;

    let targets = if config.clean_targets.is_empty() {
        vec!["target".to_string()]
    } else {
        config.clean_targets
    };

    let mut removed = Vec::new();
    for target_rel_path in targets {
        // Path traversal guard: only plain relative paths below the project.
        let rel = Path::new(&target_rel_path);
        let escapes = rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        let full_path = project_dir.join(rel);
        if escapes || !full_path.starts_with(project_dir) || full_path == project_dir {
            return Err(PipelineError::UnsafePath(target_rel_path));
        }

        if full_path.exists() {
            if full_path.is_dir() {
                fs::remove_dir_all(&full_path)?;
            } else {
                fs::remove_file(&full_path)?;
            }
            tracing::info!(path = %target_rel_path, "Artifact removed");
            removed.push(target_rel_path);
        }
    }

    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn project(clean_targets: &str) -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        let yaml = format!(
            "name: brazil\n\
             sources:\n  primary: {{name: a, url: 'file://a.csv'}}\n  fallback: {{name: b, url: 'file://b.csv'}}\n\
             geography:\n  regions: {{Brazil: BR}}\n\
             clean-targets: {}\n",
            clean_targets
        );
        fs::write(dir.path().join("casewatch.yaml"), yaml)?;
        Ok(dir)
    }

    #[test]
    fn test_removes_configured_targets() -> Result<()> {
        let dir = project("[target, old.csv, missing]")?;
        fs::create_dir_all(dir.path().join("target/nested"))?;
        fs::write(dir.path().join("old.csv"), "x")?;

        let removed = clean_project(dir.path())?;

        assert_eq!(removed, vec!["target".to_string(), "old.csv".to_string()]);
        assert!(!dir.path().join("target").exists());
        assert!(!dir.path().join("old.csv").exists());
        assert!(dir.path().join("casewatch.yaml").exists());
        Ok(())
    }

    #[test]
    fn test_refuses_paths_outside_project() -> Result<()> {
        for bad in ["['../outside']", "['/etc']", "['.']"] {
            let dir = project(bad)?;
            let err = clean_project(dir.path()).unwrap_err();
            assert!(matches!(err, PipelineError::UnsafePath(_)), "{bad}");
        }
        Ok(())
    }
}
