// casewatch/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "casewatch")]
#[command(about = "Daily COVID-19 case ingestion: fetch with fallback, validate, enrich, upsert", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🚀 Runs the pipeline (fetch -> normalize -> validate -> metrics -> persist)
    Run {
        /// Project directory (holds casewatch.yaml)
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// 🔍 Shows the most recent rows of the store
    Inspect {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Only this region code (ex: "BR")
        #[arg(long, short)]
        region: Option<String>,

        /// Number of rows to display
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// 🧹 Cleans build artifacts (target/ folder)
    Clean {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["casewatch", "run"]);
        match args.command {
            Commands::Run { project_dir } => {
                assert_eq!(project_dir.to_string_lossy(), ".");
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_inspect() -> Result<()> {
        let args = Cli::parse_from([
            "casewatch",
            "inspect",
            "--project-dir",
            "/tmp",
            "-r",
            "BR",
            "--limit",
            "3",
        ]);
        match args.command {
            Commands::Inspect {
                project_dir,
                region,
                limit,
            } => {
                assert_eq!(project_dir.to_string_lossy(), "/tmp");
                assert_eq!(region, Some("BR".to_string()));
                assert_eq!(limit, 3);
                Ok(())
            }
            _ => bail!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_cli_parse_inspect_defaults() -> Result<()> {
        let args = Cli::parse_from(["casewatch", "inspect"]);
        match args.command {
            Commands::Inspect { region, limit, .. } => {
                assert_eq!(region, None);
                assert_eq!(limit, 10);
                Ok(())
            }
            _ => bail!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["casewatch", "query", "SELECT 1"]).is_err());
    }
}
