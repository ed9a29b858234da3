//! Command-line interface for the `colloquy` binary.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use cq_domain::config::Config;
use cq_domain::error::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "colloquy", about = "Multi-party agent conversation orchestrator")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "colloquy.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server (default).
    Serve,
    /// Inspect or validate configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Validate,
    Show,
}

/// Load config from the given path; a missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found; using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/colloquy.toml")).unwrap();
        assert_eq!(config.server.port, 3710);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server = \"not a table\"").unwrap();
        let err = load_config(&path).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }
}
