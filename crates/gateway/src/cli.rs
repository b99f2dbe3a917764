//! Command-line entry point and config loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use sa_domain::config::Config;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "SA_CONFIG_PATH";

#[derive(Parser, Debug)]
#[command(name = "agentcore", version, about = "Agent orchestration core gateway")]
pub struct Cli {
    /// Path to the config file (TOML or YAML, by extension). Falls back to
    /// the `SA_CONFIG_PATH` env var, then `config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Load config from the path given on the CLI, else `SA_CONFIG_PATH`, else
/// `config.toml`. A missing file is not an error — every field has a
/// `serde(default)`, so an absent config file just means "use defaults".
pub fn load_config(cli: &Cli) -> anyhow::Result<(Config, PathBuf)> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match std::fs::read_to_string(&path) {
        Ok(raw) => parse_config(&path, &raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        }
        Err(e) => return Err(e).with_context(|| format!("reading config file {}", path.display())),
    };

    Ok((config, path))
}

fn parse_config(path: &Path, raw: &str) -> anyhow::Result<Config> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(raw).with_context(|| format!("parsing YAML config {}", path.display()))
        }
        _ => toml::from_str(raw).with_context(|| format!("parsing TOML config {}", path.display())),
    }
}
