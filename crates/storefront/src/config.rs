// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::command::Command;

/// File name of the refresh token cache inside the state directory.
pub const TOKEN_FILE_NAME: &str = "session.json";

/// Storefront API client.
#[derive(Debug, Parser)]
#[command(name = "storefront", version, about)]
pub struct Config {
    /// Base URL of the storefront API.
    #[arg(long, env = "STOREFRONT_API_URL", default_value = "http://127.0.0.1:3000/api")]
    pub api_url: String,

    /// Path of the refresh token cache. Defaults to `<state dir>/session.json`.
    #[arg(long, env = "STOREFRONT_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Per-request timeout in milliseconds (also bounds a hung refresh).
    #[arg(long, env = "STOREFRONT_TIMEOUT_MS", default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, env = "STOREFRONT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log format: text or json.
    #[arg(long, env = "STOREFRONT_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| anyhow::anyhow!("invalid --api-url {:?}: {e}", self.api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("--api-url must be http or https, got {}", url.scheme());
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("--timeout-ms must be greater than zero");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid --log-format: {other} (expected text or json)"),
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join(TOKEN_FILE_NAME))
    }
}

/// Resolve the state directory for the token cache.
///
/// Checks `STOREFRONT_STATE_DIR`, then `$XDG_STATE_HOME/storefront`,
/// then `$HOME/.local/state/storefront`.
pub fn state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(get_env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = get_env("STOREFRONT_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = get_env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("storefront");
    }
    if let Some(home) = get_env("HOME") {
        return PathBuf::from(home).join(".local/state/storefront");
    }
    PathBuf::from(".storefront")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
