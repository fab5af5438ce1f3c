//! Runtime configuration, deserialised from `config.toml` layered with
//! `BROKERDASH_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use brokerdash_analytics::AnalyticsConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub analytics:  AnalyticsConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/brokerdash/listings.db"),
      analytics:  AnalyticsConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) and the environment. Nested keys use a double
  /// underscore, e.g. `BROKERDASH_ANALYTICS__TICK_INTERVAL_SECS=10`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("BROKERDASH")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
