use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://abcd.supabase.co
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Seconds a fetched value is served before it is re-fetched
  pub stale_secs: u64,
  /// Retries after a failed fetch
  pub retry: u32,
  /// Delay before the first retry, doubled on each attempt
  pub retry_base_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: 30,
      retry: 3,
      retry_base_ms: 1000,
    }
  }
}

impl CacheConfig {
  pub fn options(&self) -> CacheOptions {
    CacheOptions {
      stale_time: Duration::from_secs(self.stale_secs),
      retry: self.retry,
      retry_delay: Duration::from_millis(self.retry_base_ms),
      ..CacheOptions::default()
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// Queries shorter than this never reach the backend
  pub min_query_len: usize,
  /// Maximum results per category
  pub limit: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      min_query_len: 2,
      limit: 5,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rentdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rentdesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(p) = explicit_path {
      if !p.exists() {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
      return Self::load_from_path(p);
    }

    let path = Self::candidate_paths()
      .into_iter()
      .find(|p| p.exists())
      .ok_or_else(|| {
        eyre!(
          "No configuration file found. Create one at ~/.config/rentdesk/config.yaml\n\
           with at least:\n\n  backend:\n    url: https://<project>.supabase.co"
        )
      })?;
    Self::load_from_path(&path)
  }

  fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("rentdesk.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("rentdesk").join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks RENTDESK_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("RENTDESK_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set RENTDESK_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Signed-in user's access token, if one is set in RENTDESK_ACCESS_TOKEN.
  pub fn get_access_token() -> Option<String> {
    std::env::var("RENTDESK_ACCESS_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("backend:\n  url: https://fleet.example.co\n").unwrap();
    assert_eq!(config.backend.url, "https://fleet.example.co");
    assert_eq!(config.cache.stale_secs, 30);
    assert_eq!(config.search.min_query_len, 2);
    assert_eq!(config.search.limit, 5);
  }

  #[test]
  fn test_cache_section() {
    let config = Config::parse(
      "backend:\n  url: https://fleet.example.co\ncache:\n  stale_secs: 5\n  retry: 0\n",
    )
    .unwrap();
    let options = config.cache.options();
    assert_eq!(options.stale_time, Duration::from_secs(5));
    assert_eq!(options.retry, 0);
    assert_eq!(options.retry_delay, Duration::from_millis(1000));
  }

  #[test]
  fn test_missing_backend_is_error() {
    assert!(Config::parse("cache:\n  stale_secs: 5\n").is_err());
  }
}
