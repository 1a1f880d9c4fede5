use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use wright_util::retry::RetryPolicy;

/// Resolver tuning, loaded from `~/.wright/config.toml` or an explicit path.
///
/// ```toml
/// max-concurrent-lookups = 8
/// fetch-retries = 3
/// retry-delay-ms = 200
/// max-search-steps = 100000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on metadata lookups in flight at once.
    #[serde(default = "default_max_concurrent_lookups", rename = "max-concurrent-lookups")]
    pub max_concurrent_lookups: usize,

    /// Attempts per lookup, including the first, before a transient failure is fatal.
    #[serde(default = "default_fetch_retries", rename = "fetch-retries")]
    pub fetch_retries: u32,

    /// Base backoff between attempts; attempt `n` waits `n` times this.
    #[serde(default = "default_retry_delay_ms", rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Bound on solver decisions and backtracks for one search.
    #[serde(default = "default_max_search_steps", rename = "max-search-steps")]
    pub max_search_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: default_max_concurrent_lookups(),
            fetch_retries: default_fetch_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_search_steps: default_max_search_steps(),
        }
    }
}

fn default_max_concurrent_lookups() -> usize {
    8
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_max_search_steps() -> usize {
    100_000
}

impl ResolverConfig {
    /// Load the configuration from `~/.wright/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Self::from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the configuration from an explicit file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            wright_util::errors::WrightError::Config {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        toml::from_str(&content).map_err(|e| {
            wright_util::errors::WrightError::Config {
                message: format!("Failed to parse {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Returns the path to the wright data directory (`~/.wright/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".wright")
}
