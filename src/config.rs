use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub clone: CloneConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_http_listen")]
    pub http_listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen: default_http_listen(),
        }
    }
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// Full URL to the GitHub REST API root.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL repositories are cloned from.  Also the prefix of the cache
    /// partition key, so it must be identical for both retrieval paths.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Skip the API path entirely and always use the git CLI fallback.
    #[serde(default)]
    pub force_use_cli: bool,
    /// Hard ceiling on API pages fetched during one cold walk.  Bounds the
    /// worst case at the unauthenticated GitHub rate limit.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl GitHubConfig {
    /// Canonical repository identity, shared by the API and clone paths as
    /// both the clone URL and the cache partition key.
    pub fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}{}/{}", self.base_url, owner, repo)
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            base_url: default_base_url(),
            force_use_cli: false,
            max_pages: default_max_pages(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_base_url() -> String {
    "https://github.com/".to_string()
}

fn default_max_pages() -> u32 {
    60
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "commitcache.db".to_string()
}

// ---------------------------------------------------------------------------
// Retry / timeout policy
// ---------------------------------------------------------------------------

/// Wrapping policy applied uniformly to the API call and to the CLI call.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResilienceConfig {
    /// Total attempts per path (1 = no retry).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            backoff_ms: default_backoff(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    300
}

fn default_backoff() -> u64 {
    200
}

// ---------------------------------------------------------------------------
// Clone path
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CloneConfig {
    /// Bound on the background full-history persistence task.  The clone
    /// path is not complete until that task has finished, so a firing
    /// timeout fails the whole attempt.
    #[serde(default = "default_persist_timeout")]
    pub persist_timeout_secs: u64,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            persist_timeout_secs: default_persist_timeout(),
        }
    }
}

fn default_persist_timeout() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load a [`Config`] from a YAML file at `path`, falling back to the
/// built-in defaults when the file does not exist.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(config.github.max_pages >= 1, "max_pages must be >= 1");
    anyhow::ensure!(config.resilience.attempts >= 1, "attempts must be >= 1");
    anyhow::ensure!(
        config.clone.persist_timeout_secs >= 1,
        "persist_timeout_secs must be >= 1"
    );
    anyhow::ensure!(
        config.github.base_url.ends_with('/'),
        "github base_url must end with '/'"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
