//! Database configuration
//!
//! ```toml
//! slow_query_threshold_ms = 500
//!
//! [connection]
//! path = ".rowbind/rowbind.db"
//!
//! [retry]
//! max_attempts = 8
//! initial_backoff_ms = 50
//! max_backoff_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Batches slower than this are logged as warnings.
    pub slow_query_threshold_ms: u64,
    pub connection: ConnectionConfig,
    pub retry: RetryPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 500,
            connection: ConnectionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// SQLite database file; in-memory when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Reconnect policy for dropped connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive failed attempts tolerated without progress. `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Retry forever, like a plain reconnect loop.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Has `attempts` consecutive failures used up the policy?
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rowbind.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".rowbind").join("rowbind.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DatabaseConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DatabaseConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DatabaseConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".rowbind/";

    let mut content = String::new();
    if gitignore_path.exists() {
        content = std::fs::read_to_string(&gitignore_path)?;
        if content.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rowbind.toml");
        let config = DatabaseConfig {
            connection: ConnectionConfig {
                path: Some("data/game.db".to_string()),
            },
            retry: RetryPolicy {
                max_attempts: Some(3),
                initial_backoff_ms: 10,
                max_backoff_ms: 100,
            },
            slow_query_threshold_ms: 250,
        };

        write_config(&path, &config, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: DatabaseConfig = toml::from_str("[retry]\nmax_attempts = 2\n").unwrap();
        assert_eq!(config.retry.max_attempts, Some(2));
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.slow_query_threshold_ms, 500);
        assert!(config.connection.path.is_none());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(10), Duration::from_millis(2000));
        assert!(!policy.is_exhausted(7));
        assert!(policy.is_exhausted(8));
        assert!(!RetryPolicy::unbounded().is_exhausted(u32::MAX));
    }

    #[test]
    fn test_gitignore_entry_added_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/").unwrap();
        ensure_gitignore(dir.path()).unwrap();
        ensure_gitignore(dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target/\n.rowbind/\n");
    }
}
