use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::resources::OnboardingLimits;
use crate::store::StoreOptions;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CtxConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub search: SearchConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Store directory. Relative paths resolve against the working directory.
    pub root: String,
    pub lock_wait_ms: u64,
    pub lock_lease_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub branch: String,
    pub remote: String,
    pub network_timeout_secs: u64,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub recent_items: usize,
    pub recent_syncs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7417,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: ".ctxvault".into(),
            lock_wait_ms: 2000,
            lock_lease_secs: 60,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            branch: "ctx/context".into(),
            remote: "origin".into(),
            network_timeout_secs: 30,
            author_name: None,
            author_email: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_items: 10,
            recent_syncs: 5,
        }
    }
}

/// Returns `~/.ctxvault/`, or `./.ctxvault/` when no home directory is known.
pub fn default_ctxvault_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ctxvault")
}

/// Returns the default config file path: `~/.ctxvault/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ctxvault_dir().join("config.toml")
}

impl CtxConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CtxConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (CTXVAULT_ROOT, CTXVAULT_BRANCH,
    /// CTXVAULT_REMOTE, CTXVAULT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CTXVAULT_ROOT") {
            self.store.root = val;
        }
        if let Ok(val) = std::env::var("CTXVAULT_BRANCH") {
            self.sync.branch = val;
        }
        if let Ok(val) = std::env::var("CTXVAULT_REMOTE") {
            self.sync.remote = val;
        }
        if let Ok(val) = std::env::var("CTXVAULT_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the store root, expanding `~` if needed.
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.store.root)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            lock_wait: Duration::from_millis(self.store.lock_wait_ms),
            lock_lease: Duration::from_secs(self.store.lock_lease_secs),
        }
    }

    pub fn onboarding_limits(&self) -> OnboardingLimits {
        OnboardingLimits {
            recent_items: self.session.recent_items,
            recent_syncs: self.session.recent_syncs,
        }
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.network_timeout_secs)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CtxConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.store.root, ".ctxvault");
        assert_eq!(config.sync.branch, "ctx/context");
        assert_eq!(config.store_options().lock_wait, Duration::from_millis(2000));
        assert_eq!(config.store_options().lock_lease, Duration::from_secs(60));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[store]
root = "/tmp/ctx"
lock_wait_ms = 500

[sync]
remote = "upstream"
author_name = "Bot"
"#;
        let config: CtxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.resolved_root(), PathBuf::from("/tmp/ctx"));
        assert_eq!(config.store.lock_wait_ms, 500);
        assert_eq!(config.sync.remote, "upstream");
        assert_eq!(config.sync.author_name.as_deref(), Some("Bot"));
        // defaults still apply for unset fields
        assert_eq!(config.store.lock_lease_secs, 60);
        assert_eq!(config.sync.branch, "ctx/context");
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = CtxConfig::default();
        std::env::set_var("CTXVAULT_ROOT", "/tmp/override");
        std::env::set_var("CTXVAULT_BRANCH", "ctx/other");
        std::env::set_var("CTXVAULT_REMOTE", "mirror");
        std::env::set_var("CTXVAULT_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.store.root, "/tmp/override");
        assert_eq!(config.sync.branch, "ctx/other");
        assert_eq!(config.sync.remote, "mirror");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("CTXVAULT_ROOT");
        std::env::remove_var("CTXVAULT_BRANCH");
        std::env::remove_var("CTXVAULT_REMOTE");
        std::env::remove_var("CTXVAULT_LOG_LEVEL");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CtxConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.recent_items, 10);
    }
}
