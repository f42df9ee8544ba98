//! Configuration file support for toolbus
//!
//! Config is loaded from `~/.toolbus/config.toml` (or `$TOOLBUS_HOME/config.toml`).
//! Environment variables override config file settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global config instance (loaded once on first access).
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::load)
}

/// Home directory for logs and configuration.
pub fn toolbus_dir() -> PathBuf {
    if let Ok(home) = std::env::var("TOOLBUS_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".toolbus")
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Session (caller-side) configuration
    pub session: SessionConfig,

    /// Bounded-retry defaults for outbound requests from tool bodies
    pub retry: RetryConfig,

    /// Webhook notification configuration
    pub notify: NotifyConfig,

    /// Server endpoint configuration
    pub server: ServerConfig,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default deadline for `call_with_timeout`, in seconds
    pub call_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempt budget (first try included)
    pub attempts: u32,
    /// Base delay for linear backoff, in milliseconds
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Notify configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URL for the slack_notify tool; unset means log-only delivery
    pub webhook_url: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name reported in logs
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "toolbus".to_string(),
        }
    }
}

impl Config {
    /// Load config from disk, then apply environment overrides.
    pub fn load() -> Self {
        let path = toolbus_dir().join("config.toml");
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                crate::logging::warn(&format!(
                    "Invalid config at {}: {} (using defaults)",
                    path.display(),
                    e
                ));
                Config::default()
            }),
            Err(_) => Config::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TOOLBUS_CALL_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.session.call_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("TOOLBUS_RETRY_ATTEMPTS") {
            if let Ok(attempts) = v.parse() {
                self.retry.attempts = attempts;
            }
        }
        if let Ok(v) = std::env::var("TOOLBUS_WEBHOOK_URL") {
            if !v.is_empty() {
                self.notify.webhook_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("TOOLBUS_SERVER_NAME") {
            if !v.is_empty() {
                self.server.name = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session.call_timeout_secs, 30);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(config.notify.webhook_url.is_none());
        assert_eq!(config.server.name, "toolbus");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retry]
            attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.session.call_timeout_secs, 30);
    }

    #[test]
    fn test_full_toml() {
        let config: Config = toml::from_str(
            r#"
            [session]
            call_timeout_secs = 5

            [notify]
            webhook_url = "https://hooks.example.test/T000"

            [server]
            name = "integration"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.call_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://hooks.example.test/T000")
        );
        assert_eq!(config.server.name, "integration");
    }
}
