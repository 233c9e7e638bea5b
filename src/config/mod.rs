//! Console Configuration Module
//!
//! Per-deployment configuration loaded from TOML, replacing hardcoded broker
//! addresses and patrol timing with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `SENTRY_CONSOLE_CONFIG` environment variable (path to TOML file)
//! 2. `console.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(ConsoleConfig::load(None));
//!
//! // Anywhere in the codebase:
//! let host = &config::get().broker.host;
//! ```

pub mod defaults;

use serde::Deserialize;
use std::sync::OnceLock;

/// Global console configuration, initialized once at startup.
static CONSOLE_CONFIG: OnceLock<ConsoleConfig> = OnceLock::new();

/// Initialize the global console configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: ConsoleConfig) {
    if CONSOLE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global console configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static ConsoleConfig {
    CONSOLE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    CONSOLE_CONFIG.get().is_some()
}

// ============================================================================
// Configuration Sections
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub patrol: PatrolConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

/// MQTT broker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Record store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Patrol schedule generation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PatrolConfig {
    /// Checkpoint names in patrol order
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<String>,
    /// Nominal seconds between consecutive checkpoint visits for one sentry
    #[serde(default = "default_leg_interval_secs")]
    pub leg_interval_secs: u64,
    /// Maximum random jitter applied to each expected visit time
    #[serde(default = "default_leg_jitter_secs")]
    pub leg_jitter_secs: u64,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}
fn default_broker_host() -> String {
    defaults::BROKER_HOST.to_string()
}
fn default_broker_port() -> u16 {
    defaults::BROKER_PORT
}
fn default_client_id() -> String {
    defaults::MQTT_CLIENT_ID.to_string()
}
fn default_keep_alive_secs() -> u64 {
    defaults::MQTT_KEEP_ALIVE_SECS
}
fn default_db_path() -> String {
    defaults::DB_PATH.to_string()
}
fn default_checkpoints() -> Vec<String> {
    defaults::CHECKPOINTS.iter().map(|c| c.to_string()).collect()
}
fn default_leg_interval_secs() -> u64 {
    defaults::LEG_INTERVAL_SECS
}
fn default_leg_jitter_secs() -> u64 {
    defaults::LEG_JITTER_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            leg_interval_secs: default_leg_interval_secs(),
            leg_jitter_secs: default_leg_jitter_secs(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration following the documented precedence order.
    ///
    /// `explicit` is the path from the `--config` flag; it wins over the
    /// `SENTRY_CONSOLE_CONFIG` environment variable.
    pub fn load(explicit: Option<&str>) -> Self {
        let env_path = std::env::var("SENTRY_CONSOLE_CONFIG").ok();
        let configured = explicit.map(str::to_owned).or(env_path);
        let path = configured.as_deref().unwrap_or("console.toml");

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConsoleConfig>(&contents) {
                Ok(config) => {
                    tracing::info!(path = path, "Loaded console configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = path, error = %e, "Invalid console config — using defaults");
                    ConsoleConfig::default()
                }
            },
            Err(_) if configured.is_some() => {
                tracing::warn!(path = path, "Configured file not readable — using defaults");
                ConsoleConfig::default()
            }
            Err(_) => {
                tracing::info!("No console.toml found — using built-in defaults");
                ConsoleConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_populate_every_section() {
        let config = ConsoleConfig::default();
        assert_eq!(config.server.addr, defaults::SERVER_ADDR);
        assert_eq!(config.broker.port, defaults::BROKER_PORT);
        assert_eq!(config.patrol.checkpoints, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_load_explicit_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("console.toml");
        std::fs::write(&path, "[server]\naddr = \"127.0.0.1:9999\"\n").expect("write");

        let config = ConsoleConfig::load(path.to_str());
        assert_eq!(config.server.addr, "127.0.0.1:9999");
        assert_eq!(config.broker.port, defaults::BROKER_PORT);
    }

    #[test]
    fn test_partial_toml_fills_missing_fields() {
        let config: ConsoleConfig = toml::from_str(
            r#"
            [broker]
            host = "broker.internal"
            "#,
        )
        .expect("parse");
        assert_eq!(config.broker.host, "broker.internal");
        assert_eq!(config.broker.port, defaults::BROKER_PORT);
        assert_eq!(config.server.addr, defaults::SERVER_ADDR);
    }
}
