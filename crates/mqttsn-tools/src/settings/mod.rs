//! Layered settings shared by the command-line tools.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - TOML file (default: `mqtt-sn.toml`, skipped when missing)
//! - environment variables with `MQTTSN__` prefix (double underscore for nesting)
//! - command-line flags, applied by each tool after loading
//!
//! In-file substitution: `${VAR}` or `${VAR:-default}`.
//!
//! ```toml
//! [gateway]
//! host = "${GATEWAY_HOST:-127.0.0.1}"
//! port = 1883
//!
//! [session]
//! keep_alive = 30
//! ```

mod forwarder;
mod gateway;
mod log;
mod session;

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use mqttsn_client::ClientConfig;
use regex::Regex;
use serde::Deserialize;

pub use forwarder::ForwarderConfig;
pub use gateway::{GatewayConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use log::LogConfig;
pub use session::{SessionConfig, DEFAULT_KEEP_ALIVE, DEFAULT_TIMEOUT_SECS};

/// Default settings file, read from the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "mqtt-sn.toml";

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

/// Root settings structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub forwarder: ForwarderConfig,
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// Config parsing/loading error.
    Config(config::ConfigError),
    /// Invalid configuration value.
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl Config {
    /// Load settings from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; defaults and the environment still
    /// apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "warn")?
            .set_default("gateway.host", DEFAULT_HOST)?
            .set_default("gateway.port", DEFAULT_PORT as i64)?
            .set_default("session.client_id", "")?
            .set_default("session.keep_alive", DEFAULT_KEEP_ALIVE as i64)?
            .set_default("session.timeout", DEFAULT_TIMEOUT_SECS as i64)?
            .set_default("session.clean_session", true)?
            .set_default("forwarder.enabled", false)?;

        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let substituted = substitute_env_vars(&content)?;
            builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
        }

        // MQTTSN__GATEWAY__PORT, MQTTSN__SESSION__KEEP_ALIVE, ...
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQTTSN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(content)?;
        let config: Config = toml::from_str(&substituted)
            .map_err(|e| ConfigError::Validation(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate().map_err(ConfigError::Validation)?;
        self.session.validate().map_err(ConfigError::Validation)?;
        self.forwarder.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }

    /// Client engine configuration for these settings.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.gateway.host.clone())
            .port(self.gateway.port)
            .source_port(self.gateway.source_port)
            .client_id(self.session.client_id.clone())
            .keep_alive(self.session.keep_alive)
            .clean_session(self.session.clean_session)
            .timeout(Duration::from_secs(self.session.timeout));
        if self.forwarder.enabled {
            client = client.forwarder_encapsulation(
                self.forwarder
                    .wireless_node_id
                    .as_ref()
                    .map(|id| id.clone().into_bytes()),
            );
        }
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 1883);
        assert_eq!(config.session.keep_alive, 10);
        assert!(config.session.clean_session);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[log]
level = "debug"

[gateway]
host = "gw.local"
port = 10000
source_port = 5000

[session]
client_id = "sensor-1"
keep_alive = 60
timeout = 3
clean_session = false

[forwarder]
enabled = true
wireless_node_id = "node7"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.gateway.host, "gw.local");
        assert_eq!(config.gateway.port, 10000);
        assert_eq!(config.gateway.source_port, Some(5000));
        assert_eq!(config.session.client_id, "sensor-1");
        assert_eq!(config.session.keep_alive, 60);
        assert_eq!(config.session.timeout, 3);
        assert!(!config.session.clean_session);
        assert!(config.forwarder.enabled);

        let client = config.client_config();
        assert_eq!(client.host, "gw.local");
        assert_eq!(client.port, 10000);
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert_eq!(client.forwarder, Some(Some(b"node7".to_vec())));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[session]
keep_alive = 0
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.session.keep_alive, 0);
        assert_eq!(config.session.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.gateway.port, 1883);
        assert!(config.client_config().forwarder.is_none());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::parse("[gateway]\nport = 0\n").is_err());
        assert!(Config::parse("[session]\nclient_id = \"abcdefghijklmnopqrstuvwxyz\"\n").is_err());
        let long_id = "x".repeat(253);
        let toml = format!("[forwarder]\nwireless_node_id = \"{}\"\n", long_id);
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MQTTSN_TEST_PORT", "1885");
        let content = r#"
[gateway]
port = ${MQTTSN_TEST_PORT}
"#;
        let substituted = substitute_env_vars(content).unwrap();
        assert!(substituted.contains("port = 1885"));
        std::env::remove_var("MQTTSN_TEST_PORT");
    }

    #[test]
    fn test_env_var_substitution_with_default() {
        std::env::remove_var("MQTTSN_NONEXISTENT_VAR");
        let content = r#"host = "${MQTTSN_NONEXISTENT_VAR:-10.0.0.1}""#;
        let substituted = substitute_env_vars(content).unwrap();
        assert!(substituted.contains("10.0.0.1"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/mqtt-sn.toml").unwrap();
        assert_eq!(config.gateway.host, DEFAULT_HOST);
    }
}
