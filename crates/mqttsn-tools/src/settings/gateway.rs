//! Gateway address configuration.

use serde::Deserialize;

/// Default gateway host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default gateway port.
pub const DEFAULT_PORT: u16 = mqttsn_client::DEFAULT_PORT;

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Gateway UDP port (also the listening port of the dump tool).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Local port to send from.
    pub source_port: Option<u16>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            source_port: None,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("gateway.host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("gateway.port must not be 0".to_string());
        }
        if self.source_port == Some(0) {
            return Err("gateway.source_port must not be 0".to_string());
        }
        Ok(())
    }
}
