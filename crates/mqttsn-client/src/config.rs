//! Client configuration types.

use std::time::Duration;

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 1883;

/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE: u16 = 10;

/// Default network receive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway host name or address.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Local port to bind before connecting.
    pub source_port: Option<u16>,
    /// Client identifier; empty means a generated `mqtt-sn-tools-<pid>`.
    pub client_id: String,
    /// Keep-alive interval in seconds (0 = disabled).
    pub keep_alive: u16,
    /// Clean session flag.
    pub clean_session: bool,
    /// Receive timeout, refreshed on every blocking call.
    pub timeout: Duration,
    /// Forwarder Encapsulation. `Some(None)` uses the default node id.
    pub forwarder: Option<Option<Vec<u8>>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            source_port: None,
            client_id: String::new(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
            timeout: DEFAULT_TIMEOUT,
            forwarder: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config for the given gateway host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn source_port(mut self, port: Option<u16>) -> Self {
        self.source_port = port;
        self
    }

    /// Set the client ID.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set clean session flag.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set the network receive timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable Forwarder Encapsulation, optionally with an explicit node id.
    pub fn forwarder_encapsulation(mut self, wireless_node_id: Option<Vec<u8>>) -> Self {
        self.forwarder = Some(wireless_node_id);
        self
    }
}

/// `mqtt-sn-tools-<pid>`.
fn default_client_id() -> String {
    format!("mqtt-sn-tools-{}", std::process::id())
}

/// The configured client id, or a generated one when it is empty. Length
/// is checked when CONNECT is encoded.
pub(crate) fn client_id_or_default(client_id: &str) -> String {
    if client_id.is_empty() {
        default_client_id()
    } else {
        client_id.to_string()
    }
}

/// Hex string of the process id, used when no wireless node id is given.
pub fn default_wireless_node_id() -> Vec<u8> {
    format!("{:X}", std::process::id()).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqttsn_core::MAX_CLIENT_ID_LENGTH;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive, 10);
        assert!(config.clean_session);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.forwarder.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("gw.local")
            .port(10000)
            .source_port(Some(5000))
            .client_id("c1")
            .keep_alive(60)
            .clean_session(false)
            .forwarder_encapsulation(Some(b"node".to_vec()));
        assert_eq!(config.host, "gw.local");
        assert_eq!(config.port, 10000);
        assert_eq!(config.source_port, Some(5000));
        assert_eq!(config.client_id, "c1");
        assert_eq!(config.keep_alive, 60);
        assert!(!config.clean_session);
        assert_eq!(config.forwarder, Some(Some(b"node".to_vec())));
    }

    #[test]
    fn test_generated_client_id() {
        let id = client_id_or_default("");
        assert!(id.starts_with("mqtt-sn-tools-"));
        assert!(id.len() <= MAX_CLIENT_ID_LENGTH);
        assert_eq!(client_id_or_default("c1"), "c1");
    }
}
