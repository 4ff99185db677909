//! Session configuration.

use serde::Deserialize;

use mqttsn_core::MAX_CLIENT_ID_LENGTH;

/// Default keep alive in seconds.
pub const DEFAULT_KEEP_ALIVE: u16 = mqttsn_client::DEFAULT_KEEP_ALIVE;

/// Default network timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = mqttsn_client::DEFAULT_TIMEOUT.as_secs();

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Client id; empty means `mqtt-sn-tools-<pid>`.
    pub client_id: String,

    /// Keep alive in seconds (0 disables pings).
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,

    /// Seconds to wait for each acknowledgement.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
}

fn default_keep_alive() -> u16 {
    DEFAULT_KEEP_ALIVE
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_clean_session() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            timeout: DEFAULT_TIMEOUT_SECS,
            clean_session: true,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.len() > MAX_CLIENT_ID_LENGTH {
            return Err(format!(
                "session.client_id cannot be more than {} characters",
                MAX_CLIENT_ID_LENGTH
            ));
        }
        if self.timeout == 0 {
            return Err("session.timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}
