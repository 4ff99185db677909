//! Forwarder Encapsulation configuration.

use serde::Deserialize;

use mqttsn_core::frwdencap::MAX_WIRELESS_NODE_ID_LENGTH;

/// Forwarder Encapsulation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Wrap all traffic in FRWDENCAP packets.
    pub enabled: bool,

    /// Wireless node id; defaults to the process id in hex.
    pub wireless_node_id: Option<String>,
}

impl ForwarderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.wireless_node_id {
            if id.len() > MAX_WIRELESS_NODE_ID_LENGTH {
                return Err(format!(
                    "forwarder.wireless_node_id cannot be more than {} bytes",
                    MAX_WIRELESS_NODE_ID_LENGTH
                ));
            }
        }
        Ok(())
    }
}
