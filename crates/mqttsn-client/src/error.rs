//! Client error types.

use std::io;

use mqttsn_core::{DecodeError, EncodeError, PacketType, ReturnCode};
use thiserror::Error;

/// Client error type.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to resolve {0}")]
    AddressResolution(String),

    #[error("Could not connect to remote host: {0}")]
    ConnectFailed(String),

    /// A non-zero return code in CONNACK, REGACK, SUBACK or PUBACK.
    #[error("{request} error: {code}")]
    Rejected {
        request: PacketType,
        code: ReturnCode,
    },

    #[error("Timed out waiting for {0}")]
    Timeout(PacketType),

    #[error("Received DISCONNECT from gateway")]
    GatewayDisconnected,

    #[error("Keep alive error: timed out while waiting for a packet from the gateway")]
    KeepAliveTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ClientError {
    /// Process exit status for this error: the MQTT-SN return code for a
    /// rejection, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Rejected { code, .. } => match u8::from(*code) {
                0 => 1,
                code => i32::from(code),
            },
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
