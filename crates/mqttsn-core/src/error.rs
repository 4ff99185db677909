//! Codec error types.

use thiserror::Error;

/// Errors raised while decoding a received buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Bad length byte, length/size mismatch, unknown type tag or an
    /// unexpected Forwarder Encapsulation state.
    #[error("Invalid framing: {0}")]
    InvalidFraming(String),

    #[error("Incomplete packet: need {needed} bytes, have {have}")]
    IncompletePacket { needed: usize, have: usize },

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),
}

/// Errors raised while encoding a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} is too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
}
