//! mqttsn-core - MQTT-SN packet types and codec.
//!
//! This crate provides MQTT-SN v1.2 packet encoding/decoding and Forwarder
//! Encapsulation, shared between the client engine and the command-line tools.

pub mod error;
pub mod frwdencap;
pub mod packet;

pub use error::{DecodeError, EncodeError};
pub use frwdencap::Frwdencap;
pub use packet::*;
