//! Datagram framing: plain MQTT-SN or Forwarder Encapsulation.

use std::fmt;

use bytes::Bytes;
use mqttsn_core::frwdencap;
use mqttsn_core::{validate_framing, DecodeError, EncodeError};

/// An inbound packet with the node id it was encapsulated with, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet: Bytes,
    pub wireless_node_id: Option<Bytes>,
}

/// How packets are wrapped for the wire and unwrapped on receipt.
///
/// Chosen once when a session is built; applies to all traffic on it.
pub trait Framing: fmt::Debug + Send {
    /// Produce the datagram for an encoded packet.
    fn encapsulate(&self, packet: &[u8]) -> Result<Vec<u8>, EncodeError>;

    /// Validate a received datagram and extract the MQTT-SN packet.
    fn decapsulate(&self, datagram: Bytes) -> Result<Frame, DecodeError>;
}

/// Packets travel as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFraming;

impl Framing for PlainFraming {
    fn encapsulate(&self, packet: &[u8]) -> Result<Vec<u8>, EncodeError> {
        Ok(packet.to_vec())
    }

    fn decapsulate(&self, datagram: Bytes) -> Result<Frame, DecodeError> {
        validate_framing(&datagram)?;
        Ok(Frame {
            packet: datagram,
            wireless_node_id: None,
        })
    }
}

/// Every packet is wrapped in FRWDENCAP with a fixed wireless node id, and
/// every inbound datagram must be a FRWDENCAP wrapper.
#[derive(Clone)]
pub struct ForwarderFraming {
    wireless_node_id: Vec<u8>,
}

impl ForwarderFraming {
    pub fn new(wireless_node_id: impl Into<Vec<u8>>) -> Result<Self, EncodeError> {
        let wireless_node_id = wireless_node_id.into();
        if wireless_node_id.len() > frwdencap::MAX_WIRELESS_NODE_ID_LENGTH {
            return Err(EncodeError::TooLong {
                field: "wireless node id",
                len: wireless_node_id.len(),
                max: frwdencap::MAX_WIRELESS_NODE_ID_LENGTH,
            });
        }
        Ok(Self { wireless_node_id })
    }
}

impl fmt::Debug for ForwarderFraming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwarderFraming")
            .field(
                "wireless_node_id",
                &String::from_utf8_lossy(&self.wireless_node_id),
            )
            .finish()
    }
}

impl Framing for ForwarderFraming {
    fn encapsulate(&self, packet: &[u8]) -> Result<Vec<u8>, EncodeError> {
        frwdencap::wrap(packet, &self.wireless_node_id)
    }

    fn decapsulate(&self, datagram: Bytes) -> Result<Frame, DecodeError> {
        if !frwdencap::is_encapsulated(&datagram) {
            return Err(DecodeError::InvalidFraming(
                "expecting forwarder encapsulated packet".into(),
            ));
        }
        let (packet, wireless_node_id) = frwdencap::unwrap(&datagram)?;
        Ok(Frame {
            packet,
            wireless_node_id: Some(wireless_node_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINGRESP: [u8; 2] = [0x02, 0x17];

    #[test]
    fn test_plain_passthrough() {
        let framing = PlainFraming;
        assert_eq!(framing.encapsulate(&PINGRESP).unwrap(), PINGRESP.to_vec());
        let frame = framing
            .decapsulate(Bytes::from_static(&PINGRESP))
            .unwrap();
        assert_eq!(&frame.packet[..], &PINGRESP);
        assert!(frame.wireless_node_id.is_none());
    }

    #[test]
    fn test_plain_rejects_bad_length() {
        let framing = PlainFraming;
        assert!(framing
            .decapsulate(Bytes::from_static(&[0x05, 0x17]))
            .is_err());
    }

    #[test]
    fn test_forwarder_wraps_and_unwraps() {
        let framing = ForwarderFraming::new(b"abc".to_vec()).unwrap();
        let wire = framing.encapsulate(&PINGRESP).unwrap();
        assert_eq!(wire, vec![0x06, 0xFE, 0x00, b'a', b'b', b'c', 0x02, 0x17]);

        let frame = framing.decapsulate(Bytes::from(wire)).unwrap();
        assert_eq!(&frame.packet[..], &PINGRESP);
        assert_eq!(frame.wireless_node_id.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_forwarder_rejects_plain_packets() {
        let framing = ForwarderFraming::new(Vec::new()).unwrap();
        let err = framing
            .decapsulate(Bytes::from_static(&PINGRESP))
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFraming(_)));
    }

    #[test]
    fn test_forwarder_node_id_limit() {
        assert!(ForwarderFraming::new(vec![0u8; 252]).is_ok());
        assert!(ForwarderFraming::new(vec![0u8; 253]).is_err());
    }
}
