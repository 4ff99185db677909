//! Forwarder Encapsulation (FRWDENCAP).
//!
//! Wire layout: `[3 + N] [0xFE] [ctrl] [node id: N bytes] [inner packet]`.
//! The leading length byte counts only the encapsulation header; the inner
//! packet carries its own length.

use bytes::Bytes;

use crate::error::{DecodeError, EncodeError};
use crate::packet::{validate_framing, Decoder, PacketType, MAX_PACKET_LENGTH};

/// Length, type and control bytes.
pub const HEADER_LENGTH: usize = 3;

/// Largest wireless node id that still fits the one byte header length.
pub const MAX_WIRELESS_NODE_ID_LENGTH: usize = MAX_PACKET_LENGTH - HEADER_LENGTH;

/// A decoded encapsulation header plus the raw inner packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frwdencap {
    /// Control byte; always 0 (radius) when sent by this engine.
    pub control: u8,
    pub wireless_node_id: Bytes,
    pub packet: Bytes,
}

impl Frwdencap {
    pub fn new(wireless_node_id: impl Into<Bytes>, packet: impl Into<Bytes>) -> Self {
        Self {
            control: 0,
            wireless_node_id: wireless_node_id.into(),
            packet: packet.into(),
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let node_len = self.wireless_node_id.len();
        if node_len > MAX_WIRELESS_NODE_ID_LENGTH {
            return Err(EncodeError::TooLong {
                field: "wireless node id",
                len: node_len,
                max: MAX_WIRELESS_NODE_ID_LENGTH,
            });
        }
        if self.packet.is_empty() || self.packet[0] as usize != self.packet.len() {
            return Err(EncodeError::InvalidPacket(
                "encapsulated packet length does not match its length byte".into(),
            ));
        }

        buf.push((HEADER_LENGTH + node_len) as u8);
        buf.push(PacketType::Frwdencap as u8);
        buf.push(self.control);
        buf.extend_from_slice(&self.wireless_node_id);
        buf.extend_from_slice(&self.packet);
        Ok(())
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        validate_framing(buf)?;
        let header_len = buf[0] as usize;

        let mut dec = Decoder::new(&buf[..header_len]);
        dec.read_u8()?; // header length
        if dec.read_u8()? != PacketType::Frwdencap as u8 {
            return Err(DecodeError::InvalidFraming(
                "expected a Forwarder Encapsulation packet".into(),
            ));
        }
        let control = dec.read_u8()?;
        let wireless_node_id = Bytes::copy_from_slice(dec.read_rest());

        Ok(Self {
            control,
            wireless_node_id,
            packet: Bytes::copy_from_slice(&buf[header_len..]),
        })
    }
}

/// Wrap an encoded packet for sending through a forwarder.
pub fn wrap(packet: &[u8], wireless_node_id: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let encap = Frwdencap::new(
        Bytes::copy_from_slice(wireless_node_id),
        Bytes::copy_from_slice(packet),
    );
    let mut buf = Vec::with_capacity(HEADER_LENGTH + wireless_node_id.len() + packet.len());
    encap.encode(&mut buf)?;
    Ok(buf)
}

/// Split a received FRWDENCAP buffer into `(inner packet, wireless node id)`.
pub fn unwrap(buf: &[u8]) -> Result<(Bytes, Bytes), DecodeError> {
    let encap = Frwdencap::decode(buf)?;
    Ok((encap.packet, encap.wireless_node_id))
}

/// Whether a raw buffer is a Forwarder Encapsulation packet.
pub fn is_encapsulated(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[1] == PacketType::Frwdencap as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_packet, encode_packet, Packet};

    #[test]
    fn test_wrap_layout() {
        let inner = encode_packet(&Packet::Pingreq).unwrap();
        let wrapped = wrap(&inner, &[0xAB, 0xCD]).unwrap();
        assert_eq!(wrapped, vec![0x05, 0xFE, 0x00, 0xAB, 0xCD, 0x02, 0x16]);
    }

    #[test]
    fn test_unwrap_recovers_node_ids() {
        let inner = encode_packet(&Packet::Disconnect { duration: None }).unwrap();
        for len in [0usize, 1, MAX_WIRELESS_NODE_ID_LENGTH] {
            let node_id: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let wrapped = wrap(&inner, &node_id).unwrap();
            let (packet, id) = unwrap(&wrapped).unwrap();
            assert_eq!(&packet[..], &inner[..]);
            assert_eq!(&id[..], &node_id[..]);
        }
    }

    #[test]
    fn test_node_id_too_long() {
        let inner = encode_packet(&Packet::Pingreq).unwrap();
        let node_id = vec![0u8; MAX_WIRELESS_NODE_ID_LENGTH + 1];
        assert!(matches!(
            wrap(&inner, &node_id),
            Err(EncodeError::TooLong { .. })
        ));
    }

    #[test]
    fn test_decode_packet_sees_frwdencap() {
        let wrapped = wrap(&[0x03, 0x05, 0x00], b"n1").unwrap();
        match decode_packet(&wrapped).unwrap() {
            Packet::Frwdencap(encap) => {
                assert_eq!(encap.control, 0);
                assert_eq!(&encap.wireless_node_id[..], b"n1");
                assert_eq!(&encap.packet[..], &[0x03, 0x05, 0x00]);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_unwrap_rejects_bad_inner_length() {
        // Inner packet claims 4 bytes but only 3 follow the header
        let buf = [0x04, 0xFE, 0x00, 0x01, 0x04, 0x05, 0x00];
        assert!(matches!(unwrap(&buf), Err(DecodeError::InvalidFraming(_))));

        // Header length runs past the end of the buffer
        let buf = [0x09, 0xFE, 0x00, 0x01];
        assert!(matches!(unwrap(&buf), Err(DecodeError::InvalidFraming(_))));
    }

    #[test]
    fn test_is_encapsulated() {
        assert!(is_encapsulated(&[0x03, 0xFE, 0x00]));
        assert!(!is_encapsulated(&[0x02, 0x16]));
        assert!(!is_encapsulated(&[]));
    }
}
