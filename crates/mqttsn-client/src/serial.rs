//! Length-prefixed packet framing over a serial byte stream.

use std::io::{Read, Write};

use bytes::Bytes;
use log::trace;
use mqttsn_core::{DecodeError, EXTENDED_LENGTH_MARKER};

use crate::error::Result;

/// Reads and writes whole MQTT-SN packets on a byte stream, using the first
/// byte of each packet as its length.
#[derive(Debug)]
pub struct SerialLink<T> {
    inner: T,
}

impl<T> SerialLink<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: Read> SerialLink<T> {
    /// Read one packet: the length byte, then exactly `length - 1` bytes.
    pub fn read_packet(&mut self) -> Result<Bytes> {
        let mut len = [0u8; 1];
        self.inner.read_exact(&mut len)?;
        match len[0] {
            0 => {
                return Err(DecodeError::InvalidFraming(
                    "serial packet length header is not valid".into(),
                )
                .into())
            }
            EXTENDED_LENGTH_MARKER => {
                return Err(DecodeError::InvalidFraming(
                    "serial packet uses unsupported extended length".into(),
                )
                .into())
            }
            _ => {}
        }

        let mut packet = vec![0u8; len[0] as usize];
        packet[0] = len[0];
        self.inner.read_exact(&mut packet[1..])?;
        trace!("Serial read {:02X?}", packet);
        Ok(Bytes::from(packet))
    }
}

impl<T: Write> SerialLink<T> {
    pub fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        trace!("Serial write {:02X?}", packet);
        self.inner.write_all(packet)?;
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_reads_consecutive_packets() {
        let stream = Cursor::new(vec![0x02, 0x16, 0x03, 0x05, 0x00]);
        let mut link = SerialLink::new(stream);
        assert_eq!(&link.read_packet().unwrap()[..], &[0x02, 0x16]);
        assert_eq!(&link.read_packet().unwrap()[..], &[0x03, 0x05, 0x00]);
        assert!(matches!(link.read_packet(), Err(ClientError::Io(_))));
    }

    #[test]
    fn test_zero_length_is_fatal() {
        let mut link = SerialLink::new(Cursor::new(vec![0x00, 0x16]));
        assert!(matches!(
            link.read_packet(),
            Err(ClientError::Decode(DecodeError::InvalidFraming(_)))
        ));
    }

    #[test]
    fn test_short_read_is_error() {
        let mut link = SerialLink::new(Cursor::new(vec![0x05, 0x0C, 0x00]));
        assert!(matches!(link.read_packet(), Err(ClientError::Io(_))));
    }

    #[test]
    fn test_write_packet() {
        let mut link = SerialLink::new(Vec::new());
        link.write_packet(&[0x02, 0x17]).unwrap();
        assert_eq!(link.get_ref(), &vec![0x02, 0x17]);
    }
}
