//! Formatting of received messages and packet descriptions.

use std::io::{self, Write};

use mqttsn_core::{type_name, Packet, SubscribeTopic};

/// Local time as `YYYY-MM-DD HH:MM:SS`.
pub fn local_timestamp() -> String {
    let mut buf = [0u8; 32];
    // SAFETY: localtime_r writes into our tm; strftime writes at most
    // buf.len() bytes and returns the count written.
    let written = unsafe {
        let now = libc::time(std::ptr::null_mut());
        let mut tm: libc::tm = std::mem::zeroed();
        if libc::localtime_r(&now, &mut tm).is_null() {
            return String::new();
        }
        libc::strftime(
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            b"%Y-%m-%d %H:%M:%S\0".as_ptr() as *const libc::c_char,
            &tm,
        )
    };
    String::from_utf8_lossy(&buf[..written]).into_owned()
}

/// Write one received message as a line: optional timestamp, optional
/// `topic: ` prefix, then the raw payload.
pub fn write_message<W: Write>(
    out: &mut W,
    timestamp: Option<&str>,
    topic: Option<&str>,
    payload: &[u8],
) -> io::Result<()> {
    if let Some(timestamp) = timestamp {
        write!(out, "{} ", timestamp)?;
    }
    if let Some(topic) = topic {
        write!(out, "{}: ", topic)?;
    }
    out.write_all(payload)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Description of a packet the codec rejected: just its type and length.
pub fn describe_raw(raw: &[u8]) -> String {
    let name = raw.get(1).map_or("UNKNOWN", |tag| type_name(*tag));
    format!("{}: len={}", name, raw.len())
}

/// One-line description of a packet, as printed by `mqtt-sn-dump -a`.
pub fn describe_packet(packet: &Packet, len: usize) -> String {
    let name = packet.packet_type();
    match packet {
        Packet::Connect(connect) => format!(
            "{}: len={} protocol_id={} duration={} client_id={}",
            name, len, connect.protocol_id, connect.duration, connect.client_id
        ),
        Packet::Connack { return_code } => format!(
            "{}: len={} return_code={}",
            name,
            len,
            u8::from(*return_code)
        ),
        Packet::Register(register) => format!(
            "{}: len={} topic_id=0x{:04x} message_id=0x{:04x} topic_name={}",
            name, len, register.topic_id, register.message_id, register.topic_name
        ),
        Packet::Regack(ack) => format!(
            "{}: len={} topic_id=0x{:04x} message_id=0x{:04x} return_code={}",
            name,
            len,
            ack.topic_id,
            ack.message_id,
            u8::from(ack.return_code)
        ),
        Packet::Publish(publish) => format!(
            "{}: len={} topic_id=0x{:04x} message_id=0x{:04x} data={}",
            name,
            len,
            publish.topic_id,
            publish.message_id,
            String::from_utf8_lossy(&publish.payload)
        ),
        Packet::Puback(ack) => format!(
            "{}: len={} topic_id=0x{:04x} message_id=0x{:04x} return_code={}",
            name,
            len,
            ack.topic_id,
            ack.message_id,
            u8::from(ack.return_code)
        ),
        Packet::Subscribe(subscribe) => match &subscribe.topic {
            SubscribeTopic::Name(topic_name) => format!(
                "{}: len={} message_id=0x{:04x} topic_name={}",
                name, len, subscribe.message_id, topic_name
            ),
            SubscribeTopic::Id(topic_id) => format!(
                "{}: len={} message_id=0x{:04x} topic_id=0x{:04x}",
                name, len, subscribe.message_id, topic_id
            ),
        },
        Packet::Suback(ack) => format!(
            "{}: len={} topic_id=0x{:04x} message_id=0x{:04x} return_code={}",
            name,
            len,
            ack.topic_id,
            ack.message_id,
            u8::from(ack.return_code)
        ),
        Packet::Disconnect {
            duration: Some(duration),
        } => format!("{}: len={} duration={}", name, len, duration),
        Packet::Frwdencap(encap) => format!(
            "{}: len={} ctrl={} wireless_node_id={:02X?}",
            name,
            len,
            encap.control,
            &encap.wireless_node_id[..]
        ),
        _ => format!("{}: len={}", name, len),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use mqttsn_core::{decode_packet, Flags, Publish, QoS, TopicType};

    use super::*;

    #[test]
    fn test_describe_qos_minus_one_publish() {
        let mut raw = vec![18, 0x0C, 0x62, b'T', b'T', 0x00, 0x00];
        raw.extend_from_slice(b"Hello World");
        let packet = decode_packet(&raw).unwrap();
        assert_eq!(
            describe_packet(&packet, raw.len()),
            "PUBLISH: len=18 topic_id=0x5454 message_id=0x0000 data=Hello World"
        );
    }

    #[test]
    fn test_describe_other_packets() {
        assert_eq!(describe_packet(&Packet::Pingreq, 2), "PINGREQ: len=2");
        assert_eq!(
            describe_packet(&Packet::Disconnect { duration: Some(30) }, 4),
            "DISCONNECT: len=4 duration=30"
        );
        let packet = decode_packet(&[0x07, 0x0B, 0x00, 0x42, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(
            describe_packet(&packet, 7),
            "REGACK: len=7 topic_id=0x0042 message_id=0x0001 return_code=0"
        );
    }

    #[test]
    fn test_describe_undecodable_packets() {
        // Unassigned type tag
        assert_eq!(describe_raw(&[0x03, 0x03, 0x00]), "UNKNOWN: len=3");
        assert!(decode_packet(&[0x03, 0x11, 0x00]).is_err());
        assert_eq!(describe_raw(&[0x03, 0x11, 0x00]), "UNKNOWN: len=3");

        // Known type with truncated fields
        let truncated = [0x04, 0x0B, 0x00, 0x42];
        assert!(decode_packet(&truncated).is_err());
        assert_eq!(describe_raw(&truncated), "REGACK: len=4");

        assert_eq!(describe_raw(&[0x05]), "UNKNOWN: len=1");
    }

    #[test]
    fn test_write_message() {
        let mut out = Vec::new();
        write_message(&mut out, None, None, b"Hello World").unwrap();
        assert_eq!(out, b"Hello World\n");

        let mut out = Vec::new();
        write_message(&mut out, Some("2024-01-02 03:04:05"), Some("test"), b"on").unwrap();
        assert_eq!(out, b"2024-01-02 03:04:05 test: on\n");
    }

    #[test]
    fn test_local_timestamp_shape() {
        let ts = local_timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }

    #[test]
    fn test_binary_payload_written_verbatim() {
        let publish = Publish {
            flags: Flags {
                qos: QoS::AtMostOnce,
                topic_type: TopicType::Normal,
                ..Default::default()
            },
            topic_id: 1,
            message_id: 1,
            payload: Bytes::from_static(&[0x00, 0xFF, 0x10]),
        };
        let mut out = Vec::new();
        write_message(&mut out, None, None, &publish.payload).unwrap();
        assert_eq!(out, vec![0x00, 0xFF, 0x10, b'\n']);
    }
}
