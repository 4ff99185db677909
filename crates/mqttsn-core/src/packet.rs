//! MQTT-SN packet types and codec (MQTT-SN v1.2).
//!
//! Every packet starts with a one byte total length followed by a one byte
//! type tag. Multi-byte integers are big-endian. The extended three byte
//! length form (first byte 0x01) is not supported.

use std::fmt;

use bytes::Bytes;

use crate::error::{DecodeError, EncodeError};
use crate::frwdencap::{self, Frwdencap};

/// Largest packet that fits the one byte length header.
pub const MAX_PACKET_LENGTH: usize = 255;

/// Maximum client identifier length in CONNECT.
pub const MAX_CLIENT_ID_LENGTH: usize = 23;

/// Maximum topic name length in REGISTER and SUBSCRIBE.
pub const MAX_TOPIC_LENGTH: usize = MAX_PACKET_LENGTH - 6;

/// Maximum PUBLISH payload length.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_PACKET_LENGTH - 7;

/// Protocol id carried in CONNECT.
pub const PROTOCOL_ID: u8 = 0x01;

/// First byte value announcing the (unsupported) three byte length form.
pub const EXTENDED_LENGTH_MARKER: u8 = 0x01;

const FLAG_DUP: u8 = 0x80;
const FLAG_RETAIN: u8 = 0x10;
const FLAG_WILL: u8 = 0x08;
const FLAG_CLEAN: u8 = 0x04;
const QOS_SHIFT: u8 = 5;
const QOS_MASK: u8 = 0x03 << QOS_SHIFT;
const TOPIC_TYPE_MASK: u8 = 0x03;

/// MQTT-SN packet type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Advertise = 0x00,
    Searchgw = 0x01,
    Gwinfo = 0x02,
    Connect = 0x04,
    Connack = 0x05,
    Willtopicreq = 0x06,
    Willtopic = 0x07,
    Willmsgreq = 0x08,
    Willmsg = 0x09,
    Register = 0x0A,
    Regack = 0x0B,
    Publish = 0x0C,
    Puback = 0x0D,
    Pubcomp = 0x0E,
    Pubrec = 0x0F,
    Pubrel = 0x10,
    Subscribe = 0x12,
    Suback = 0x13,
    Unsubscribe = 0x14,
    Unsuback = 0x15,
    Pingreq = 0x16,
    Pingresp = 0x17,
    Disconnect = 0x18,
    Willtopicupd = 0x1A,
    Willtopicresp = 0x1B,
    Willmsgupd = 0x1C,
    Willmsgresp = 0x1D,
    Frwdencap = 0xFE,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => PacketType::Advertise,
            0x01 => PacketType::Searchgw,
            0x02 => PacketType::Gwinfo,
            0x04 => PacketType::Connect,
            0x05 => PacketType::Connack,
            0x06 => PacketType::Willtopicreq,
            0x07 => PacketType::Willtopic,
            0x08 => PacketType::Willmsgreq,
            0x09 => PacketType::Willmsg,
            0x0A => PacketType::Register,
            0x0B => PacketType::Regack,
            0x0C => PacketType::Publish,
            0x0D => PacketType::Puback,
            0x0E => PacketType::Pubcomp,
            0x0F => PacketType::Pubrec,
            0x10 => PacketType::Pubrel,
            0x12 => PacketType::Subscribe,
            0x13 => PacketType::Suback,
            0x14 => PacketType::Unsubscribe,
            0x15 => PacketType::Unsuback,
            0x16 => PacketType::Pingreq,
            0x17 => PacketType::Pingresp,
            0x18 => PacketType::Disconnect,
            0x1A => PacketType::Willtopicupd,
            0x1B => PacketType::Willtopicresp,
            0x1C => PacketType::Willmsgupd,
            0x1D => PacketType::Willmsgresp,
            0xFE => PacketType::Frwdencap,
            _ => {
                return Err(DecodeError::InvalidFraming(format!(
                    "unknown packet type: {:#04x}",
                    value
                )))
            }
        })
    }
}

impl PacketType {
    /// Upper-case protocol name of the packet type.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Advertise => "ADVERTISE",
            PacketType::Searchgw => "SEARCHGW",
            PacketType::Gwinfo => "GWINFO",
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Willtopicreq => "WILLTOPICREQ",
            PacketType::Willtopic => "WILLTOPIC",
            PacketType::Willmsgreq => "WILLMSGREQ",
            PacketType::Willmsg => "WILLMSG",
            PacketType::Register => "REGISTER",
            PacketType::Regack => "REGACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pubcomp => "PUBCOMP",
            PacketType::Pubrec => "PUBREC",
            PacketType::Pubrel => "PUBREL",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Suback => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Unsuback => "UNSUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Willtopicupd => "WILLTOPICUPD",
            PacketType::Willtopicresp => "WILLTOPICRESP",
            PacketType::Willmsgupd => "WILLMSGUPD",
            PacketType::Willmsgresp => "WILLMSGRESP",
            PacketType::Frwdencap => "FRWDENCAP",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name for a raw type tag, "UNKNOWN" when the tag is not assigned.
pub fn type_name(tag: u8) -> &'static str {
    PacketType::try_from(tag).map_or("UNKNOWN", PacketType::name)
}

/// Quality of Service levels, including the connectionless level -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
    /// QoS -1: publish on a predefined or short topic without connecting.
    NoConnection,
}

impl QoS {
    /// Map a numeric level {-1, 0, 1, 2} to a QoS.
    pub fn from_level(level: i8) -> Option<Self> {
        match level {
            -1 => Some(QoS::NoConnection),
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::NoConnection,
        }
    }

    fn bits(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
            QoS::NoConnection => 3,
        }
    }
}

/// How the topic field of PUBLISH/SUBSCRIBE/SUBACK is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TopicType {
    #[default]
    Normal = 0x00,
    Predefined = 0x01,
    Short = 0x02,
}

impl TryFrom<u8> for TopicType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(TopicType::Normal),
            0x01 => Ok(TopicType::Predefined),
            0x02 => Ok(TopicType::Short),
            _ => Err(DecodeError::MalformedPacket(format!(
                "reserved topic id type: {:#04x}",
                value
            ))),
        }
    }
}

/// The flags byte shared by CONNECT, PUBLISH, SUBSCRIBE and SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub will: bool,
    pub clean_session: bool,
    pub topic_type: TopicType,
}

impl Flags {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(Self {
            dup: byte & FLAG_DUP != 0,
            qos: QoS::from_bits((byte & QOS_MASK) >> QOS_SHIFT),
            retain: byte & FLAG_RETAIN != 0,
            will: byte & FLAG_WILL != 0,
            clean_session: byte & FLAG_CLEAN != 0,
            topic_type: TopicType::try_from(byte & TOPIC_TYPE_MASK)?,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.qos.bits() << QOS_SHIFT;
        if self.dup {
            byte |= FLAG_DUP;
        }
        if self.retain {
            byte |= FLAG_RETAIN;
        }
        if self.will {
            byte |= FLAG_WILL;
        }
        if self.clean_session {
            byte |= FLAG_CLEAN;
        }
        byte | self.topic_type as u8
    }
}

/// Return codes carried by CONNACK, REGACK, PUBACK and SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Accepted,
    Congestion,
    InvalidTopicId,
    NotSupported,
    Reserved(u8),
}

impl ReturnCode {
    pub fn is_accepted(self) -> bool {
        self == ReturnCode::Accepted
    }
}

impl From<u8> for ReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ReturnCode::Accepted,
            0x01 => ReturnCode::Congestion,
            0x02 => ReturnCode::InvalidTopicId,
            0x03 => ReturnCode::NotSupported,
            other => ReturnCode::Reserved(other),
        }
    }
}

impl From<ReturnCode> for u8 {
    fn from(code: ReturnCode) -> Self {
        match code {
            ReturnCode::Accepted => 0x00,
            ReturnCode::Congestion => 0x01,
            ReturnCode::InvalidTopicId => 0x02,
            ReturnCode::NotSupported => 0x03,
            ReturnCode::Reserved(other) => other,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReturnCode::Accepted => "Accepted",
            ReturnCode::Congestion => "Rejected: congestion",
            ReturnCode::InvalidTopicId => "Rejected: invalid topic ID",
            ReturnCode::NotSupported => "Rejected: not supported",
            ReturnCode::Reserved(_) => "Rejected: unknown reason",
        })
    }
}

/// MQTT-SN packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Connack {
        return_code: ReturnCode,
    },
    Register(Register),
    Regack(Regack),
    Publish(Publish),
    Puback(Puback),
    Subscribe(Subscribe),
    Suback(Suback),
    Pingreq,
    Pingresp,
    /// DISCONNECT, with a sleep duration in seconds for the "asleep" state.
    Disconnect {
        duration: Option<u16>,
    },
    Frwdencap(Frwdencap),
    /// A packet type this engine does not model; the body follows the type tag.
    Other {
        packet_type: PacketType,
        body: Bytes,
    },
}

/// CONNECT packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub flags: Flags,
    pub protocol_id: u8,
    /// Keep-alive duration in seconds.
    pub duration: u16,
    pub client_id: String,
}

/// REGISTER packet data. `topic_id` is 0 when sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub topic_id: u16,
    pub message_id: u16,
    pub topic_name: String,
}

/// REGACK packet data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regack {
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

/// PUBLISH packet data. The payload is binary safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub flags: Flags,
    pub topic_id: u16,
    pub message_id: u16,
    pub payload: Bytes,
}

/// PUBACK packet data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Puback {
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

/// Topic field of SUBSCRIBE: a name (normal or 2 character short) or a
/// predefined id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeTopic {
    Name(String),
    Id(u16),
}

/// SUBSCRIBE packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub flags: Flags,
    pub message_id: u16,
    pub topic: SubscribeTopic,
}

impl Subscribe {
    /// Build a SUBSCRIBE by topic name. Two character names use the short
    /// topic type.
    pub fn by_name(topic_name: impl Into<String>, message_id: u16, qos: QoS) -> Self {
        let topic_name = topic_name.into();
        let topic_type = if topic_name.len() == 2 {
            TopicType::Short
        } else {
            TopicType::Normal
        };
        Self {
            flags: Flags {
                qos,
                topic_type,
                ..Default::default()
            },
            message_id,
            topic: SubscribeTopic::Name(topic_name),
        }
    }

    /// Build a SUBSCRIBE for a predefined topic id.
    pub fn by_id(topic_id: u16, message_id: u16, qos: QoS) -> Self {
        Self {
            flags: Flags {
                qos,
                topic_type: TopicType::Predefined,
                ..Default::default()
            },
            message_id,
            topic: SubscribeTopic::Id(topic_id),
        }
    }
}

/// SUBACK packet data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suback {
    pub flags: Flags,
    pub topic_id: u16,
    pub message_id: u16,
    pub return_code: ReturnCode,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack { .. } => PacketType::Connack,
            Packet::Register(_) => PacketType::Register,
            Packet::Regack(_) => PacketType::Regack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback(_) => PacketType::Puback,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Suback(_) => PacketType::Suback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect { .. } => PacketType::Disconnect,
            Packet::Frwdencap(_) => PacketType::Frwdencap,
            Packet::Other { packet_type, .. } => *packet_type,
        }
    }

    /// Append the wire form of this packet to `buf`.
    ///
    /// On error nothing is left appended.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        if let Packet::Frwdencap(encap) = self {
            return encap.encode(buf);
        }

        let start = buf.len();
        buf.push(0); // length, patched in finish()
        buf.push(self.packet_type() as u8);

        let body = match self {
            Packet::Connect(connect) => encode_connect(connect, buf),
            Packet::Connack { return_code } => {
                buf.push(u8::from(*return_code));
                Ok(())
            }
            Packet::Register(register) => {
                check_len("topic name", register.topic_name.len(), MAX_TOPIC_LENGTH).map(|_| {
                    buf.extend_from_slice(&register.topic_id.to_be_bytes());
                    buf.extend_from_slice(&register.message_id.to_be_bytes());
                    buf.extend_from_slice(register.topic_name.as_bytes());
                })
            }
            Packet::Regack(regack) => {
                encode_ack(regack.topic_id, regack.message_id, regack.return_code, buf);
                Ok(())
            }
            Packet::Publish(publish) => {
                check_len("payload", publish.payload.len(), MAX_PAYLOAD_LENGTH).map(|_| {
                    buf.push(publish.flags.to_byte());
                    buf.extend_from_slice(&publish.topic_id.to_be_bytes());
                    buf.extend_from_slice(&publish.message_id.to_be_bytes());
                    buf.extend_from_slice(&publish.payload);
                })
            }
            Packet::Puback(puback) => {
                encode_ack(puback.topic_id, puback.message_id, puback.return_code, buf);
                Ok(())
            }
            Packet::Subscribe(subscribe) => encode_subscribe(subscribe, buf),
            Packet::Suback(suback) => {
                buf.push(suback.flags.to_byte());
                encode_ack(suback.topic_id, suback.message_id, suback.return_code, buf);
                Ok(())
            }
            Packet::Pingreq | Packet::Pingresp => Ok(()),
            Packet::Disconnect { duration } => {
                if let Some(duration) = duration {
                    buf.extend_from_slice(&duration.to_be_bytes());
                }
                Ok(())
            }
            Packet::Other { body, .. } => {
                buf.extend_from_slice(body);
                Ok(())
            }
            Packet::Frwdencap(_) => unreachable!("handled above"),
        };

        if let Err(e) = body {
            buf.truncate(start);
            return Err(e);
        }
        finish(buf, start)
    }
}

/// Encode a packet into a new buffer.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(MAX_PACKET_LENGTH);
    packet.encode(&mut buf)?;
    Ok(buf)
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), EncodeError> {
    if len > max {
        return Err(EncodeError::TooLong { field, len, max });
    }
    Ok(())
}

/// Write the length byte at `start` once the body is complete.
fn finish(buf: &mut Vec<u8>, start: usize) -> Result<(), EncodeError> {
    let len = buf.len() - start;
    if len > MAX_PACKET_LENGTH {
        buf.truncate(start);
        return Err(EncodeError::TooLong {
            field: "packet",
            len,
            max: MAX_PACKET_LENGTH,
        });
    }
    buf[start] = len as u8;
    Ok(())
}

fn encode_connect(connect: &Connect, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    check_len("client id", connect.client_id.len(), MAX_CLIENT_ID_LENGTH)?;
    buf.push(connect.flags.to_byte());
    buf.push(connect.protocol_id);
    buf.extend_from_slice(&connect.duration.to_be_bytes());
    buf.extend_from_slice(connect.client_id.as_bytes());
    Ok(())
}

fn encode_subscribe(subscribe: &Subscribe, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    if let SubscribeTopic::Name(name) = &subscribe.topic {
        check_len("topic name", name.len(), MAX_TOPIC_LENGTH)?;
    }
    buf.push(subscribe.flags.to_byte());
    buf.extend_from_slice(&subscribe.message_id.to_be_bytes());
    match &subscribe.topic {
        SubscribeTopic::Name(name) => buf.extend_from_slice(name.as_bytes()),
        SubscribeTopic::Id(topic_id) => buf.extend_from_slice(&topic_id.to_be_bytes()),
    }
    Ok(())
}

fn encode_ack(topic_id: u16, message_id: u16, return_code: ReturnCode, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&topic_id.to_be_bytes());
    buf.extend_from_slice(&message_id.to_be_bytes());
    buf.push(u8::from(return_code));
}

/// Cursor over a packet body with bounds-checked reads.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::IncompletePacket { needed: 1, have: 0 });
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        if self.remaining() < 2 {
            return Err(DecodeError::IncompletePacket {
                needed: 2,
                have: self.remaining(),
            });
        }
        let val = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    /// Everything left in the body.
    pub(crate) fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    fn read_string_rest(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_rest();
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::MalformedPacket("invalid UTF-8 string".into()))
    }

    /// Topic names from a gateway are taken as-is; invalid UTF-8 is replaced
    /// so the REGISTER can still be acknowledged.
    fn read_string_lossy(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    /// Fixed-size packets must not carry trailing bytes.
    fn finish(&self, packet_type: PacketType) -> Result<(), DecodeError> {
        if self.remaining() != 0 {
            return Err(DecodeError::MalformedPacket(format!(
                "{} has {} unexpected trailing bytes",
                packet_type,
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Check the length header of a received buffer against its actual size.
///
/// For a Forwarder Encapsulation buffer the length byte covers only the
/// encapsulation header, and header length plus the inner packet's own
/// length must add up to the buffer size.
pub fn validate_framing(buf: &[u8]) -> Result<(), DecodeError> {
    let Some(&declared) = buf.first() else {
        return Err(DecodeError::InvalidFraming("empty packet".into()));
    };

    match declared {
        0x00 => {
            return Err(DecodeError::InvalidFraming(
                "packet length header is not valid".into(),
            ))
        }
        EXTENDED_LENGTH_MARKER => {
            return Err(DecodeError::InvalidFraming(
                "packet received is longer than this tool can handle".into(),
            ))
        }
        _ => {}
    }

    if buf.len() >= 2 && buf[1] == PacketType::Frwdencap as u8 {
        let header_len = declared as usize;
        if header_len < frwdencap::HEADER_LENGTH || buf.len() <= header_len {
            return Err(DecodeError::InvalidFraming(format!(
                "read {} bytes but encapsulation header is {} bytes",
                buf.len(),
                header_len
            )));
        }
        return validate_framing(&buf[header_len..]).map_err(|e| match e {
            DecodeError::InvalidFraming(msg) => {
                DecodeError::InvalidFraming(format!("encapsulated packet: {}", msg))
            }
            other => other,
        });
    }

    if declared as usize != buf.len() {
        return Err(DecodeError::InvalidFraming(format!(
            "read {} bytes but packet length is {} bytes",
            buf.len(),
            declared
        )));
    }
    Ok(())
}

/// Decode and validate one complete packet.
pub fn decode_packet(buf: &[u8]) -> Result<Packet, DecodeError> {
    validate_framing(buf)?;
    if buf.len() < 2 {
        return Err(DecodeError::InvalidFraming(
            "packet is too short to carry a type".into(),
        ));
    }

    let packet_type = PacketType::try_from(buf[1])?;
    if packet_type == PacketType::Frwdencap {
        return Frwdencap::decode(buf).map(Packet::Frwdencap);
    }

    let mut dec = Decoder::new(&buf[2..]);
    let packet = match packet_type {
        PacketType::Connect => {
            let flags = Flags::from_byte(dec.read_u8()?)?;
            let protocol_id = dec.read_u8()?;
            let duration = dec.read_u16()?;
            let client_id = dec.read_string_rest()?;
            if client_id.len() > MAX_CLIENT_ID_LENGTH {
                return Err(DecodeError::MalformedPacket(format!(
                    "client id is {} bytes (max {})",
                    client_id.len(),
                    MAX_CLIENT_ID_LENGTH
                )));
            }
            Packet::Connect(Connect {
                flags,
                protocol_id,
                duration,
                client_id,
            })
        }
        PacketType::Connack => Packet::Connack {
            return_code: ReturnCode::from(dec.read_u8()?),
        },
        PacketType::Register => Packet::Register(Register {
            topic_id: dec.read_u16()?,
            message_id: dec.read_u16()?,
            topic_name: dec.read_string_lossy(),
        }),
        PacketType::Regack => Packet::Regack(Regack {
            topic_id: dec.read_u16()?,
            message_id: dec.read_u16()?,
            return_code: ReturnCode::from(dec.read_u8()?),
        }),
        PacketType::Publish => Packet::Publish(Publish {
            flags: Flags::from_byte(dec.read_u8()?)?,
            topic_id: dec.read_u16()?,
            message_id: dec.read_u16()?,
            payload: Bytes::copy_from_slice(dec.read_rest()),
        }),
        PacketType::Puback => Packet::Puback(Puback {
            topic_id: dec.read_u16()?,
            message_id: dec.read_u16()?,
            return_code: ReturnCode::from(dec.read_u8()?),
        }),
        PacketType::Subscribe => {
            let flags = Flags::from_byte(dec.read_u8()?)?;
            let message_id = dec.read_u16()?;
            let topic = if flags.topic_type == TopicType::Predefined {
                SubscribeTopic::Id(dec.read_u16()?)
            } else {
                SubscribeTopic::Name(dec.read_string_rest()?)
            };
            Packet::Subscribe(Subscribe {
                flags,
                message_id,
                topic,
            })
        }
        PacketType::Suback => Packet::Suback(Suback {
            flags: Flags::from_byte(dec.read_u8()?)?,
            topic_id: dec.read_u16()?,
            message_id: dec.read_u16()?,
            return_code: ReturnCode::from(dec.read_u8()?),
        }),
        PacketType::Pingreq => {
            // A sleeping client may append its client id; it is not needed here.
            dec.read_rest();
            Packet::Pingreq
        }
        PacketType::Pingresp => Packet::Pingresp,
        PacketType::Disconnect => {
            let duration = match dec.remaining() {
                0 => None,
                _ => Some(dec.read_u16()?),
            };
            Packet::Disconnect { duration }
        }
        other => Packet::Other {
            packet_type: other,
            body: Bytes::copy_from_slice(dec.read_rest()),
        },
    };

    dec.finish(packet_type)?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) -> Vec<u8> {
        let bytes = encode_packet(&packet).unwrap();
        assert_eq!(bytes[0] as usize, bytes.len());
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
        bytes
    }

    #[test]
    fn test_connect_layout() {
        let bytes = roundtrip(Packet::Connect(Connect {
            flags: Flags {
                clean_session: true,
                ..Default::default()
            },
            protocol_id: PROTOCOL_ID,
            duration: 60,
            client_id: "c1".into(),
        }));
        assert_eq!(bytes, vec![0x08, 0x04, 0x04, 0x01, 0x00, 0x3C, b'c', b'1']);
    }

    #[test]
    fn test_connect_client_id_too_long() {
        let packet = Packet::Connect(Connect {
            flags: Flags::default(),
            protocol_id: PROTOCOL_ID,
            duration: 10,
            client_id: "x".repeat(24),
        });
        let mut buf = vec![0xAA];
        let err = packet.encode(&mut buf).unwrap_err();
        assert!(matches!(err, EncodeError::TooLong { max: 23, .. }));
        // Nothing left behind on failure
        assert_eq!(buf, vec![0xAA]);
    }

    #[test]
    fn test_register_layout() {
        let bytes = roundtrip(Packet::Register(Register {
            topic_id: 0,
            message_id: 1,
            topic_name: "sensors/temp".into(),
        }));
        assert_eq!(bytes.len(), 6 + "sensors/temp".len());
        assert_eq!(&bytes[1..6], &[0x0A, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_register_topic_limits() {
        let max = Packet::Register(Register {
            topic_id: 0,
            message_id: 1,
            topic_name: "t".repeat(MAX_TOPIC_LENGTH),
        });
        assert_eq!(encode_packet(&max).unwrap().len(), MAX_PACKET_LENGTH);

        let over = Packet::Register(Register {
            topic_id: 0,
            message_id: 1,
            topic_name: "t".repeat(MAX_TOPIC_LENGTH + 1),
        });
        assert!(matches!(
            encode_packet(&over),
            Err(EncodeError::TooLong {
                field: "topic name",
                ..
            })
        ));
    }

    #[test]
    fn test_register_with_invalid_utf8_name() {
        let packet = decode_packet(&[0x08, 0x0A, 0x00, 0x10, 0x00, 0x05, 0xFF, 0xFE]).unwrap();
        match packet {
            Packet::Register(register) => {
                assert_eq!(register.topic_id, 0x0010);
                assert_eq!(register.message_id, 0x0005);
                assert_eq!(register.topic_name, "\u{FFFD}\u{FFFD}");
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_publish_layout() {
        let bytes = roundtrip(Packet::Publish(Publish {
            flags: Flags {
                qos: QoS::AtLeastOnce,
                retain: true,
                topic_type: TopicType::Normal,
                ..Default::default()
            },
            topic_id: 0x0042,
            message_id: 0x0102,
            payload: Bytes::from_static(b"25.3"),
        }));
        assert_eq!(
            bytes,
            vec![0x0B, 0x0C, 0x30, 0x00, 0x42, 0x01, 0x02, b'2', b'5', b'.', b'3']
        );
    }

    #[test]
    fn test_publish_binary_payload() {
        let payload: Vec<u8> = (0..=255u8).take(MAX_PAYLOAD_LENGTH).collect();
        roundtrip(Packet::Publish(Publish {
            flags: Flags::default(),
            topic_id: 1,
            message_id: 1,
            payload: Bytes::from(payload),
        }));
    }

    #[test]
    fn test_publish_payload_too_big() {
        let packet = Packet::Publish(Publish {
            flags: Flags::default(),
            topic_id: 1,
            message_id: 1,
            payload: Bytes::from(vec![0u8; MAX_PAYLOAD_LENGTH + 1]),
        });
        assert!(matches!(
            encode_packet(&packet),
            Err(EncodeError::TooLong { field: "payload", .. })
        ));
    }

    #[test]
    fn test_qos_minus_one_flag() {
        let flags = Flags {
            qos: QoS::NoConnection,
            topic_type: TopicType::Predefined,
            ..Default::default()
        };
        assert_eq!(flags.to_byte(), 0x61);
        assert_eq!(Flags::from_byte(0x61).unwrap(), flags);
        assert_eq!(QoS::from_level(-1), Some(QoS::NoConnection));
        assert_eq!(QoS::from_level(3), None);
    }

    #[test]
    fn test_flags_all_bits() {
        let flags = Flags::from_byte(0xFE).unwrap();
        assert!(flags.dup);
        assert_eq!(flags.qos, QoS::NoConnection);
        assert!(flags.retain);
        assert!(flags.will);
        assert!(flags.clean_session);
        assert_eq!(flags.topic_type, TopicType::Short);
        assert_eq!(flags.to_byte(), 0xFE);

        assert!(Flags::from_byte(0x03).is_err());
    }

    #[test]
    fn test_subscribe_by_name_and_id() {
        let bytes = roundtrip(Packet::Subscribe(Subscribe::by_name("test", 7, QoS::AtMostOnce)));
        assert_eq!(bytes, vec![0x09, 0x12, 0x00, 0x00, 0x07, b't', b'e', b's', b't']);

        let short = Subscribe::by_name("TT", 8, QoS::AtMostOnce);
        assert_eq!(short.flags.topic_type, TopicType::Short);
        roundtrip(Packet::Subscribe(short));

        let bytes = roundtrip(Packet::Subscribe(Subscribe::by_id(17, 9, QoS::AtLeastOnce)));
        assert_eq!(bytes, vec![0x07, 0x12, 0x21, 0x00, 0x09, 0x00, 0x11]);
    }

    #[test]
    fn test_acks() {
        let bytes = roundtrip(Packet::Regack(Regack {
            topic_id: 0x0042,
            message_id: 1,
            return_code: ReturnCode::Accepted,
        }));
        assert_eq!(bytes, vec![0x07, 0x0B, 0x00, 0x42, 0x00, 0x01, 0x00]);

        roundtrip(Packet::Puback(Puback {
            topic_id: 3,
            message_id: 4,
            return_code: ReturnCode::InvalidTopicId,
        }));

        let bytes = roundtrip(Packet::Suback(Suback {
            flags: Flags::default(),
            topic_id: 1,
            message_id: 2,
            return_code: ReturnCode::Reserved(0x7F),
        }));
        assert_eq!(bytes.len(), 8);

        let bytes = roundtrip(Packet::Connack {
            return_code: ReturnCode::Congestion,
        });
        assert_eq!(bytes, vec![0x03, 0x05, 0x01]);
    }

    #[test]
    fn test_ping_and_disconnect() {
        assert_eq!(roundtrip(Packet::Pingreq), vec![0x02, 0x16]);
        assert_eq!(roundtrip(Packet::Pingresp), vec![0x02, 0x17]);
        assert_eq!(
            roundtrip(Packet::Disconnect { duration: None }),
            vec![0x02, 0x18]
        );
        assert_eq!(
            roundtrip(Packet::Disconnect {
                duration: Some(300)
            }),
            vec![0x04, 0x18, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_pingreq_with_client_id() {
        let packet = decode_packet(&[0x04, 0x16, b'c', b'1']).unwrap();
        assert_eq!(packet, Packet::Pingreq);
    }

    #[test]
    fn test_unmodelled_type_is_other() {
        let packet = decode_packet(&[0x05, 0x00, 0x01, 0x00, 0x3C]).unwrap();
        assert_eq!(
            packet,
            Packet::Other {
                packet_type: PacketType::Advertise,
                body: Bytes::from_static(&[0x01, 0x00, 0x3C]),
            }
        );
    }

    #[test]
    fn test_reject_reserved_length_bytes() {
        assert!(matches!(
            decode_packet(&[0x00, 0x16]),
            Err(DecodeError::InvalidFraming(_))
        ));
        assert!(matches!(
            decode_packet(&[0x01, 0x00, 0x05, 0x0C]),
            Err(DecodeError::InvalidFraming(_))
        ));
        assert!(matches!(decode_packet(&[]), Err(DecodeError::InvalidFraming(_))));
    }

    #[test]
    fn test_reject_length_mismatch() {
        // Declared 3, got 2
        assert!(matches!(
            decode_packet(&[0x03, 0x05]),
            Err(DecodeError::InvalidFraming(_))
        ));
        // Declared 2, got 3
        assert!(matches!(
            decode_packet(&[0x02, 0x17, 0x00]),
            Err(DecodeError::InvalidFraming(_))
        ));
    }

    #[test]
    fn test_reject_unknown_type() {
        assert!(matches!(
            decode_packet(&[0x02, 0x11]),
            Err(DecodeError::InvalidFraming(_))
        ));
        assert_eq!(type_name(0x11), "UNKNOWN");
        assert_eq!(type_name(0x0C), "PUBLISH");
    }

    #[test]
    fn test_reject_truncated_fields() {
        // REGACK with a missing return code, length byte consistent
        assert!(matches!(
            decode_packet(&[0x06, 0x0B, 0x00, 0x01, 0x00, 0x01]),
            Err(DecodeError::IncompletePacket { .. })
        ));
        // CONNACK with trailing garbage
        assert!(matches!(
            decode_packet(&[0x04, 0x05, 0x00, 0x00]),
            Err(DecodeError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_return_code_strings() {
        assert_eq!(ReturnCode::from(0).to_string(), "Accepted");
        assert_eq!(ReturnCode::from(1).to_string(), "Rejected: congestion");
        assert_eq!(ReturnCode::from(2).to_string(), "Rejected: invalid topic ID");
        assert_eq!(ReturnCode::from(3).to_string(), "Rejected: not supported");
        assert_eq!(ReturnCode::from(9).to_string(), "Rejected: unknown reason");
        assert_eq!(u8::from(ReturnCode::from(9)), 9);
    }
}
