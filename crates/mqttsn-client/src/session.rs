//! Client session engine.
//!
//! A [`Session`] owns one UDP transport, the framing chosen for it, the topic
//! registry and all per-connection protocol state. Every exchange is a
//! blocking request/response round trip on the calling thread.

use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, warn};
use mqttsn_core::{
    decode_packet, encode_packet, type_name, Connect, EncodeError, Flags, Packet, PacketType,
    Publish, Puback, QoS, Regack, Register, ReturnCode, Subscribe, TopicType, MAX_PAYLOAD_LENGTH,
    MAX_TOPIC_LENGTH, PROTOCOL_ID,
};

use crate::config::{client_id_or_default, default_wireless_node_id, ClientConfig};
use crate::error::{ClientError, Result};
use crate::framing::{ForwarderFraming, Framing, PlainFraming};
use crate::packet_id::MessageIdAllocator;
use crate::registry::TopicRegistry;
use crate::transport::UdpTransport;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    AwaitingConnack,
    Connected,
}

/// One logical MQTT-SN connection to a gateway.
pub struct Session {
    transport: UdpTransport,
    framing: Box<dyn Framing>,
    topics: TopicRegistry,
    message_ids: MessageIdAllocator,
    state: SessionState,
    keep_alive: u16,
    timeout: Duration,
    last_transmit: Instant,
    last_receive: Instant,
}

impl Session {
    /// Open the transport described by `config` and choose its framing.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let transport = UdpTransport::connect(&config.host, config.port, config.source_port)?;
        let framing: Box<dyn Framing> = match &config.forwarder {
            None => Box::new(PlainFraming),
            Some(node_id) => {
                let node_id = node_id.clone().unwrap_or_else(default_wireless_node_id);
                Box::new(ForwarderFraming::new(node_id)?)
            }
        };
        Ok(Self::new(transport, framing, config.timeout))
    }

    pub fn new(transport: UdpTransport, framing: Box<dyn Framing>, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            transport,
            framing,
            topics: TopicRegistry::new(),
            message_ids: MessageIdAllocator::new(),
            state: SessionState::Disconnected,
            keep_alive: 0,
            timeout,
            last_transmit: now,
            last_receive: now,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn transport(&self) -> &UdpTransport {
        &self.transport
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Add a topic id/name pair to the registry.
    pub fn register_topic(&mut self, topic_id: u16, topic_name: &str) {
        self.topics.register(topic_id, topic_name);
    }

    pub fn lookup_topic(&self, topic_id: u16) -> Option<&str> {
        self.topics.lookup(topic_id)
    }

    /// Send CONNECT and wait for CONNACK.
    ///
    /// An empty `client_id` is replaced by `mqtt-sn-tools-<pid>`.
    pub fn connect(&mut self, client_id: &str, keep_alive: u16, clean_session: bool) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(ClientError::InvalidState(
                "Already connected or connecting".to_string(),
            ));
        }

        let client_id = client_id_or_default(client_id);
        let connect = Packet::Connect(Connect {
            flags: Flags {
                clean_session,
                ..Default::default()
            },
            protocol_id: PROTOCOL_ID,
            duration: keep_alive,
            client_id,
        });

        self.send_packet(&connect)?;
        self.state = SessionState::AwaitingConnack;
        self.keep_alive = keep_alive;
        self.last_receive = Instant::now();

        let return_code = match self.wait_for(PacketType::Connack, self.timeout)? {
            Some(Packet::Connack { return_code }) => return_code,
            _ => {
                self.state = SessionState::Disconnected;
                return Err(ClientError::Timeout(PacketType::Connack));
            }
        };

        debug!("CONNACK return code: 0x{:02x}", u8::from(return_code));
        if !return_code.is_accepted() {
            self.state = SessionState::Disconnected;
            return Err(ClientError::Rejected {
                request: PacketType::Connect,
                code: return_code,
            });
        }

        self.state = SessionState::Connected;
        Ok(())
    }

    /// Register a topic name with the gateway and return the assigned id.
    ///
    /// The registry is not updated here; only subscriptions and
    /// gateway-initiated registrations populate it.
    pub fn register(&mut self, topic_name: &str) -> Result<u16> {
        self.require_connected()?;
        check_len("topic name", topic_name.len(), MAX_TOPIC_LENGTH)?;

        let message_id = self.message_ids.allocate();
        self.send_packet(&Packet::Register(Register {
            topic_id: 0,
            message_id,
            topic_name: topic_name.to_string(),
        }))?;

        let regack = match self.wait_for(PacketType::Regack, self.timeout)? {
            Some(Packet::Regack(regack)) => regack,
            _ => return Err(ClientError::Timeout(PacketType::Regack)),
        };

        if regack.message_id != message_id {
            warn!(
                "Message id in REGACK does not equal message id sent: 0x{:04x} != 0x{:04x}",
                regack.message_id, message_id
            );
        }
        debug!("REGACK return code: 0x{:02x}", u8::from(regack.return_code));
        if !regack.return_code.is_accepted() {
            return Err(ClientError::Rejected {
                request: PacketType::Register,
                code: regack.return_code,
            });
        }

        debug!("REGACK topic id: 0x{:04x}", regack.topic_id);
        Ok(regack.topic_id)
    }

    /// Publish a message.
    ///
    /// QoS -1 needs no connection and uses message id 0. QoS 1 waits for a
    /// PUBACK; a missing PUBACK is only a warning.
    pub fn publish(
        &mut self,
        topic_id: u16,
        topic_type: TopicType,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        let message_id = match qos {
            QoS::NoConnection => 0,
            QoS::AtMostOnce | QoS::AtLeastOnce => {
                self.require_connected()?;
                check_len("payload", payload.len(), MAX_PAYLOAD_LENGTH)?;
                self.message_ids.allocate()
            }
            QoS::ExactlyOnce => {
                return Err(ClientError::InvalidState(
                    "QoS level 2 is not supported".to_string(),
                ))
            }
        };

        self.send_packet(&Packet::Publish(Publish {
            flags: Flags {
                qos,
                retain,
                topic_type,
                ..Default::default()
            },
            topic_id,
            message_id,
            payload: Bytes::copy_from_slice(payload),
        }))?;

        if qos != QoS::AtLeastOnce {
            return Ok(());
        }

        match self.wait_for(PacketType::Puback, self.timeout)? {
            Some(Packet::Puback(puback)) => {
                if puback.message_id != message_id {
                    warn!(
                        "Message id in PUBACK does not equal message id sent: 0x{:04x} != 0x{:04x}",
                        puback.message_id, message_id
                    );
                }
                debug!("PUBACK return code: 0x{:02x}", u8::from(puback.return_code));
                if !puback.return_code.is_accepted() {
                    return Err(ClientError::Rejected {
                        request: PacketType::Publish,
                        code: puback.return_code,
                    });
                }
            }
            _ => warn!("Failed to receive PUBACK after PUBLISH"),
        }
        Ok(())
    }

    /// Subscribe by topic name; returns the topic id from SUBACK.
    ///
    /// Names longer than two characters are added to the registry so that
    /// incoming PUBLISH packets can be labelled.
    pub fn subscribe_topic_name(&mut self, topic_name: &str, qos: QoS) -> Result<u16> {
        self.require_connected()?;
        check_len("topic name", topic_name.len(), MAX_TOPIC_LENGTH)?;
        let message_id = self.message_ids.allocate();
        let topic_id = self.subscribe(Subscribe::by_name(topic_name, message_id, qos))?;
        if topic_name.len() > 2 {
            self.topics.register(topic_id, topic_name);
        }
        Ok(topic_id)
    }

    /// Subscribe to a predefined topic id; returns the topic id from SUBACK.
    pub fn subscribe_topic_id(&mut self, topic_id: u16, qos: QoS) -> Result<u16> {
        self.require_connected()?;
        let message_id = self.message_ids.allocate();
        self.subscribe(Subscribe::by_id(topic_id, message_id, qos))
    }

    fn subscribe(&mut self, subscribe: Subscribe) -> Result<u16> {
        let message_id = subscribe.message_id;
        self.send_packet(&Packet::Subscribe(subscribe))?;

        let suback = match self.wait_for(PacketType::Suback, self.timeout)? {
            Some(Packet::Suback(suback)) => suback,
            _ => return Err(ClientError::Timeout(PacketType::Suback)),
        };

        if suback.message_id != message_id {
            warn!(
                "Message id in SUBACK does not equal message id sent: 0x{:04x} != 0x{:04x}",
                suback.message_id, message_id
            );
        }
        debug!("SUBACK return code: 0x{:02x}", u8::from(suback.return_code));
        if !suback.return_code.is_accepted() {
            return Err(ClientError::Rejected {
                request: PacketType::Subscribe,
                code: suback.return_code,
            });
        }

        debug!("SUBACK topic id: 0x{:04x}", suback.topic_id);
        Ok(suback.topic_id)
    }

    /// Wait for the next PUBLISH, acknowledging it when it asks for QoS 1.
    pub fn next_publish(&mut self, timeout: Duration) -> Result<Option<Publish>> {
        let publish = match self.wait_for(PacketType::Publish, timeout)? {
            Some(Packet::Publish(publish)) => publish,
            _ => return Ok(None),
        };

        if publish.flags.qos == QoS::AtLeastOnce {
            self.send_packet(&Packet::Puback(Puback {
                topic_id: publish.topic_id,
                message_id: publish.message_id,
                return_code: ReturnCode::Accepted,
            }))?;
        }
        Ok(Some(publish))
    }

    /// Send DISCONNECT. A non-zero `duration` asks the gateway to treat the
    /// client as asleep for that many seconds.
    pub fn disconnect(&mut self, duration: Option<u16>) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        let duration = duration.filter(|d| *d != 0);
        self.send_packet(&Packet::Disconnect { duration })?;
        self.state = SessionState::Disconnected;
        Ok(())
    }

    /// Send DISCONNECT and wait for the gateway to echo it.
    pub fn disconnect_and_wait(&mut self, duration: Option<u16>) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.disconnect(duration)?;
        if self.wait_for(PacketType::Disconnect, self.timeout)?.is_none() {
            warn!("Failed to receive DISCONNECT from gateway");
        }
        Ok(())
    }

    /// Wait until a packet of type `expected` arrives.
    ///
    /// Housekeeping is handled along the way: gateway REGISTERs are added to
    /// the registry and acknowledged, PINGRESPs are discarded, a PINGREQ is
    /// sent whenever the keep-alive interval passes without a transmission.
    /// An unexpected DISCONNECT and a keep-alive timeout (1.5 intervals
    /// without receiving anything) are errors. Malformed datagrams are
    /// dropped.
    ///
    /// Returns `None` when `timeout` elapses or a signal interrupts the wait.
    pub fn wait_for(&mut self, expected: PacketType, timeout: Duration) -> Result<Option<Packet>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let mut wake = deadline;

            if self.keep_alive > 0 && self.state == SessionState::Connected {
                let interval = Duration::from_secs(u64::from(self.keep_alive));
                let receive_deadline = self.last_receive + interval * 3 / 2;
                if now >= receive_deadline {
                    return Err(ClientError::KeepAliveTimeout);
                }
                if now >= self.last_transmit + interval {
                    self.send_packet(&Packet::Pingreq)?;
                }
                wake = wake
                    .min(self.last_transmit + interval)
                    .min(receive_deadline);
            }

            if now >= deadline {
                return Ok(None);
            }

            debug!("waiting for packet...");
            let datagram = match self.transport.receive(wake.saturating_duration_since(now))? {
                Some(datagram) => datagram,
                // Woken early: a signal arrived.
                None if Instant::now() < wake => return Ok(None),
                None => continue,
            };

            let Some(packet) = self.decode(datagram) else {
                continue;
            };
            self.last_receive = Instant::now();

            match packet {
                Packet::Register(register) if expected != PacketType::Register => {
                    self.handle_register(register)?;
                }
                Packet::Pingresp if expected != PacketType::Pingresp => {}
                Packet::Disconnect { .. } if expected != PacketType::Disconnect => {
                    warn!("Received DISCONNECT from gateway");
                    self.state = SessionState::Disconnected;
                    return Err(ClientError::GatewayDisconnected);
                }
                packet if packet.packet_type() == expected => return Ok(Some(packet)),
                packet => warn!("Unexpected packet type: {}", packet.packet_type()),
            }
        }
    }

    /// Label for the topic of an incoming PUBLISH.
    pub fn topic_label(&self, publish: &Publish) -> String {
        self.topics.label(publish.flags.topic_type, publish.topic_id)
    }

    /// Encode, frame and send one packet.
    pub fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let encoded = encode_packet(packet)?;
        let datagram = self.framing.encapsulate(&encoded)?;
        debug!("Sending {} packet...", packet.packet_type());
        self.transport.send(&datagram)?;
        self.last_transmit = Instant::now();
        Ok(())
    }

    fn decode(&self, datagram: Bytes) -> Option<Packet> {
        let len = datagram.len();
        let frame = match self.framing.decapsulate(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping received datagram: {}", e);
                return None;
            }
        };
        if frame.packet.len() >= 2 {
            debug!("Received {} bytes. Type={}.", len, type_name(frame.packet[1]));
        }
        match decode_packet(&frame.packet) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!("Dropping received packet: {}", e);
                None
            }
        }
    }

    fn handle_register(&mut self, register: Register) -> Result<()> {
        self.topics.register(register.topic_id, &register.topic_name);
        self.send_packet(&Packet::Regack(Regack {
            topic_id: register.topic_id,
            message_id: register.message_id,
            return_code: ReturnCode::Accepted,
        }))
    }

    fn require_connected(&self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }
}

/// Size checks that must happen before a message id is spent.
fn check_len(field: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(EncodeError::TooLong { field, len, max }.into());
    }
    Ok(())
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("framing", &self.framing)
            .field("keep_alive", &self.keep_alive)
            .field("timeout", &self.timeout)
            .field("topics", &self.topics.len())
            .finish()
    }
}
