//! mqttsn-client - MQTT-SN client engine.
//!
//! This crate provides the client side of MQTT-SN over UDP: the session
//! engine driving CONNECT/REGISTER/SUBSCRIBE/PUBLISH exchanges, the topic
//! registry, plain and Forwarder Encapsulation framing, and a length-prefixed
//! serial link for bridges. Uses mio for socket readiness.
//!
//! # Example
//!
//! ```ignore
//! use mqttsn_client::{ClientConfig, QoS, Session, TopicType};
//!
//! let config = ClientConfig::new("localhost")
//!     .port(1883)
//!     .client_id("my-client");
//!
//! let mut session = Session::open(&config)?;
//! session.connect(&config.client_id, config.keep_alive, config.clean_session)?;
//!
//! let topic_id = session.register("sensors/temp")?;
//! session.publish(topic_id, TopicType::Normal, b"25.5", QoS::AtLeastOnce, false)?;
//! session.disconnect(None)?;
//! ```

mod config;
mod error;
mod framing;
mod packet_id;
mod registry;
mod serial;
mod session;
mod transport;

pub use config::{
    default_wireless_node_id, ClientConfig, DEFAULT_KEEP_ALIVE, DEFAULT_PORT, DEFAULT_TIMEOUT,
};
pub use error::{ClientError, Result};
pub use framing::{ForwarderFraming, Frame, Framing, PlainFraming};
pub use registry::TopicRegistry;
pub use serial::SerialLink;
pub use session::Session;
pub use transport::UdpTransport;

// Re-export useful types from core
pub use mqttsn_core::{Packet, PacketType, Publish, QoS, ReturnCode, TopicType};
