//! mqttsn-tools - shared plumbing for the MQTT-SN command-line tools.
//!
//! The binaries (`mqtt-sn-pub`, `mqtt-sn-sub`, `mqtt-sn-dump`,
//! `mqtt-sn-serial-bridge`) use this crate for argument handling, layered
//! settings, logging, signals, serial port setup and output formatting.

pub mod args;
pub mod logging;
pub mod output;
pub mod serial_port;
pub mod settings;
pub mod signals;
