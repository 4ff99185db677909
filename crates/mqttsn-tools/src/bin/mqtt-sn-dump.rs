//! mqtt-sn-dump - listen on a UDP port and print the MQTT-SN packets that
//! arrive.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, error, warn};
use mqttsn_client::{Result, TopicRegistry, UdpTransport};
use mqttsn_core::{decode_packet, type_name, Packet};
use mqttsn_tools::args::{debug_count, parse_number, take_value, OrExit};
use mqttsn_tools::output::{describe_packet, describe_raw, write_message};
use mqttsn_tools::settings::{Config, DEFAULT_CONFIG_PATH};
use mqttsn_tools::{logging, signals};

struct Args {
    config_path: Option<String>,
    port: Option<u16>,
    dump_all: bool,
    verbose: bool,
    debug: u8,
}

fn usage() -> ! {
    eprintln!("Usage: mqtt-sn-dump [opts] -p <port>");
    eprintln!();
    eprintln!("  -a               Dump all packet types.");
    eprintln!("  -C <file>        Settings file (default: mqtt-sn.toml)");
    eprintln!("  -d               Increase debug level by one. -d can occur multiple times.");
    eprintln!("  -p <port>        Network port to listen on. Defaults to 1883.");
    eprintln!("  -v               Print messages verbosely, showing the topic name.");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        port: None,
        dump_all: false,
        verbose: false,
        debug: 0,
    };

    let mut i = 1;
    while i < args.len() {
        if let Some(count) = debug_count(&args[i]) {
            parsed.debug = parsed.debug.saturating_add(count);
            i += 1;
            continue;
        }
        match args[i].as_str() {
            "-a" => {
                parsed.dump_all = true;
                i += 1;
            }
            "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "-p" => {
                let value = take_value(&args, &mut i).or_exit();
                parsed.port = Some(parse_number("-p", value).or_exit());
            }
            "-C" => parsed.config_path = Some(take_value(&args, &mut i).or_exit().to_string()),
            "-?" | "--help" => usage(),
            arg => {
                eprintln!("Unknown argument: {}", arg);
                usage();
            }
        }
    }
    parsed
}

/// Print one packet. Encapsulated packets are unwrapped first.
fn dump(args: &Args, topics: &mut TopicRegistry, datagram: &[u8]) -> io::Result<()> {
    let mut packet = match decode_packet(datagram) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping received packet: {}", e);
            if args.dump_all {
                println!("{}", describe_raw(datagram));
            }
            return Ok(());
        }
    };
    let mut len = datagram.len();

    if let Packet::Frwdencap(encap) = &packet {
        debug!(
            "Forwarder Encapsulation from wireless node {:02X?}",
            &encap.wireless_node_id[..]
        );
        let inner = encap.packet.clone();
        len = inner.len();
        packet = match decode_packet(&inner) {
            Ok(inner) => inner,
            Err(e) => {
                warn!("Dropping encapsulated packet: {}", e);
                if args.dump_all {
                    println!("{}", describe_raw(&inner));
                }
                return Ok(());
            }
        };
    }

    if let Packet::Register(register) = &packet {
        topics.register(register.topic_id, &register.topic_name);
    }

    if args.dump_all {
        println!("{}", describe_packet(&packet, len));
    } else if let Packet::Publish(publish) = &packet {
        let topic = args
            .verbose
            .then(|| topics.label(publish.flags.topic_type, publish.topic_id));
        write_message(&mut io::stdout().lock(), None, topic.as_deref(), &publish.payload)?;
    }
    Ok(())
}

fn run(args: Args, config: Config) -> Result<()> {
    let port = args.port.unwrap_or(config.gateway.port);
    let mut transport = UdpTransport::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    debug!("mqtt-sn-dump listening on port {}", port);

    let timeout = Duration::from_secs(config.session.timeout);
    let mut topics = TopicRegistry::new();
    while signals::keep_running() {
        debug!("waiting for packet...");
        let Some((datagram, from)) = transport.receive_from(timeout)? else {
            continue;
        };

        let tag = datagram.get(1).map_or("UNKNOWN", |t| type_name(*t));
        debug!("Received {} bytes from {}. Type={}.", datagram.len(), from, tag);

        dump(&args, &mut topics, &datagram)?;
    }

    if let Some(signal) = signals::received() {
        debug!("{}", signal);
    }
    Ok(())
}

fn main() {
    let args = parse_args();

    let path = args.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.log.level, args.debug);

    if let Err(e) = signals::install() {
        error!("Failed to install signal handlers: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args, config) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
