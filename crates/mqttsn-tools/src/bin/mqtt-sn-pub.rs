//! mqtt-sn-pub - publish a message to an MQTT-SN gateway.

use std::io::{self, BufRead, Read};

use log::{debug, error};
use mqttsn_client::{ClientError, QoS, Result, Session, TopicType};
use mqttsn_core::{MAX_PAYLOAD_LENGTH, MAX_TOPIC_LENGTH};
use mqttsn_tools::args::{exit_usage, parse_number, take_value, GatewayArgs, OrExit};
use mqttsn_tools::settings::Config;
use mqttsn_tools::{logging, signals};

enum MessageSource {
    Message(Vec<u8>),
    File(String),
    Stdin,
    Lines,
    Null,
}

struct Args {
    gateway: GatewayArgs,
    topic_name: Option<String>,
    topic_id: Option<u16>,
    source: MessageSource,
    qos: QoS,
    retain: bool,
    sleep_duration: u16,
}

fn usage() -> ! {
    eprintln!("Usage: mqtt-sn-pub [opts] -t <topic> -m <message>");
    eprintln!();
    eprintln!("{}", GatewayArgs::USAGE);
    eprintln!("  -e <seconds>     Sleep duration in seconds when disconnecting. Defaults to 0.");
    eprintln!("  -f <file>        A file to send as the message payload.");
    eprintln!("  -l               Read messages from stdin, sending a separate message for each line.");
    eprintln!("  -m <message>     Message payload to send.");
    eprintln!("  -n               Send a null (zero length) message.");
    eprintln!("  -q <qos>         Quality of Service value (0, 1 or -1). Defaults to 0.");
    eprintln!("  -r               Message should be retained.");
    eprintln!("  -s               Read one whole message from stdin.");
    eprintln!("  -t <topic>       MQTT-SN topic name to publish to.");
    eprintln!("  -T <topicid>     Pre-defined MQTT-SN topic ID to publish to.");
    std::process::exit(1);
}

fn set_source(source: &mut Option<MessageSource>, new: MessageSource) {
    if source.replace(new).is_some() {
        exit_usage("please provide a single message source (-f, -l, -m, -n or -s)");
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut gateway = GatewayArgs::default();
    let mut topic_name = None;
    let mut topic_id = None;
    let mut source = None;
    let mut qos = QoS::AtMostOnce;
    let mut retain = false;
    let mut sleep_duration = 0;

    let mut i = 1;
    while i < args.len() {
        if gateway.parse_flag(&args, &mut i).or_exit() {
            continue;
        }
        match args[i].as_str() {
            "-t" => topic_name = Some(take_value(&args, &mut i).or_exit().to_string()),
            "-T" => {
                let value = take_value(&args, &mut i).or_exit();
                topic_id = Some(parse_number("-T", value).or_exit());
            }
            "-m" => {
                let message = take_value(&args, &mut i).or_exit();
                set_source(&mut source, MessageSource::Message(message.as_bytes().to_vec()));
            }
            "-f" => {
                let path = take_value(&args, &mut i).or_exit();
                set_source(&mut source, MessageSource::File(path.to_string()));
            }
            "-q" => {
                let value = take_value(&args, &mut i).or_exit();
                let level: i8 = parse_number("-q", value).or_exit();
                qos = match QoS::from_level(level) {
                    Some(qos) if qos != QoS::ExactlyOnce => qos,
                    _ => exit_usage("only QoS levels -1, 0 and 1 are supported"),
                };
            }
            "-e" => {
                let value = take_value(&args, &mut i).or_exit();
                sleep_duration = parse_number("-e", value).or_exit();
            }
            "-s" => {
                set_source(&mut source, MessageSource::Stdin);
                i += 1;
            }
            "-l" => {
                set_source(&mut source, MessageSource::Lines);
                i += 1;
            }
            "-n" => {
                set_source(&mut source, MessageSource::Null);
                i += 1;
            }
            "-r" => {
                retain = true;
                i += 1;
            }
            "-?" | "--help" => usage(),
            arg => {
                eprintln!("Unknown argument: {}", arg);
                usage();
            }
        }
    }

    let Some(source) = source else {
        exit_usage("a message source is required (-f, -l, -m, -n or -s)");
    };
    match (&topic_name, topic_id) {
        (None, None) => exit_usage("a topic name (-t) or pre-defined topic id (-T) is required"),
        (Some(_), Some(_)) => exit_usage("please provide either a topic name or a topic id, not both"),
        (Some(name), None) if name.len() > MAX_TOPIC_LENGTH => exit_usage(&format!(
            "topic name cannot be more than {} bytes",
            MAX_TOPIC_LENGTH
        )),
        (Some(name), None) if qos == QoS::NoConnection && name.len() != 2 => exit_usage(
            "either a pre-defined topic id or a short topic name must be given for QoS -1",
        ),
        _ => {}
    }

    Args {
        gateway,
        topic_name,
        topic_id,
        source,
        qos,
        retain,
        sleep_duration,
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LENGTH {
        return Err(ClientError::Encode(mqttsn_core::EncodeError::TooLong {
            field: "payload",
            len: payload.len(),
            max: MAX_PAYLOAD_LENGTH,
        }));
    }
    Ok(())
}

/// The single payload for every source except line mode.
fn read_payload(source: &MessageSource) -> Result<Option<Vec<u8>>> {
    let payload = match source {
        MessageSource::Message(message) => message.clone(),
        MessageSource::File(path) => std::fs::read(path)?,
        MessageSource::Stdin => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            buf
        }
        MessageSource::Null => Vec::new(),
        MessageSource::Lines => return Ok(None),
    };
    check_payload(&payload)?;
    Ok(Some(payload))
}

fn run(args: Args, config: Config) -> Result<()> {
    // Size limits are checked before any network traffic.
    let payload = read_payload(&args.source)?;

    let mut session = Session::open(&config.client_config())?;
    if args.qos != QoS::NoConnection {
        session.connect(
            &config.session.client_id,
            config.session.keep_alive,
            config.session.clean_session,
        )?;
    }

    let (topic_id, topic_type) = match (args.topic_id, args.topic_name.as_deref()) {
        (Some(id), _) => (id, TopicType::Predefined),
        (None, Some(name)) if name.len() == 2 => {
            let bytes = name.as_bytes();
            (u16::from_be_bytes([bytes[0], bytes[1]]), TopicType::Short)
        }
        (None, Some(name)) => (session.register(name)?, TopicType::Normal),
        (None, None) => return Err(ClientError::InvalidState("no topic given".to_string())),
    };

    match payload {
        Some(payload) => {
            session.publish(topic_id, topic_type, &payload, args.qos, args.retain)?;
        }
        None => {
            for line in io::stdin().lock().split(b'\n') {
                if !signals::keep_running() {
                    break;
                }
                let mut line = line?;
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                check_payload(&line)?;
                session.publish(topic_id, topic_type, &line, args.qos, args.retain)?;
            }
        }
    }

    if let Some(signal) = signals::received() {
        debug!("{}", signal);
    }
    session.disconnect(Some(args.sleep_duration))
}

fn main() {
    let args = parse_args();

    let config = match args.gateway.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.log.level, args.gateway.debug);

    if let Err(e) = signals::install() {
        error!("Failed to install signal handlers: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args, config) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
