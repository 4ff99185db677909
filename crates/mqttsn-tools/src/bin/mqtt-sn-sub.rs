//! mqtt-sn-sub - subscribe to topics on an MQTT-SN gateway and print what
//! arrives.

use std::io;
use std::time::Duration;

use log::{debug, error};
use mqttsn_client::{QoS, Result, Session};
use mqttsn_tools::args::{exit_usage, parse_number, take_value, GatewayArgs, OrExit};
use mqttsn_tools::output::{local_timestamp, write_message};
use mqttsn_tools::settings::Config;
use mqttsn_tools::{logging, signals};

struct Args {
    gateway: GatewayArgs,
    topic_names: Vec<String>,
    topic_ids: Vec<u16>,
    single_message: bool,
    clean_session: bool,
    verbose: bool,
    timestamps: bool,
}

fn usage() -> ! {
    eprintln!("Usage: mqtt-sn-sub [opts] -t <topic>");
    eprintln!();
    eprintln!("  -1               Exit after receiving a single message.");
    eprintln!("  -c               Disable 'clean session' (store subscription and pending messages when client disconnects).");
    eprintln!("{}", GatewayArgs::USAGE);
    eprintln!("  -t <topic>       MQTT-SN topic name to subscribe to. May be repeated.");
    eprintln!("  -T <topicid>     Pre-defined MQTT-SN topic ID to subscribe to. May be repeated.");
    eprintln!("  -v               Print messages verbosely, showing the topic name.");
    eprintln!("  -V               Print messages verbosely, showing current time and the topic name.");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        gateway: GatewayArgs::default(),
        topic_names: Vec::new(),
        topic_ids: Vec::new(),
        single_message: false,
        clean_session: true,
        verbose: false,
        timestamps: false,
    };

    let mut i = 1;
    while i < args.len() {
        if parsed.gateway.parse_flag(&args, &mut i).or_exit() {
            continue;
        }
        match args[i].as_str() {
            "-t" => {
                let topic = take_value(&args, &mut i).or_exit();
                parsed.topic_names.push(topic.to_string());
            }
            "-T" => {
                let value = take_value(&args, &mut i).or_exit();
                parsed.topic_ids.push(parse_number("-T", value).or_exit());
            }
            "-1" => {
                parsed.single_message = true;
                i += 1;
            }
            "-c" => {
                parsed.clean_session = false;
                i += 1;
            }
            "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "-V" => {
                parsed.verbose = true;
                parsed.timestamps = true;
                i += 1;
            }
            "-?" | "--help" => usage(),
            arg => {
                eprintln!("Unknown argument: {}", arg);
                usage();
            }
        }
    }

    if parsed.topic_names.is_empty() && parsed.topic_ids.is_empty() {
        exit_usage("at least one topic name (-t) or pre-defined topic id (-T) is required");
    }
    parsed
}

/// Wait between keep-alive checks: half the keep-alive interval, or 10
/// seconds when keep-alive is disabled.
fn loop_timeout(keep_alive: u16) -> Duration {
    match keep_alive {
        0 => Duration::from_secs(10),
        k => Duration::from_millis(u64::from(k) * 500),
    }
}

fn run(args: Args, config: Config) -> Result<()> {
    let mut session = Session::open(&config.client_config())?;
    session.connect(
        &config.session.client_id,
        config.session.keep_alive,
        config.session.clean_session,
    )?;

    for topic_name in &args.topic_names {
        session.subscribe_topic_name(topic_name, QoS::AtMostOnce)?;
    }
    for topic_id in &args.topic_ids {
        session.subscribe_topic_id(*topic_id, QoS::AtMostOnce)?;
    }

    let timeout = loop_timeout(config.session.keep_alive);
    let stdout = io::stdout();
    while signals::keep_running() {
        let Some(publish) = session.next_publish(timeout)? else {
            continue;
        };

        let timestamp = args.timestamps.then(local_timestamp);
        let topic = args.verbose.then(|| session.topic_label(&publish));
        write_message(
            &mut stdout.lock(),
            timestamp.as_deref(),
            topic.as_deref(),
            &publish.payload,
        )?;

        if args.single_message {
            break;
        }
    }

    if let Some(signal) = signals::received() {
        debug!("{}", signal);
    }
    session.disconnect_and_wait(None)
}

fn main() {
    let args = parse_args();

    let mut config = match args.gateway.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if !args.clean_session {
        config.session.clean_session = false;
    }

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
