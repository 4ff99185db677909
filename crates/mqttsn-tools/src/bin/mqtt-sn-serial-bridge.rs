//! mqtt-sn-serial-bridge - relay MQTT-SN packets between a serial device and
//! a UDP gateway.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use mqttsn_client::{
    default_wireless_node_id, ClientError, ForwarderFraming, Framing, PlainFraming, Result,
    SerialLink, UdpTransport,
};
use mqttsn_tools::args::{exit_usage, parse_number, take_value, GatewayArgs, OrExit};
use mqttsn_tools::serial_port::{self, DEFAULT_BAUD};
use mqttsn_tools::settings::Config;
use mqttsn_tools::{logging, signals};

struct Args {
    gateway: GatewayArgs,
    baud: u32,
    device: String,
}

fn usage() -> ! {
    eprintln!("Usage: mqtt-sn-serial-bridge [opts] <device>");
    eprintln!();
    eprintln!("  -b <baud>        Set the baud rate. Defaults to {}.", DEFAULT_BAUD);
    eprintln!("  -f               Enable Forwarder Encapsulation on the UDP side.");
    eprintln!("  -w <id>          Wireless node id for Forwarder Encapsulation. Defaults to the process id.");
    eprintln!("{}", GatewayArgs::USAGE);
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut gateway = GatewayArgs::default();
    let mut baud = DEFAULT_BAUD;
    let mut device = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-b" => {
                let value = take_value(&args, &mut i).or_exit();
                baud = parse_number("-b", value).or_exit();
                continue;
            }
            "-f" => {
                gateway.forwarder = true;
                i += 1;
                continue;
            }
            "-w" => {
                gateway.forwarder = true;
                gateway.wireless_node_id = Some(take_value(&args, &mut i).or_exit().to_string());
                continue;
            }
            "-?" | "--help" => usage(),
            _ => {}
        }
        if gateway.parse_flag(&args, &mut i).or_exit() {
            continue;
        }

        let arg = args[i].as_str();
        if arg.starts_with('-') || device.is_some() {
            eprintln!("Unknown argument: {}", arg);
            usage();
        }
        device = Some(arg.to_string());
        i += 1;
    }

    let Some(device) = device else {
        exit_usage("a serial device is required");
    };
    if serial_port::baud_rate(baud).is_none() {
        exit_usage(&format!("unsupported baud rate: {}", baud));
    }
    Args {
        gateway,
        baud,
        device,
    }
}

fn framing(config: &Config) -> Result<Box<dyn Framing>> {
    if !config.forwarder.enabled {
        return Ok(Box::new(PlainFraming));
    }
    let node_id = config
        .forwarder
        .wireless_node_id
        .as_ref()
        .map(|id| id.clone().into_bytes())
        .unwrap_or_else(default_wireless_node_id);
    Ok(Box::new(ForwarderFraming::new(node_id)?))
}

/// Which of the two descriptors are readable.
struct Ready {
    serial: bool,
    udp: bool,
}

/// Wait until the serial device or the socket is readable. `None` on
/// timeout or when a signal interrupted the wait.
fn wait_readable(serial: RawFd, udp: RawFd, timeout: Duration) -> io::Result<Option<Ready>> {
    let mut fds = [
        libc::pollfd {
            fd: serial,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: udp,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: fds is a valid array of two pollfd for the duration of the call.
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(err);
    }
    if ret == 0 {
        return Ok(None);
    }

    let readable =
        |fd: &libc::pollfd| fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
    Ok(Some(Ready {
        serial: readable(&fds[0]),
        udp: readable(&fds[1]),
    }))
}

fn serial_to_udp(
    serial: &mut SerialLink<File>,
    transport: &mut UdpTransport,
    framing: &dyn Framing,
) -> Result<()> {
    let packet = serial.read_packet()?;
    debug!("Relaying {} bytes from serial to UDP", packet.len());
    let datagram = framing.encapsulate(&packet)?;
    transport.send(&datagram)
}

fn udp_to_serial(
    serial: &mut SerialLink<File>,
    transport: &mut UdpTransport,
    framing: &dyn Framing,
) -> Result<()> {
    let Some(datagram) = transport.receive(Duration::ZERO)? else {
        return Ok(());
    };
    trace!("UDP read {:02X?}", &datagram[..]);

    let frame = match framing.decapsulate(datagram) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping packet from gateway: {}", e);
            return Ok(());
        }
    };
    debug!("Relaying {} bytes from UDP to serial", frame.packet.len());
    serial.write_packet(&frame.packet)
}

fn run(args: Args, config: Config) -> Result<()> {
    let file = serial_port::open(&args.device, args.baud)?;
    let mut serial = SerialLink::new(file);

    let mut transport = UdpTransport::connect(
        &config.gateway.host,
        config.gateway.port,
        config.gateway.source_port,
    )?;
    let framing = framing(&config)?;
    info!(
        "Bridging {} to {}:{}",
        args.device, config.gateway.host, config.gateway.port
    );

    let serial_fd = serial.get_ref().as_raw_fd();
    let udp_fd = transport.as_raw_fd();
    let timeout = Duration::from_secs(config.session.timeout);

    while signals::keep_running() {
        let Some(ready) = wait_readable(serial_fd, udp_fd, timeout)? else {
            continue;
        };
        if ready.serial {
            serial_to_udp(&mut serial, &mut transport, framing.as_ref())?;
        }
        if ready.udp {
            udp_to_serial(&mut serial, &mut transport, framing.as_ref())?;
        }
    }

    if let Some(signal) = signals::received() {
        debug!("{}", signal);
    }
    Ok(())
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
        if let ClientError::Io(io_err) = &e {
            if io_err.kind() == io::ErrorKind::UnexpectedEof {
                error!("Serial device closed");
                std::process::exit(1);
            }
        }
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
