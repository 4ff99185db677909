//! Helpers for the hand-rolled argument loops of the tools.

use std::fmt::Display;
use std::str::FromStr;

use crate::settings::{Config, ConfigError, DEFAULT_CONFIG_PATH};

/// Value following the flag at `args[*i]`; advances `i` past both.
pub fn take_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, String> {
    let flag = &args[*i];
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            Ok(value)
        }
        None => Err(format!("{} requires a value", flag)),
    }
}

/// Parse a numeric flag value.
pub fn parse_number<T>(flag: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| format!("invalid value '{}' for {}: {}", value, flag, e))
}

/// Number of `d`s in a debug flag such as `-d` or `-dd`.
pub fn debug_count(arg: &str) -> Option<u8> {
    let ds = arg.strip_prefix('-')?;
    if ds.is_empty() || !ds.chars().all(|c| c == 'd') {
        return None;
    }
    Some(ds.len().min(u8::MAX as usize) as u8)
}

/// Print a usage error and exit with status 1.
pub fn exit_usage(message: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("Use --help for usage information");
    std::process::exit(1);
}

/// Exit on argument errors.
pub trait OrExit<T> {
    fn or_exit(self) -> T;
}

impl<T> OrExit<T> for Result<T, String> {
    fn or_exit(self) -> T {
        match self {
            Ok(value) => value,
            Err(message) => exit_usage(&message),
        }
    }
}

/// Flags shared by the tools that talk to a gateway. Anything given here
/// overrides the loaded settings.
#[derive(Debug, Clone, Default)]
pub struct GatewayArgs {
    pub config_path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source_port: Option<u16>,
    pub client_id: Option<String>,
    pub keep_alive: Option<u16>,
    pub forwarder: bool,
    pub wireless_node_id: Option<String>,
    pub debug: u8,
}

impl GatewayArgs {
    /// Usage lines for the shared flags.
    pub const USAGE: &'static str = "  -C <file>        Settings file (default: mqtt-sn.toml)
  -d               Increase debug level by one. -d can occur multiple times.
  -h <host>        MQTT-SN host to connect to. Defaults to '127.0.0.1'.
  -i <clientid>    ID to use for this client. Defaults to 'mqtt-sn-tools-' with process id.
  -k <keepalive>   Keep alive in seconds for this client. Defaults to 10.
  -p <port>        Network port to connect to. Defaults to 1883.
  --cport <port>   Source port for outgoing packets.
  --fe             Enable Forwarder Encapsulation. Mainly for testing gateways.
  --wlnid <id>     Wireless node id used for Forwarder Encapsulation. Defaults to the process id.";

    /// Consume a shared flag at `args[*i]`. Returns `Ok(false)` when the
    /// flag is not one of them, leaving `i` untouched.
    pub fn parse_flag(&mut self, args: &[String], i: &mut usize) -> Result<bool, String> {
        let arg = args[*i].as_str();
        if let Some(count) = debug_count(arg) {
            self.debug = self.debug.saturating_add(count);
            *i += 1;
            return Ok(true);
        }
        match arg {
            "-C" => self.config_path = Some(take_value(args, i)?.to_string()),
            "-h" => self.host = Some(take_value(args, i)?.to_string()),
            "-p" => self.port = Some(parse_number(arg, take_value(args, i)?)?),
            "--cport" => self.source_port = Some(parse_number(arg, take_value(args, i)?)?),
            "-i" => self.client_id = Some(take_value(args, i)?.to_string()),
            "-k" => self.keep_alive = Some(parse_number(arg, take_value(args, i)?)?),
            "--fe" => {
                self.forwarder = true;
                *i += 1;
            }
            "--wlnid" => {
                self.forwarder = true;
                self.wireless_node_id = Some(take_value(args, i)?.to_string());
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Load settings and apply the flags on top.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let path = self.config_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
        if self.config_path.is_some() && !std::path::Path::new(path).exists() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: file not found", path),
            )));
        }
        let mut config = Config::load(path)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.gateway.host = host.clone();
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if self.source_port.is_some() {
            config.gateway.source_port = self.source_port;
        }
        if let Some(client_id) = &self.client_id {
            config.session.client_id = client_id.clone();
        }
        if let Some(keep_alive) = self.keep_alive {
            config.session.keep_alive = keep_alive;
        }
        if self.forwarder {
            config.forwarder.enabled = true;
        }
        if self.wireless_node_id.is_some() {
            config.forwarder.wireless_node_id = self.wireless_node_id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_take_value() {
        let argv = args(&["mqtt-sn-pub", "-t", "sensors/temp", "-m"]);
        let mut i = 1;
        assert_eq!(take_value(&argv, &mut i).unwrap(), "sensors/temp");
        assert_eq!(i, 3);
        assert_eq!(take_value(&argv, &mut i).unwrap_err(), "-m requires a value");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<u16>("-p", "1884").unwrap(), 1884);
        assert_eq!(parse_number::<i8>("-q", "-1").unwrap(), -1);
        assert!(parse_number::<u16>("-p", "70000").is_err());
        assert!(parse_number::<u16>("-k", "abc").is_err());
    }

    #[test]
    fn test_gateway_args() {
        let argv = args(&[
            "mqtt-sn-sub", "-dd", "-h", "gw", "-p", "1884", "-i", "c1", "-k", "0", "--wlnid",
            "n1", "-t", "test",
        ]);
        let mut parsed = GatewayArgs::default();
        let mut i = 1;
        while parsed.parse_flag(&argv, &mut i).unwrap() {}
        assert_eq!(argv[i], "-t");
        assert_eq!(parsed.debug, 2);

        let mut config = Config::default();
        parsed.apply(&mut config);
        assert_eq!(config.gateway.host, "gw");
        assert_eq!(config.gateway.port, 1884);
        assert_eq!(config.session.client_id, "c1");
        assert_eq!(config.session.keep_alive, 0);
        assert!(config.forwarder.enabled);
        assert_eq!(config.forwarder.wireless_node_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_gateway_args_bad_port() {
        let argv = args(&["mqtt-sn-pub", "-p", "port"]);
        let mut i = 1;
        assert!(GatewayArgs::default().parse_flag(&argv, &mut i).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let parsed = GatewayArgs {
            config_path: Some("/nonexistent/settings.toml".to_string()),
            ..Default::default()
        };
        assert!(parsed.load_config().is_err());
    }

    #[test]
    fn test_debug_count() {
        assert_eq!(debug_count("-d"), Some(1));
        assert_eq!(debug_count("-dd"), Some(2));
        assert_eq!(debug_count("-ddd"), Some(3));
        assert_eq!(debug_count("-"), None);
        assert_eq!(debug_count("-dx"), None);
        assert_eq!(debug_count("d"), None);
    }
}
