//! Logger setup for the tools.

use std::io::Write;

use crate::output::local_timestamp;

/// Effective level: each `-d` raises the configured base level one step
/// (debug, then trace).
pub fn effective_level(base: &str, debug: u8) -> &str {
    match debug {
        0 => base,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialise `env_logger` on stderr. `RUST_LOG` still takes precedence.
///
/// Lines look like `2024-01-02 03:04:05 DEBUG Sending CONNECT packet...`.
pub fn init(base: &str, debug: u8) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(effective_level(base, debug)),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "{} {} {}",
            local_timestamp(),
            record.level(),
            record.args()
        )
    })
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level("warn", 0), "warn");
        assert_eq!(effective_level("info", 1), "debug");
        assert_eq!(effective_level("warn", 2), "trace");
        assert_eq!(effective_level("warn", 5), "trace");
    }
}
