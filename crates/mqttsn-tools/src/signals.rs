//! Cooperative shutdown on SIGINT, SIGTERM and SIGHUP.
//!
//! The handler only flips an atomic flag; main loops check
//! [`keep_running`] between blocking calls. Handlers are installed without
//! `SA_RESTART` so a blocked poll returns early with `EINTR`.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static KEEP_RUNNING: AtomicBool = AtomicBool::new(true);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn termination_handler(signum: libc::c_int) {
    LAST_SIGNAL.store(signum, Ordering::SeqCst);
    KEEP_RUNNING.store(false, Ordering::SeqCst);
}

/// Install the termination handler for SIGINT, SIGTERM and SIGHUP.
pub fn install() -> io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        // SAFETY: the action is fully initialised and the handler only
        // touches atomics.
        let ret = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = termination_handler as extern "C" fn(libc::c_int) as usize;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = 0;
            libc::sigaction(signum, &action, std::ptr::null_mut())
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn keep_running() -> bool {
    KEEP_RUNNING.load(Ordering::SeqCst)
}

/// Description of the signal that stopped the process, if any.
pub fn received() -> Option<&'static str> {
    match LAST_SIGNAL.load(Ordering::SeqCst) {
        libc::SIGHUP => Some("Got hangup signal."),
        libc::SIGTERM => Some("Got termination signal."),
        libc::SIGINT => Some("Got interrupt signal."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_clears_flag() {
        install().unwrap();

        termination_handler(libc::SIGHUP);
        assert!(!keep_running());
        assert_eq!(received(), Some("Got hangup signal."));
    }
}
