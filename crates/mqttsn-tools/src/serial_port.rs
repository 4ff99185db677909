//! Serial device setup: raw 8N1 at a chosen baud rate.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

use log::debug;

/// Default baud rate.
pub const DEFAULT_BAUD: u32 = 9600;

/// Map a numeric baud rate to its termios speed constant.
pub fn baud_rate(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        _ => return None,
    })
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Open a serial device for blocking raw I/O.
pub fn open<P: AsRef<Path>>(path: P, baud: u32) -> io::Result<File> {
    let path = path.as_ref();
    let speed = baud_rate(baud).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate: {}", baud),
        )
    })?;

    debug!("Opening {}", path.display());
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NDELAY)
        .open(path)?;
    let fd = file.as_raw_fd();

    // SAFETY: fd is open for the lifetime of `file`; tios is initialised by
    // tcgetattr before use.
    unsafe {
        // Back to blocking reads
        check(libc::fcntl(fd, libc::F_SETFL, 0))?;

        let mut tios: libc::termios = std::mem::zeroed();
        check(libc::tcgetattr(fd, &mut tios))?;
        check(libc::cfsetispeed(&mut tios, speed))?;
        check(libc::cfsetospeed(&mut tios, speed))?;

        // Local mode, 8N1
        tios.c_cflag |= libc::CLOCAL | libc::CREAD;
        tios.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
        tios.c_cflag |= libc::CS8;

        // No flow control, ignore parity errors
        tios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        tios.c_iflag |= libc::IGNPAR;

        // Raw input and output
        tios.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
        tios.c_oflag &= !libc::OPOST;

        // Block until data arrives, 0.1s inter-byte timeout
        tios.c_cc[libc::VMIN] = 255;
        tios.c_cc[libc::VTIME] = 1;

        check(libc::tcsetattr(fd, libc::TCSANOW, &tios))?;
    }

    // Let the device settle, then drop anything buffered while opening.
    std::thread::sleep(Duration::from_secs(1));
    // SAFETY: fd is still open.
    check(unsafe { libc::tcflush(fd, libc::TCIOFLUSH) })?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rates() {
        assert_eq!(baud_rate(9600), Some(libc::B9600));
        assert_eq!(baud_rate(115200), Some(libc::B115200));
        assert_eq!(baud_rate(12345), None);
    }

    #[test]
    fn test_open_rejects_bad_baud() {
        let err = open("/dev/null", 12345).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_open_missing_device() {
        assert!(open("/nonexistent/ttyUSB0", 9600).is_err());
    }
}
