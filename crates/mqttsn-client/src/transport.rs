//! UDP transport built on mio.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, warn};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use mqttsn_core::MAX_PACKET_LENGTH;

use crate::error::{ClientError, Result};

const SOCKET: Token = Token(0);

// Room for an encapsulation header in front of a full-size packet.
const RECV_BUFFER_SIZE: usize = MAX_PACKET_LENGTH * 2;

/// A non-blocking UDP socket with blocking, timeout-bounded receive calls.
pub struct UdpTransport {
    poll: Poll,
    events: Events,
    socket: UdpSocket,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    /// Open a UDP socket connected to the gateway.
    ///
    /// Every resolved address is tried in order until one connects. With a
    /// `source_port` the socket is bound to that local port first.
    pub fn connect(host: &str, port: u16, source_port: Option<u16>) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| ClientError::AddressResolution(format!("{}:{}: {}", host, port, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(ClientError::AddressResolution(format!("{}:{}", host, port)));
        }

        let mut last_err = None;
        for addr in addrs {
            match open_connected(addr, source_port) {
                Ok(socket) => {
                    debug!("Connected UDP socket to {}", addr);
                    return Self::from_std(socket);
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(ClientError::ConnectFailed(match last_err {
            Some(e) => e.to_string(),
            None => format!("{}:{}", host, port),
        }))
    }

    /// Bind an unconnected socket that receives from anyone.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = StdUdpSocket::bind(addr)?;
        debug!("Bound UDP socket to {}", socket.local_addr()?);
        Self::from_std(socket)
    }

    fn from_std(socket: StdUdpSocket) -> Result<Self> {
        socket.set_nonblocking(true)?;
        let mut socket = UdpSocket::from_std(socket);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(4),
            socket,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to the connected peer.
    pub fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let sent = self.socket.send(datagram)?;
        if sent != datagram.len() {
            warn!("Only sent {} of {} bytes", sent, datagram.len());
        }
        Ok(())
    }

    /// Wait up to `timeout` for one datagram. `None` on timeout or when the
    /// wait was interrupted by a signal.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        Ok(self.receive_from(timeout)?.map(|(datagram, _)| datagram))
    }

    /// Like [`receive`](Self::receive), also returning the sender address.
    pub fn receive_from(&mut self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Edge-triggered: always drain before waiting.
            match self.socket.recv_from(&mut self.recv_buf) {
                Ok((n, from)) => {
                    return Ok(Some((Bytes::copy_from_slice(&self.recv_buf[..n]), from)))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ClientError::Io(e)),
            }

            if !self.wait_readable(deadline)? {
                return Ok(None);
            }
        }
    }

    /// Wait up to `timeout` for a datagram without consuming it.
    pub fn select(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut probe = [0u8; 1];
        loop {
            match self.socket.peek_from(&mut probe) {
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ClientError::Io(e)),
            }

            if !self.wait_readable(deadline)? {
                return Ok(false);
            }
        }
    }

    /// Returns false once the deadline has passed or a signal arrived.
    fn wait_readable(&mut self, deadline: Instant) -> Result<bool> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        match self.poll.poll(&mut self.events, Some(deadline - now)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(ClientError::Io(e)),
        }
    }
}

#[cfg(unix)]
impl AsRawFd for UdpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

fn open_connected(addr: SocketAddr, source_port: Option<u16>) -> io::Result<StdUdpSocket> {
    let port = source_port.unwrap_or(0);
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, port).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, port).into()
    };
    let socket = StdUdpSocket::bind(local)?;
    socket.connect(addr)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> StdUdpSocket {
        StdUdpSocket::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn test_send_and_receive() {
        let gateway = peer();
        let port = gateway.local_addr().unwrap().port();
        let mut transport = UdpTransport::connect("127.0.0.1", port, None).unwrap();

        transport.send(&[0x02, 0x16]).unwrap();
        let mut buf = [0u8; 16];
        let (n, client) = gateway.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x02, 0x16]);

        gateway.send_to(&[0x02, 0x17], client).unwrap();
        assert!(transport.select(Duration::from_secs(2)).unwrap());
        let datagram = transport.receive(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(&datagram[..], &[0x02, 0x17]);
    }

    #[test]
    fn test_receive_timeout_is_none() {
        let gateway = peer();
        let port = gateway.local_addr().unwrap().port();
        let mut transport = UdpTransport::connect("127.0.0.1", port, None).unwrap();

        let start = Instant::now();
        assert!(transport
            .receive(Duration::from_millis(100))
            .unwrap()
            .is_none());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!transport.select(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_bind_receives_from_anyone() {
        let mut transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = transport.local_addr().unwrap();
        let sender = peer();
        sender.send_to(&[0x03, 0x05, 0x00], addr).unwrap();

        let (datagram, from) = transport
            .receive_from(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(&datagram[..], &[0x03, 0x05, 0x00]);
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[test]
    fn test_unresolvable_host() {
        let err = UdpTransport::connect("no-such-host.invalid", 1883, None);
        assert!(matches!(err, Err(ClientError::AddressResolution(_))));
    }
}
