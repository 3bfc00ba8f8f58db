//! TCP client transport.
//!
//! Implements [`Transport`](crate::client::transport::Transport) with
//! `std::net::TcpStream`, which ESP-IDF backs with lwIP sockets; the same
//! code runs on target and on the host.
//!
//! ## Connection model
//!
//! 1. `connect()` closes any previous stream, then opens a new one with a
//!    bounded connect timeout.
//! 2. Reads block for at most the configured socket timeout; a timeout is
//!    reported as `Ok(0)`, the same as an orderly close by the peer.
//! 3. `close()` shuts the socket down in both directions.

use core::fmt;
use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use log::{debug, info};

use crate::client::transport::Transport;

/// Errors originating from the TCP transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpTransportError {
    /// Operation requires an open connection but none is present.
    NotConnected,
    /// Socket failure.
    Io(ErrorKind),
}

impl fmt::Display for TcpTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Io(kind) => write!(f, "socket error: {}", kind),
        }
    }
}

impl From<std::io::Error> for TcpTransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

/// Single outbound TCP connection.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    timeout: Duration,
}

impl TcpTransport {
    /// `timeout_ms` bounds connect, each read and each write.
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            stream: None,
            timeout: Duration::from_millis(u64::from(timeout_ms.max(1))),
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TcpTransportError> {
        self.stream.as_mut().ok_or(TcpTransportError::NotConnected)
    }
}

impl Transport for TcpTransport {
    type Error = TcpTransportError;

    fn connect(&mut self, ip: Ipv4Addr, port: u16) -> Result<(), TcpTransportError> {
        self.close();
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        // Requests are written in one go; don't hold the tail back.
        let _ = stream.set_nodelay(true);
        debug!("tcp: connected to {}", addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        match self.stream()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!("tcp: read timed out");
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TcpTransportError> {
        Ok(self.stream()?.write_all(data)?)
    }

    fn flush(&mut self) -> Result<(), TcpTransportError> {
        Ok(self.stream()?.flush()?)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("tcp: connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
