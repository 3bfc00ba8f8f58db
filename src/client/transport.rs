//! Transport abstraction: a connect/read/write byte stream.
//!
//! Concrete implementations:
//! - TCP socket over WiFi ([`TcpTransport`](crate::adapters::tcp_transport::TcpTransport))
//! - scripted in-memory streams in the test suites
//!
//! The pour client is generic over `Transport`, so the protocol logic can
//! be exercised without a network.

use core::net::Ipv4Addr;

/// Byte-oriented client connection.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Open a connection, closing any previous one first.
    fn connect(&mut self, ip: Ipv4Addr, port: u16) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 when the peer closed the stream or the read timed out.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Tear down the connection.  Idempotent.
    fn close(&mut self);

    fn is_connected(&self) -> bool;
}
