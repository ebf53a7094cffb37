use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use crate::error::Result;

/// One transport-specific way of reaching the gateway.
///
/// A `Transport` owns the endpoint configuration and knows how to establish
/// one connection cycle. The engine above never learns which concrete
/// transport it is driving.
pub trait Transport: Send + Sync {
    /// Establish a fresh connection cycle (blocking, bounded by the
    /// transport's connect timeout).
    fn connect(&self) -> Result<Link>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;

    /// Update the gateway host. Returns true if the value changed.
    /// Transports without a host (e.g. multicast groups) ignore this.
    fn set_host(&self, _host: &str) -> bool {
        false
    }

    /// Update the gateway port. Returns true if the value changed.
    fn set_port(&self, _port: u16) -> bool {
        false
    }

    /// Whether silence on the read side indicates a dead connection.
    ///
    /// True for connection-oriented streams where the gateway is expected
    /// to talk (enables the flat-line watchdog); false for datagram
    /// transports where silence is normal.
    fn detects_flat_line(&self) -> bool {
        false
    }
}

/// A connected stream handle for one connection cycle.
///
/// Exclusively owned by that cycle: one clone each is handed to the sender
/// and receiver loops, and the handle is never reused across reconnects.
pub struct Link {
    inner: LinkInner,
}

enum LinkInner {
    Tcp(TcpStream),
    Udp { socket: UdpSocket, peer: SocketAddr },
}

impl Link {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkInner::Tcp(stream),
        }
    }

    pub(crate) fn from_udp(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            inner: LinkInner::Udp { socket, peer },
        }
    }

    /// Set read timeout on the underlying socket.
    ///
    /// Receiver loops use a bounded read so cancellation is observed even
    /// when the gateway is silent.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            LinkInner::Udp { socket, .. } => socket.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            LinkInner::Udp { socket, .. } => socket.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this link (creates a new descriptor on the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            LinkInner::Udp { socket, peer } => Ok(Self::from_udp(socket.try_clone()?, *peer)),
        }
    }

    /// Force the link closed, unblocking any thread parked in a read.
    ///
    /// Safe to call from a thread other than the reader; errors from an
    /// already-dead socket are ignored by callers during teardown.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            LinkInner::Tcp(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            // Datagram sockets have no shutdown; readers fall out on their
            // read timeout instead.
            LinkInner::Udp { .. } => Ok(()),
        }
    }

    /// The remote endpoint this link is bound to.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.peer_addr().map_err(Into::into),
            LinkInner::Udp { peer, .. } => Ok(*peer),
        }
    }
}

impl Read for Link {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.read(buf),
            LinkInner::Udp { socket, .. } => socket.recv(buf),
        }
    }
}

impl Write for Link {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.write(buf),
            LinkInner::Udp { socket, peer } => socket.send_to(buf, *peer),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.flush(),
            LinkInner::Udp { .. } => Ok(()),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkInner::Tcp(_) => f.debug_struct("Link").field("type", &"tcp").finish(),
            LinkInner::Udp { peer, .. } => f
                .debug_struct("Link")
                .field("type", &"udp-multicast")
                .field("peer", peer)
                .finish(),
        }
    }
}
