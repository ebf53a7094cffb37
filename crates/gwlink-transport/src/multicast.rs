use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::link::{Link, Transport};

/// Default multicast TTL: stay on the local segment.
pub const DEFAULT_TTL: u32 = 1;

/// UDP multicast transport.
///
/// One socket bound to the group port, joined to the group; writes are
/// datagrams addressed to the group, reads receive whatever the group
/// carries. There is no connection to lose, so the engine treats a
/// successful join as "connected" and relies on send errors for failure
/// detection.
pub struct MulticastTransport {
    group: Ipv4Addr,
    port: u16,
    ttl: u32,
}

impl MulticastTransport {
    /// Create a transport for a multicast `group:port`.
    pub fn new(group: Ipv4Addr, port: u16) -> Self {
        Self::with_ttl(group, port, DEFAULT_TTL)
    }

    /// Create a transport with an explicit TTL.
    pub fn with_ttl(group: Ipv4Addr, port: u16, ttl: u32) -> Self {
        Self { group, port, ttl }
    }
}

impl Transport for MulticastTransport {
    fn connect(&self) -> Result<Link> {
        if !self.group.is_multicast() {
            return Err(TransportError::InvalidEndpoint(format!(
                "{} is not a multicast group",
                self.group
            )));
        }

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port));
        let socket = UdpSocket::bind(bind_addr).map_err(|source| TransportError::Bind {
            addr: bind_addr,
            source,
        })?;
        socket.join_multicast_v4(&self.group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_ttl_v4(self.ttl)?;
        // Don't read back our own traffic.
        socket.set_multicast_loop_v4(false)?;

        let peer = SocketAddr::V4(SocketAddrV4::new(self.group, self.port));
        debug!(group = %self.group, port = self.port, ttl = self.ttl, "joined multicast group");
        info!(group = %self.group, port = self.port, "multicast link ready");
        Ok(Link::from_udp(socket, peer))
    }

    fn name(&self) -> &'static str {
        "multicast"
    }
}
