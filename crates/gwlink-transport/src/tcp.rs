use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::link::{Link, Transport};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport to the gateway.
///
/// The endpoint is mutable behind a lock so operator preference changes can
/// land while a connection cycle is in flight; the new endpoint takes
/// effect on the next cycle.
pub struct TcpTransport {
    endpoint: Mutex<Endpoint>,
    connect_timeout: Duration,
}

#[derive(Clone)]
struct Endpoint {
    host: String,
    port: u16,
}

impl TcpTransport {
    /// Create a TCP transport for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a TCP transport with an explicit connect timeout.
    pub fn with_timeout(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            endpoint: Mutex::new(Endpoint {
                host: host.into(),
                port,
            }),
            connect_timeout,
        }
    }

    /// The currently configured endpoint, as `host:port`.
    pub fn endpoint(&self) -> String {
        let ep = self.lock_endpoint();
        format!("{}:{}", ep.host, ep.port)
    }

    // Endpoint state stays valid across a panicked holder; recover the
    // guard instead of propagating poison.
    fn lock_endpoint(&self) -> MutexGuard<'_, Endpoint> {
        match self.endpoint.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        let ep = self.lock_endpoint().clone();
        if ep.host.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "gateway host not configured".into(),
            ));
        }
        let mut addrs = (ep.host.as_str(), ep.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: ep.host.clone(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Resolve {
            host: ep.host,
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            ),
        })
    }
}

impl Transport for TcpTransport {
    fn connect(&self) -> Result<Link> {
        let addr = self.resolve()?;
        debug!(%addr, "connecting to gateway");
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        // The gateway link is latency-sensitive; don't batch small frames.
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%addr, %err, "could not disable nagle");
        }
        info!(%addr, "gateway connection established");
        Ok(Link::from_tcp(stream))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn set_host(&self, host: &str) -> bool {
        let mut ep = self.lock_endpoint();
        if ep.host == host {
            return false;
        }
        ep.host = host.to_string();
        true
    }

    fn set_port(&self, port: u16) -> bool {
        let mut ep = self.lock_endpoint();
        if ep.port == port {
            return false;
        }
        ep.port = port;
        true
    }

    fn detects_flat_line(&self) -> bool {
        true
    }
}
