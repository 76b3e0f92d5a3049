/**
 * probe.rs
 * Leak probes - confirm a port is really free by touching the socket layer
 *
 * The pool's bookkeeping only says a port *should* be free. A probe
 * binds the port for real and closes it again immediately:
 * - TCP: bind + listen + close
 * - UDP: bind + close
 *
 * A failed probe means something outside the pool owns the port.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};
use std::sync::Arc;
use tracing::trace;

/// Capability to check whether a port can be bound right now
pub trait LeakProbe: Send + Sync {
    /// Returns true if the port is genuinely free at this moment
    fn is_free(&self, port: u16) -> bool;
}

/// Transport a pool probes its ports with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Build the loopback probe for this transport
    pub fn probe(self) -> Arc<dyn LeakProbe> {
        match self {
            Protocol::Tcp => Arc::new(TcpProbe::default()),
            Protocol::Udp => Arc::new(UdpProbe::default()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// TCP probe: bind + listen + close
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: IpAddr,
}

impl TcpProbe {
    pub fn new(host: IpAddr) -> Self {
        TcpProbe { host }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        TcpProbe::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl LeakProbe for TcpProbe {
    fn is_free(&self, port: u16) -> bool {
        // TcpListener::bind listens as well; dropping it closes the socket
        match TcpListener::bind((self.host, port)) {
            Ok(_listener) => true,
            Err(e) => {
                trace!(port, error = %e, "tcp probe failed");
                false
            }
        }
    }
}

/// UDP probe: bind + close
#[derive(Debug, Clone)]
pub struct UdpProbe {
    host: IpAddr,
}

impl UdpProbe {
    pub fn new(host: IpAddr) -> Self {
        UdpProbe { host }
    }
}

impl Default for UdpProbe {
    fn default() -> Self {
        UdpProbe::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl LeakProbe for UdpProbe {
    fn is_free(&self, port: u16) -> bool {
        match UdpSocket::bind((self.host, port)) {
            Ok(_socket) => true,
            Err(e) => {
                trace!(port, error = %e, "udp probe failed");
                false
            }
        }
    }
}
