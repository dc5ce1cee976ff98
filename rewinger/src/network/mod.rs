//! UDP transport.
//!
//! One protocol line per datagram, no further framing. Sockets are built
//! with `socket2` (reuse-address, broadcast, non-blocking) and then handed
//! to tokio, so the receiver can share the simulator's port with other
//! listeners and the replay can send to broadcast addresses.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;

pub use rewinger_core::protocol::{DEFAULT_PORT, MAX_DATAGRAM_SIZE};

/// Default destination for replayed datagrams
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Default receive timeout; keeps the receive loop responsive to shutdown
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot bind UDP socket to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("UDP receive failed: {0}")]
    Receive(#[source] io::Error),
}

// this will be common for all our sockets
pub fn new_socket(domain: Domain) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    // we're going to use read timeouts so that we don't hang waiting for packets
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;

    Ok(socket)
}

fn bind_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = new_socket(Domain::for_address(addr))?;
    socket.bind(&SockAddr::from(addr))?;
    log::trace!("Binding UDP socket to {}", addr);
    UdpSocket::from_std(socket.into())
}

/// A bound UDP endpoint
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to `addr`. Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind { addr, source };
        let socket = bind_socket(addr).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;
        log::debug!("UDP transport bound to {}", local_addr);
        Ok(UdpTransport { socket, local_addr })
    }

    /// Bind an ephemeral port for sending only.
    pub fn sender() -> Result<Self, TransportError> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    /// Bind an ephemeral port in the same address family as `destination`.
    pub fn sender_for(destination: SocketAddr) -> Result<Self, TransportError> {
        let unspecified = match destination {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self::bind(SocketAddr::new(unspecified, 0))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for one datagram, at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout expired. Dropping the future
    /// cancels the wait without side effects.
    pub async fn receive(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((len, from))) => Ok(Some((len, from))),
            Ok(Err(e)) => Err(TransportError::Receive(e)),
            Err(_) => Ok(None),
        }
    }

    /// Send one protocol line as a single datagram. Never retried.
    pub async fn send(&self, line: &str, destination: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(line.as_bytes(), destination)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::Send {
                addr: destination,
                source,
            })
    }

    /// Release the socket
    pub fn close(self) {
        log::debug!("Closing UDP transport on {}", self.local_addr);
    }
}
