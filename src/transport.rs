//! Socket lifecycle and raw datagram I/O. No protocol knowledge lives here.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

use crate::error::TransportError;

/// Largest datagram the transport will receive.
pub const MAX_DATAGRAM: usize = 2048;

/// Raw datagram transport the responder drives.
///
/// `recv` produces inbound datagrams for as long as the transport is open and
/// must resolve with [`TransportError::Closed`] once it is not, rather than
/// hang. `send_to` is fire-and-forget: no delivery confirmation, no retry.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Binds and joins; returning `Ok` is the readiness signal.
    async fn open(&self) -> Result<(), TransportError>;
    /// Awaits the next inbound datagram.
    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError>;
    /// Sends one datagram to `target`.
    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<(), TransportError>;
    /// Releases the sockets. Terminal; pending and future calls fail.
    fn close(&self);
}

enum SocketState {
    Unopened,
    Open {
        listener: Arc<UdpSocket>,
        sender: Arc<UdpSocket>,
    },
    Closed,
}

/// UDP multicast transport: one socket bound to the group port for receiving,
/// one ephemeral socket for sending.
///
/// The receive socket is created with reuse-address (and reuse-port on unix)
/// so several responders on one host can share the same group and port.
pub struct MulticastTransport {
    group: Ipv4Addr,
    port: u16,
    state: Mutex<SocketState>,
    shutdown_tx: watch::Sender<bool>,
}

impl MulticastTransport {
    pub fn new(group: Ipv4Addr, port: u16) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            group,
            port,
            state: Mutex::new(SocketState::Unopened),
            shutdown_tx,
        }
    }

    fn bind_listener(&self) -> Result<UdpSocket, TransportError> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(TransportError::Bind)?;
        socket.set_reuse_address(true).map_err(TransportError::Bind)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(TransportError::Bind)?;
        socket.set_nonblocking(true).map_err(TransportError::Bind)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port));
        socket.bind(&bind_addr.into()).map_err(TransportError::Bind)?;
        UdpSocket::from_std(socket.into()).map_err(TransportError::Bind)
    }

    fn listener(&self) -> Result<Arc<UdpSocket>, TransportError> {
        match &*self.state.lock() {
            SocketState::Unopened => Err(TransportError::NotOpen),
            SocketState::Open { listener, .. } => Ok(listener.clone()),
            SocketState::Closed => Err(TransportError::Closed),
        }
    }

    fn sender(&self) -> Result<Arc<UdpSocket>, TransportError> {
        match &*self.state.lock() {
            SocketState::Unopened => Err(TransportError::NotOpen),
            SocketState::Open { sender, .. } => Ok(sender.clone()),
            SocketState::Closed => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl DatagramTransport for MulticastTransport {
    async fn open(&self) -> Result<(), TransportError> {
        match &*self.state.lock() {
            SocketState::Unopened => {}
            SocketState::Open { .. } => return Err(TransportError::AlreadyOpen),
            SocketState::Closed => return Err(TransportError::Closed),
        }

        let listener = self.bind_listener()?;
        listener
            .join_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED)
            .map_err(TransportError::Bind)?;
        listener
            .set_multicast_loop_v4(true)
            .map_err(TransportError::Bind)?;

        let sender = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(TransportError::Bind)?;
        sender.set_broadcast(true).map_err(TransportError::Bind)?;

        debug!(group = %self.group, port = self.port, "multicast transport open");
        *self.state.lock() = SocketState::Open {
            listener: Arc::new(listener),
            sender: Arc::new(sender),
        };
        Ok(())
    }

    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let listener = self.listener()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; MAX_DATAGRAM];
        tokio::select! {
            _ = shutdown_rx.wait_for(|closed| *closed) => Err(TransportError::Closed),
            received = listener.recv_from(&mut buf) => {
                let (len, sender) = received.map_err(TransportError::Recv)?;
                buf.truncate(len);
                Ok((buf, sender))
            }
        }
    }

    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        let sender = self.sender()?;
        sender
            .send_to(bytes, target)
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, SocketState::Open { .. }) {
            debug!(group = %self.group, port = self.port, "multicast transport closed");
        }
        *state = SocketState::Closed;
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for MulticastTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            SocketState::Unopened => "unopened",
            SocketState::Open { .. } => "open",
            SocketState::Closed => "closed",
        };
        f.debug_struct("MulticastTransport")
            .field("group", &self.group)
            .field("port", &self.port)
            .field("state", &state)
            .finish()
    }
}
