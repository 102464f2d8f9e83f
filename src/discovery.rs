use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::events::LeaveReason;
use crate::protocol::Announcement;
use crate::state::NodeState;
use crate::{Error, Result};

/// Receive buffer size; longer datagrams are truncated and fail to decode.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// What the listener did with one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramOutcome {
    /// Our own announcement came back to us.
    SelfEcho,
    Malformed,
    Joined,
    Refreshed,
    Departed,
    /// Goodbye from a peer we no longer track.
    AlreadyGone,
}

pub struct Discovery {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    state: NodeState,
}

impl Discovery {
    /// Bind the shared discovery port. Other nodes on the same host may bind
    /// it too; each gets a copy of every broadcast.
    pub fn bind(bind_addr: SocketAddr, broadcast_addr: SocketAddr, state: NodeState) -> Result<Self> {
        let socket = bind_shared_udp(bind_addr).map_err(|source| Error::Bind {
            socket: "discovery",
            addr: bind_addr,
            source,
        })?;
        tracing::info!(
            "Discovery listening on {} (announcing to {})",
            socket.local_addr()?,
            broadcast_addr
        );
        Ok(Self {
            socket,
            broadcast_addr,
            state,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Broadcast our presence.
    pub async fn announce(&self) -> Result<()> {
        self.send(Announcement::Discover {
            name: self.state.name().to_string(),
            port: self.state.port(),
        })
        .await
    }

    /// Broadcast our departure. Best effort; peers that miss it time us out.
    pub async fn depart(&self) -> Result<()> {
        self.send(Announcement::Goodbye {
            name: self.state.name().to_string(),
            port: self.state.port(),
        })
        .await
    }

    async fn send(&self, msg: Announcement) -> Result<()> {
        let data = msg.encode()?;
        self.socket.send_to(&data, self.broadcast_addr).await?;
        tracing::debug!(kind = ?msg, "sent announcement");
        Ok(())
    }

    /// Apply one received datagram to the registry.
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> DatagramOutcome {
        let msg = match Announcement::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%from, "dropping malformed announcement: {}", e);
                return DatagramOutcome::Malformed;
            }
        };

        if msg.port() == self.state.port() {
            tracing::trace!(%from, "ignoring our own announcement");
            return DatagramOutcome::SelfEcho;
        }

        match msg {
            Announcement::Discover { name, port } => {
                let addr = SocketAddr::new(from.ip(), port);
                if self.state.peer_seen(&name, addr) {
                    DatagramOutcome::Joined
                } else {
                    DatagramOutcome::Refreshed
                }
            }
            Announcement::Goodbye { name, .. } => {
                if self.state.peer_gone(&name, LeaveReason::Departed) {
                    DatagramOutcome::Departed
                } else {
                    DatagramOutcome::AlreadyGone
                }
            }
        }
    }

    /// Receive announcements until `shutdown` fires.
    pub async fn listen(&self, shutdown: CancellationToken) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("discovery listener stopped");
                    break;
                }
                res = self.socket.recv_from(&mut buf) => match res {
                    Ok((len, from)) => {
                        let outcome = self.handle_datagram(&buf[..len], from);
                        tracing::trace!(%from, ?outcome, "datagram handled");
                    }
                    Err(e) => {
                        // e.g. ICMP port-unreachable surfacing on some platforms
                        tracing::warn!("discovery receive failed: {}", e);
                    }
                },
            }
        }
    }
}

fn bind_shared_udp(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}
