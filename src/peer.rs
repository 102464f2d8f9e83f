use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    /// Where the peer accepts message-exchange connections.
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(name: impl Into<String>, addr: SocketAddr, last_seen: Instant) -> Self {
        Self {
            name: name.into(),
            addr,
            last_seen,
        }
    }

    /// Whether the peer has been silent for longer than `timeout` as of `now`.
    pub fn is_expired(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}
