use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Well-known UDP port for discovery announcements.
pub const DISCOVERY_PORT: u16 = 9090;
/// Silence tolerated before a peer is evicted.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(100);
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_HISTORY_FILE: &str = "chat_history.log";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Display name, unique within the broadcast domain.
    pub name: String,
    /// TCP port for message exchange; announced to peers. `0` picks a free
    /// port and announces whatever was bound.
    pub port: u16,
    /// Interface the message listener binds to.
    pub bind_ip: IpAddr,
    /// Local address for the discovery socket.
    pub discovery_bind: SocketAddr,
    /// Where announcements are sent.
    pub broadcast_addr: SocketAddr,
    pub peer_timeout: Duration,
    /// Must be shorter than `peer_timeout`; eviction happens at most
    /// `peer_timeout + sweep_interval` after a peer goes silent.
    pub sweep_interval: Duration,
    pub announce_interval: Duration,
    /// Bound on connect + send + ack for one delivery.
    pub ack_timeout: Duration,
    /// Audit log file; `None` disables it.
    pub history_file: Option<PathBuf>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            discovery_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT)),
            broadcast_addr: SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT)),
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            sweep_interval: DEFAULT_PEER_TIMEOUT / 5,
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            history_file: Some(PathBuf::from(DEFAULT_HISTORY_FILE)),
        }
    }

    /// Use `port` for both the discovery socket and its broadcast target.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_bind.set_port(port);
        self.broadcast_addr.set_port(port);
        self
    }

    /// Set the timeout and derive the sweep interval from it.
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self.sweep_interval = timeout / 5;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("node name must not be empty"));
        }
        if self.port != 0 && self.port == self.discovery_bind.port() {
            return Err(Error::config(format!(
                "message port {} collides with the discovery port",
                self.port
            )));
        }
        if self.peer_timeout.is_zero() {
            return Err(Error::config("peer timeout must be positive"));
        }
        if self.sweep_interval.is_zero() || self.sweep_interval >= self.peer_timeout {
            return Err(Error::config(format!(
                "sweep interval {:?} must be positive and shorter than the peer timeout {:?}",
                self.sweep_interval, self.peer_timeout
            )));
        }
        if self.announce_interval.is_zero() || self.announce_interval >= self.peer_timeout {
            return Err(Error::config(format!(
                "announce interval {:?} must be positive and shorter than the peer timeout {:?}",
                self.announce_interval, self.peer_timeout
            )));
        }
        if self.ack_timeout.is_zero() {
            return Err(Error::config("ack timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NodeConfig::new("alice", 5001);
        config.validate().unwrap();
        assert_eq!(config.broadcast_addr.to_string(), "255.255.255.255:9090");
        assert!(config.sweep_interval < config.peer_timeout);
    }

    #[test]
    fn rejects_port_collision() {
        let err = NodeConfig::new("alice", DISCOVERY_PORT).validate().unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn rejects_blank_name() {
        assert!(NodeConfig::new("  ", 5001).validate().is_err());
    }

    #[test]
    fn rejects_sweep_not_shorter_than_timeout() {
        let mut config = NodeConfig::new("alice", 5001);
        config.sweep_interval = config.peer_timeout;
        assert!(config.validate().is_err());
    }

    #[test]
    fn timeout_drives_sweep_interval() {
        let config = NodeConfig::new("alice", 5001).with_peer_timeout(Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
    }

    #[test]
    fn discovery_port_override() {
        let config = NodeConfig::new("alice", 9090).with_discovery_port(9191);
        config.validate().unwrap();
        assert_eq!(config.discovery_bind.port(), 9191);
        assert_eq!(config.broadcast_addr.port(), 9191);
    }
}
