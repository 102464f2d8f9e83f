use crate::events::Notifier;
use crate::registry::PeerRegistry;
use std::sync::Arc;

/// Who this node is on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub name: String,
    /// The bound message-exchange port, as announced to peers.
    pub port: u16,
}

/// Node context handed to every service. Cheap to clone.
#[derive(Clone)]
pub struct NodeState {
    pub identity: Arc<LocalIdentity>,
    pub registry: PeerRegistry,
    pub notifier: Notifier,
}

impl NodeState {
    pub fn new(identity: LocalIdentity, registry: PeerRegistry, notifier: Notifier) -> Self {
        Self {
            identity: Arc::new(identity),
            registry,
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn port(&self) -> u16 {
        self.identity.port
    }

    /// Record activity from a peer, announcing it if it was unknown.
    pub fn peer_seen(&self, name: &str, addr: std::net::SocketAddr) -> bool {
        let is_new = self.registry.upsert(name, addr);
        if is_new {
            self.notifier.peer_joined(name, addr);
        } else {
            tracing::trace!(peer = %name, %addr, "peer refreshed");
        }
        is_new
    }

    /// Drop a peer, announcing the departure only if it was known.
    pub fn peer_gone(&self, name: &str, reason: crate::events::LeaveReason) -> bool {
        let existed = self.registry.remove(name);
        if existed {
            self.notifier.peer_left(name, reason);
        }
        existed
    }
}
