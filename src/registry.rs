//! Shared peer registry.
//!
//! Every component reads and mutates peers through this type. The map lives
//! behind a single mutex that is never held across an `.await`; callers that
//! need to do network I/O per peer take a [`PeerRegistry::snapshot`] first.

use crate::peer::Peer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<String, Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Peer>> {
        // A panic while holding the lock cannot leave a half-written entry,
        // so a poisoned map is still consistent.
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or refresh a peer. Returns `true` if the name was not known.
    pub fn upsert(&self, name: &str, addr: SocketAddr) -> bool {
        self.upsert_at(name, addr, Instant::now())
    }

    pub fn upsert_at(&self, name: &str, addr: SocketAddr, seen_at: Instant) -> bool {
        let mut peers = self.lock();
        match peers.get_mut(name) {
            Some(peer) => {
                peer.addr = addr;
                // Never move last_seen backwards if callers race with stale clocks.
                if seen_at > peer.last_seen {
                    peer.last_seen = seen_at;
                }
                false
            }
            None => {
                peers.insert(name.to_string(), Peer::new(name, addr, seen_at));
                true
            }
        }
    }

    /// Remove a peer. Returns `true` if it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Peer> {
        self.lock().get(name).cloned()
    }

    /// Point-in-time copy of all peers, sorted by name.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.lock().values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    /// Drop every peer silent for longer than `timeout` and return their names.
    pub fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut peers = self.lock();
        let mut expired: Vec<String> = peers
            .values()
            .filter(|p| p.is_expired(now, timeout))
            .map(|p| p.name.clone())
            .collect();
        for name in &expired {
            peers.remove(name);
        }
        expired.sort();
        expired
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
