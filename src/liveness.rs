use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::discovery::Discovery;
use crate::events::LeaveReason;
use crate::state::NodeState;

/// Evict every peer silent for longer than `timeout` as of `now`.
pub fn sweep(state: &NodeState, now: Instant, timeout: Duration) -> Vec<String> {
    let expired = state.registry.sweep_expired(now, timeout);
    for name in &expired {
        state.notifier.peer_left(name, LeaveReason::TimedOut);
    }
    expired
}

/// Periodic work for a running node: re-announce and liveness sweep.
pub struct Ticker {
    pub announce_interval: Duration,
    pub sweep_interval: Duration,
    pub peer_timeout: Duration,
}

impl Ticker {
    pub async fn run(self, state: NodeState, discovery: Arc<Discovery>, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now();
        // The startup announce has already gone out.
        let mut announce = tokio::time::interval_at(start + self.announce_interval, self.announce_interval);
        let mut sweeper = tokio::time::interval_at(start + self.sweep_interval, self.sweep_interval);
        announce.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = announce.tick() => {
                    if let Err(e) = discovery.announce().await {
                        tracing::warn!("re-announce failed: {}", e);
                    }
                }
                _ = sweeper.tick() => {
                    let evicted = sweep(&state, Instant::now(), self.peer_timeout);
                    if !evicted.is_empty() {
                        tracing::debug!(count = evicted.len(), "swept stale peers");
                    }
                }
            }
        }
        tracing::debug!("ticker stopped");
    }
}
