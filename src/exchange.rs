//! Chat delivery policy on top of [`crate::transport`].
//!
//! Inbound messages refresh the sender in the registry before they are shown
//! and acknowledged. Outbound messages fan out to a registry snapshot, one
//! task per peer; any failed delivery evicts that peer and nothing else.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::events::LeaveReason;
use crate::protocol::Frame;
use crate::state::NodeState;
use crate::transport::{self, IncomingMessage};

/// Outcome of one [`Exchange::send_to_all`] call, peer names sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub unreachable: Vec<String>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.unreachable.len()
    }
}

#[derive(Clone)]
pub struct Exchange {
    state: NodeState,
    ack_timeout: Duration,
}

impl Exchange {
    pub fn new(state: NodeState, ack_timeout: Duration) -> Self {
        Self { state, ack_timeout }
    }

    /// Commit an inbound message. Called before the ack goes out.
    pub fn handle_incoming(&self, msg: IncomingMessage) {
        let addr = msg.reply_addr();
        tracing::debug!(peer = %msg.name, %addr, "message received");
        self.state.peer_seen(&msg.name, addr);
        self.state.notifier.message(&msg.name, addr, &msg.text);
    }

    /// Show `text` locally and deliver it to every known peer.
    ///
    /// Blank text is ignored. Peers that fail to acknowledge within the ack
    /// timeout are removed from the registry.
    pub async fn send_to_all(&self, text: &str) -> DeliveryReport {
        if text.trim().is_empty() {
            return DeliveryReport::default();
        }

        self.state.notifier.my_message(self.state.name(), text);

        let frame = Arc::new(Frame::Message {
            name: self.state.name().to_string(),
            port: self.state.port(),
            text: text.to_string(),
        });

        let mut deliveries = JoinSet::new();
        for peer in self.state.registry.snapshot() {
            let frame = frame.clone();
            let state = self.state.clone();
            let ack_timeout = self.ack_timeout;
            deliveries.spawn(async move {
                match transport::send_message(peer.addr, &frame, ack_timeout).await {
                    Ok(()) => {
                        tracing::debug!(peer = %peer.name, "delivered");
                        Ok(peer.name)
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer.name, addr = %peer.addr, "delivery failed: {}", e);
                        state.peer_gone(&peer.name, LeaveReason::Unreachable);
                        Err(peer.name)
                    }
                }
            });
        }

        let mut report = DeliveryReport::default();
        while let Some(res) = deliveries.join_next().await {
            match res {
                Ok(Ok(name)) => report.delivered.push(name),
                Ok(Err(name)) => report.unreachable.push(name),
                Err(e) => tracing::error!("delivery task failed: {}", e),
            }
        }
        report.delivered.sort();
        report.unreachable.sort();
        report
    }
}
