//! Notifications emitted by a running node.
//!
//! Every join, leave and chat event goes to two sinks: the display channel
//! returned by [`crate::Node::start`] and the [`AuditLog`]. Both accept calls
//! from any task without blocking.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audit::{AuditKind, AuditLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The peer sent a goodbye announcement.
    Departed,
    /// The liveness monitor found no activity within the timeout.
    TimedOut,
    /// A delivery to the peer failed.
    Unreachable,
}

impl fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaveReason::Departed => "left the chat",
            LeaveReason::TimedOut => "timed out",
            LeaveReason::Unreachable => "is unreachable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    PeerJoined { name: String, addr: SocketAddr },
    PeerLeft { name: String, reason: LeaveReason },
    /// A chat line; `local` is set for messages this node authored.
    Chat {
        sender: String,
        text: String,
        local: bool,
    },
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEvent::PeerJoined { name, .. } => write!(f, "* {name} joined the chat"),
            NodeEvent::PeerLeft { name, reason } => write!(f, "* {name} {reason}"),
            NodeEvent::Chat { sender, text, .. } => write!(f, "{sender}: {text}"),
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<NodeEvent>;

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NodeEvent>,
    audit: Arc<AuditLog>,
}

impl Notifier {
    pub fn new(audit: AuditLog) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                audit: Arc::new(audit),
            },
            rx,
        )
    }

    fn emit(&self, event: NodeEvent) {
        // The display may already be gone during shutdown; the audit entry
        // has been written by then.
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }

    pub fn peer_joined(&self, name: &str, addr: SocketAddr) {
        tracing::info!(peer = %name, %addr, "peer joined");
        self.audit
            .record(AuditKind::PeerJoined, &format!("{name} ({addr}) discovered"));
        self.emit(NodeEvent::PeerJoined {
            name: name.to_string(),
            addr,
        });
    }

    pub fn peer_left(&self, name: &str, reason: LeaveReason) {
        tracing::info!(peer = %name, %reason, "peer left");
        self.audit
            .record(AuditKind::PeerLeft, &format!("{name} {reason}"));
        self.emit(NodeEvent::PeerLeft {
            name: name.to_string(),
            reason,
        });
    }

    /// A message received from `sender`, who listens on `addr`.
    pub fn message(&self, sender: &str, addr: SocketAddr, text: &str) {
        self.audit
            .record(AuditKind::Message, &format!("{sender} ({addr}): {text}"));
        self.emit(NodeEvent::Chat {
            sender: sender.to_string(),
            text: text.to_string(),
            local: false,
        });
    }

    pub fn my_message(&self, me: &str, text: &str) {
        self.audit.record(AuditKind::MyMessage, &format!("{me}: {text}"));
        self.emit(NodeEvent::Chat {
            sender: me.to_string(),
            text: text.to_string(),
            local: true,
        });
    }
}
