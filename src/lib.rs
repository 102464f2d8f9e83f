//! Serverless LAN chat.
//!
//! Nodes find each other through UDP broadcast announcements and exchange
//! chat lines over short-lived TCP connections, each acknowledged by the
//! receiver. [`Node`] wires the services together around a shared
//! [`PeerRegistry`].

pub mod audit;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod exchange;
pub mod liveness;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use audit::{AuditKind, AuditLog};
pub use config::NodeConfig;
pub use discovery::Discovery;
pub use error::{Error, Result};
pub use events::{EventReceiver, LeaveReason, NodeEvent};
pub use exchange::DeliveryReport;
pub use peer::Peer;
pub use registry::PeerRegistry;

use events::Notifier;
use exchange::Exchange;
use liveness::Ticker;
use state::{LocalIdentity, NodeState};
use transport::Transport;

/// A running chat node.
///
/// Dropping the handle stops its background tasks without saying goodbye;
/// call [`Node::shutdown`] to leave gracefully.
pub struct Node {
    state: NodeState,
    discovery: Arc<Discovery>,
    exchange: Exchange,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind both sockets, start all services and announce ourselves.
    ///
    /// Fails only if the configuration is invalid, the history file cannot be
    /// opened, or a port cannot be bound.
    pub async fn start(config: NodeConfig) -> Result<(Self, EventReceiver)> {
        config.validate()?;
        let audit = match &config.history_file {
            Some(path) => AuditLog::open(path)?,
            None => AuditLog::disabled(),
        };
        Self::start_with_audit(config, audit).await
    }

    /// Like [`Node::start`] but records events to the given log.
    pub async fn start_with_audit(config: NodeConfig, audit: AuditLog) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let transport = Transport::bind(SocketAddr::new(config.bind_ip, config.port)).await?;
        let identity = LocalIdentity {
            name: config.name.clone(),
            port: transport.local_addr().port(),
        };
        let (notifier, events) = Notifier::new(audit);
        let state = NodeState::new(identity, PeerRegistry::new(), notifier);

        let discovery = Arc::new(Discovery::bind(
            config.discovery_bind,
            config.broadcast_addr,
            state.clone(),
        )?);
        let exchange = Exchange::new(state.clone(), config.ack_timeout);
        let shutdown = CancellationToken::new();

        let inbound = exchange.clone();
        let mut tasks = vec![transport.start_listening(
            move |msg| inbound.handle_incoming(msg),
            shutdown.clone(),
        )];

        {
            let discovery = discovery.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move { discovery.listen(shutdown).await }));
        }

        let ticker = Ticker {
            announce_interval: config.announce_interval,
            sweep_interval: config.sweep_interval,
            peer_timeout: config.peer_timeout,
        };
        tasks.push(tokio::spawn(ticker.run(
            state.clone(),
            discovery.clone(),
            shutdown.clone(),
        )));

        match local_ip_address::local_ip() {
            Ok(ip) => tracing::info!("{} is reachable at {}:{}", state.name(), ip, state.port()),
            Err(e) => tracing::warn!("could not determine local IP: {}", e),
        }

        if let Err(e) = discovery.announce().await {
            tracing::warn!("initial announce failed: {}", e);
        }

        Ok((
            Self {
                state,
                discovery,
                exchange,
                shutdown,
                tasks,
            },
            events,
        ))
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// The bound message-exchange port, as announced.
    pub fn port(&self) -> u16 {
        self.state.port()
    }

    pub fn discovery_addr(&self) -> Result<SocketAddr> {
        self.discovery.local_addr()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.state.registry
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.state.registry.snapshot()
    }

    /// Re-announce immediately instead of waiting for the next tick.
    pub async fn announce(&self) -> Result<()> {
        self.discovery.announce().await
    }

    /// Show `text` locally and deliver it to every known peer.
    pub async fn send(&self, text: &str) -> DeliveryReport {
        self.exchange.send_to_all(text).await
    }

    /// Broadcast goodbye, then stop all services.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.discovery.depart().await {
            tracing::warn!("goodbye broadcast failed: {}", e);
        }
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::error!("service task failed: {}", e);
            }
        }
        tracing::info!("{} left the network", self.state.name());
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
