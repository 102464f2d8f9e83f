use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lanchat::config::{DEFAULT_ANNOUNCE_INTERVAL, DEFAULT_HISTORY_FILE, DISCOVERY_PORT};
use lanchat::{Node, NodeConfig};

#[derive(Parser)]
#[command(name = "lanchat")]
#[command(about = "Serverless chat for the local network")]
struct Args {
    /// Display name; must be unique on the network (defaults to the host name)
    #[arg(short, long)]
    name: Option<String>,

    /// TCP port for incoming messages
    #[arg(short, long)]
    port: u16,

    /// UDP port shared by all nodes for discovery
    #[arg(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,

    /// Address announcements are broadcast to
    #[arg(long, default_value = "255.255.255.255")]
    broadcast: IpAddr,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value_t = 100)]
    timeout: u64,

    /// Seconds between liveness sweeps (defaults to timeout / 5)
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Seconds between presence announcements
    #[arg(long)]
    announce_interval: Option<u64>,

    /// Seconds to wait for each peer to acknowledge a message
    #[arg(long, default_value_t = 3)]
    ack_timeout: u64,

    /// File the event history is appended to
    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    history: PathBuf,

    /// Do not write an event history
    #[arg(long)]
    no_history: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig> {
        let name = match self.name {
            Some(name) => name,
            None => hostname::get()
                .context("no --name given and the host name is unavailable")?
                .to_string_lossy()
                .into_owned(),
        };

        let mut config = NodeConfig::new(name, self.port)
            .with_discovery_port(self.discovery_port)
            .with_peer_timeout(Duration::from_secs(self.timeout));
        config.broadcast_addr = SocketAddr::new(self.broadcast, self.discovery_port);
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval = Duration::from_secs(secs);
        }
        config.announce_interval = match self.announce_interval {
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_ANNOUNCE_INTERVAL.min(config.peer_timeout / 3),
        };
        config.ack_timeout = Duration::from_secs(self.ack_timeout);
        config.history_file = (!self.no_history).then_some(self.history);

        config.validate()?;
        Ok(config)
    }
}

fn print_peers(node: &Node) {
    let peers = node.peers();
    if peers.is_empty() {
        println!("* no peers yet");
        return;
    }
    for peer in peers {
        println!(
            "* {} at {} (seen {}s ago)",
            peer.name,
            peer.addr,
            peer.last_seen.elapsed().as_secs()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "lanchat=debug" } else { "lanchat=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.into_config()?;
    info!("Starting node {} on port {}", config.name, config.port);
    let (node, mut events) = Node::start(config).await.context("failed to start node")?;

    let display = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event}");
        }
    });

    println!(
        "* {} is online on port {}. Type a message, /peers or /quit.",
        node.name(),
        node.port()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/peers" => print_peers(&node),
                    _ => {
                        let report = node.send(&line).await;
                        debug!(
                            delivered = report.delivered.len(),
                            unreachable = report.unreachable.len(),
                            "message sent"
                        );
                    }
                }
            }
        }
    }

    node.shutdown().await;
    // Remaining connection tasks release the event channel as they wind down.
    let _ = tokio::time::timeout(Duration::from_secs(1), display).await;
    Ok(())
}
