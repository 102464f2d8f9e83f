use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanchat::protocol::Announcement;
use lanchat::{AuditLog, Error, EventReceiver, LeaveReason, Node, NodeConfig, NodeEvent};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Loopback-only config: ephemeral ports, announcements sent to the discard port.
fn local_config(name: &str) -> NodeConfig {
    let mut config = NodeConfig::new(name, 0);
    config.bind_ip = Ipv4Addr::LOCALHOST.into();
    config.discovery_bind = "127.0.0.1:0".parse().unwrap();
    config.broadcast_addr = "127.0.0.1:9".parse().unwrap();
    config.ack_timeout = Duration::from_secs(2);
    config.history_file = None;
    config
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

async fn next_event(rx: &mut EventReceiver) -> NodeEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test_log::test(tokio::test)]
async fn nodes_discover_each_other_and_say_goodbye() {
    let (x, mut x_events) = Node::start(local_config("X")).await.unwrap();

    let mut y_config = local_config("Y");
    y_config.broadcast_addr = x.discovery_addr().unwrap();
    let (y, mut y_events) = Node::start(y_config).await.unwrap();

    // Y's startup announce reaches X.
    assert_eq!(
        next_event(&mut x_events).await,
        NodeEvent::PeerJoined {
            name: "Y".into(),
            addr: loopback(y.port())
        }
    );

    // X's announce, delivered by hand since X broadcasts elsewhere.
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let announce = Announcement::Discover {
        name: "X".into(),
        port: x.port(),
    };
    raw.send_to(&announce.encode().unwrap(), y.discovery_addr().unwrap())
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut y_events).await,
        NodeEvent::PeerJoined {
            name: "X".into(),
            addr: loopback(x.port())
        }
    );

    // Re-announcing refreshes without a second join.
    y.announce().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(x_events.try_recv().is_err());
    assert_eq!(x.peers().len(), 1);
    assert_eq!(y.peers().len(), 1);

    y.shutdown().await;
    assert_eq!(
        next_event(&mut x_events).await,
        NodeEvent::PeerLeft {
            name: "Y".into(),
            reason: LeaveReason::Departed
        }
    );
    assert!(x.registry().is_empty());
}

#[test_log::test(tokio::test)]
async fn message_is_shown_at_receiver_and_acknowledged() {
    let (x, mut x_events) = Node::start(local_config("X")).await.unwrap();
    let y_history = SharedBuf::default();
    let (y, mut y_events) = Node::start_with_audit(
        local_config("Y"),
        AuditLog::from_writer(y_history.clone()),
    )
    .await
    .unwrap();

    x.registry().upsert("Y", loopback(y.port()));
    let report = x.send("hi").await;
    assert_eq!(report.delivered, vec!["Y"]);
    assert!(report.unreachable.is_empty());

    // The ack only goes out once Y has committed the message.
    assert_eq!(
        y_events.try_recv().unwrap(),
        NodeEvent::PeerJoined {
            name: "X".into(),
            addr: loopback(x.port())
        }
    );
    assert_eq!(
        y_events.try_recv().unwrap(),
        NodeEvent::Chat {
            sender: "X".into(),
            text: "hi".into(),
            local: false
        }
    );
    let history = y_history.contents();
    assert!(history.contains("PEER_JOINED: X"), "{history}");
    assert!(history.contains(&format!("MESSAGE: X (127.0.0.1:{}): hi", x.port())), "{history}");

    assert_eq!(
        next_event(&mut x_events).await,
        NodeEvent::Chat {
            sender: "X".into(),
            text: "hi".into(),
            local: true
        }
    );
    assert!(x_events.try_recv().is_err());
    assert!(x.registry().get("Y").is_some());
}

#[test_log::test(tokio::test)]
async fn silent_peer_times_out() {
    let mut config = local_config("X");
    config.peer_timeout = Duration::from_millis(600);
    config.sweep_interval = Duration::from_millis(100);
    config.announce_interval = Duration::from_millis(300);
    let (x, mut x_events) = Node::start(config).await.unwrap();

    // Y was seen once and then vanished without a goodbye.
    x.registry().upsert("Y", loopback(1));

    assert_eq!(
        next_event(&mut x_events).await,
        NodeEvent::PeerLeft {
            name: "Y".into(),
            reason: LeaveReason::TimedOut
        }
    );
    assert!(x.registry().is_empty());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(x_events.try_recv().is_err());
}

#[test_log::test(tokio::test)]
async fn refused_peer_is_removed_and_message_still_shown() {
    let (x, mut x_events) = Node::start(local_config("X")).await.unwrap();
    let (y, _y_events) = Node::start(local_config("Y")).await.unwrap();

    let dead = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    x.registry().upsert("ghost", dead);
    x.registry().upsert("Y", loopback(y.port()));

    let report = x.send("anyone there?").await;
    assert_eq!(report.delivered, vec!["Y"]);
    assert_eq!(report.unreachable, vec!["ghost"]);
    assert!(x.registry().get("ghost").is_none());

    let mut events = vec![next_event(&mut x_events).await, next_event(&mut x_events).await];
    events.sort_by_key(|e| matches!(e, NodeEvent::PeerLeft { .. }));
    assert_eq!(
        events,
        vec![
            NodeEvent::Chat {
                sender: "X".into(),
                text: "anyone there?".into(),
                local: true
            },
            NodeEvent::PeerLeft {
                name: "ghost".into(),
                reason: LeaveReason::Unreachable
            },
        ]
    );
    assert!(x_events.try_recv().is_err());
}

#[test_log::test(tokio::test)]
async fn taken_message_port_fails_startup() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = local_config("X");
    config.port = taken.local_addr().unwrap().port();

    let err = Node::start(config).await.err().expect("startup should fail");
    assert!(matches!(err, Error::Bind { socket: "message", .. }), "{err}");
}

#[test_log::test(tokio::test)]
async fn invalid_config_fails_startup() {
    let mut config = local_config("X");
    config.sweep_interval = config.peer_timeout;

    let err = Node::start(config).await.err().expect("startup should fail");
    assert!(matches!(err, Error::Config(_)), "{err}");
}
