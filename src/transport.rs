use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::protocol::Frame;
use crate::{Error, Result};

/// Longest accepted line on a message-exchange connection.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Pause after a failed `accept`, so persistent errors such as running out of
/// file descriptors do not turn the listener into a busy loop.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A chat message read off an inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub name: String,
    /// The sender's announced message-exchange port.
    pub port: u16,
    pub text: String,
    /// Source address of the connection it arrived on.
    pub remote: SocketAddr,
}

impl IncomingMessage {
    /// Where the sender accepts connections: its IP with its announced port.
    pub fn reply_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote.ip(), self.port)
    }
}

fn framed(stream: TcpStream) -> Framed<TcpStream, LinesCodec> {
    Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
}

pub struct Transport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Transport {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            socket: "message",
            addr,
            source,
        })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Message exchange listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, serving each on its own task.
    ///
    /// `on_message` runs before the ack is written, so a sender only sees an
    /// ack for a message that has been handed off.
    pub fn start_listening<F>(self, on_message: F, shutdown: CancellationToken) -> JoinHandle<()>
    where
        F: Fn(IncomingMessage) + Send + Sync + Clone + 'static,
    {
        let listener = self.listener;
        tokio::spawn(async move {
            loop {
                let (stream, remote) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    res = listener.accept() => match res {
                        Ok(conn) => conn,
                        Err(e) => {
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = accept_failed(&e) => continue,
                            }
                        }
                    },
                };

                tracing::debug!(%remote, "accepted connection");
                let on_message = on_message.clone();
                let shutdown = shutdown.clone();
                let span = tracing::debug_span!("conn", %remote);
                tokio::spawn(
                    async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            res = serve_connection(stream, remote, on_message) => match res {
                                Ok(()) => tracing::debug!("connection closed"),
                                Err(e) => tracing::debug!("dropping connection: {}", e),
                            },
                        }
                    }
                    .instrument(span),
                );
            }
            tracing::debug!("message listener stopped");
        })
    }
}

async fn accept_failed(e: &std::io::Error) {
    tracing::warn!("accept failed: {}, retrying in {:?}", e, ACCEPT_BACKOFF);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn serve_connection<F>(stream: TcpStream, remote: SocketAddr, on_message: F) -> Result<()>
where
    F: Fn(IncomingMessage),
{
    let mut conn = framed(stream);
    while let Some(line) = conn.next().await {
        match Frame::decode(&line?)? {
            Frame::Message { name, port, text } => {
                on_message(IncomingMessage {
                    name,
                    port,
                    text,
                    remote,
                });
                conn.send(Frame::ack().encode()?).await?;
            }
            Frame::Ack { .. } => tracing::debug!("ignoring unsolicited ack"),
        }
    }
    Ok(())
}

/// Open a connection to `addr`, send `frame` and wait for the ack.
///
/// The whole exchange, connect included, is bounded by `ack_timeout`.
pub async fn send_message(addr: SocketAddr, frame: &Frame, ack_timeout: Duration) -> Result<()> {
    let line = frame.encode()?;
    tokio::time::timeout(ack_timeout, exchange(addr, line))
        .await
        .map_err(|_| Error::Timeout(ack_timeout))?
}

async fn exchange(addr: SocketAddr, line: String) -> Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let mut conn = framed(stream);
    conn.send(line).await?;

    let reply = match conn.next().await {
        Some(line) => Frame::decode(&line?)?,
        None => return Err(Error::ConnectionClosed),
    };
    match reply {
        Frame::Ack { status } => {
            tracing::trace!(%addr, %status, "delivery acknowledged");
            Ok(())
        }
        other => Err(Error::UnexpectedFrame(other.kind())),
    }
}
