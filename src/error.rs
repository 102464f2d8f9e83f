//! Error types for lanchat.

use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A listening socket could not be bound at startup.
    #[error("failed to bind {socket} socket on {addr}: {source}")]
    Bind {
        /// Which socket failed ("discovery" or "message").
        socket: &'static str,
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error on a message-exchange connection.
    #[error("framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// Payload was not a valid protocol record.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The remote did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The remote closed the connection before replying.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The remote replied with a frame we did not expect.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    /// Invalid node configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
