use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed mid-record ({got} of {expected} bytes)")]
    TruncatedRecord { expected: usize, got: usize },

    #[error("login reply exceeds {max} bytes without a terminator")]
    ReplyTooLong { max: usize },
}

/// The central loop is gone, so nothing will ever drain the relay.
#[derive(Debug, Error)]
#[error("relay channel closed")]
pub struct RelayError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid host '{host}': {reason}")]
    Host { host: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("server closed the connection")]
    Disconnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
