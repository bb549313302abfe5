use berc_shared::ProtocolError;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned synchronously by client operations.
///
/// Problems detected inside the receive loop or the liveness monitor never
/// surface here; they are logged and reported through the connection event
/// handlers instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("already connected or connecting")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("connection lost")]
    ConnectionLost,

    #[error("no stored credentials, connect with a password first")]
    NoStoredCredentials,

    #[error("command queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("login abandoned by disconnect")]
    Cancelled,

    #[error("login rejected by server")]
    LoginFailed,

    #[error("no login reply within {0:?}")]
    LoginTimeout(Duration),

    #[error("unexpected login reply: {0}")]
    UnexpectedLoginReply(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),
}
