use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Reasons an inbound datagram is rejected.
///
/// All of these are recoverable: the receiver drops the datagram and keeps
/// reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("checksum mismatch: header says {expected:#010x}, body hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("unknown packet kind {0:#04x}")]
    UnknownKind(u8),
}
