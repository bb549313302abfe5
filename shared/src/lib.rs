//! Wire-level building blocks shared by the RCon client and the mock server.
//!
//! Nothing in this crate touches a socket. It knows how BattlEye frames look
//! on the wire, how command responses are split into fragments, and which
//! administrative commands a server understands.

pub mod command;
pub mod error;
pub mod packet;
pub mod response;

pub use command::{Command, UnknownCommand};
pub use error::ProtocolError;
pub use packet::{checksum, decode, encode, Packet, PacketKind};
pub use response::{fragment_response, ResponseBody};

/// Size of the receive buffer used by both ends: the largest payload a UDP
/// datagram can carry, so nothing the server sends is ever truncated.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Login reply payload for an accepted password.
pub const LOGIN_SUCCESS: u8 = 0x01;
/// Login reply payload for a rejected password.
pub const LOGIN_FAILURE: u8 = 0x00;
