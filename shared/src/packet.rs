//! BattlEye frame codec.
//!
//! Every datagram, in both directions, has the same layout:
//!
//! ```text
//! 'B' 'E' | CRC32 (u32 LE) | 0xFF | kind | [sequence] | payload...
//! ```
//!
//! The checksum covers everything from the `0xFF` separator to the end of
//! the datagram. Login frames carry no sequence byte; command and server
//! message frames always do.

use crate::error::{ProtocolError, ProtocolResult};
use std::borrow::Cow;

pub const MAGIC: [u8; 2] = [b'B', b'E'];
pub const SEPARATOR: u8 = 0xFF;

/// Offset of the first checksummed byte (the separator).
pub const CHECKSUM_START: usize = 6;
/// Magic, checksum, separator and kind byte.
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Login = 0x00,
    Command = 0x01,
    ServerMessage = 0x02,
}

impl PacketKind {
    /// Acknowledgements reuse the server message kind byte.
    pub const ACKNOWLEDGE: PacketKind = PacketKind::ServerMessage;

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PacketKind::Login),
            0x01 => Some(PacketKind::Command),
            0x02 => Some(PacketKind::ServerMessage),
            _ => None,
        }
    }

    /// Whether frames of this kind carry a sequence byte after the kind.
    pub fn has_sequence(self) -> bool {
        !matches!(self, PacketKind::Login)
    }
}

/// A decoded (or about to be encoded) BattlEye datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub sequence: Option<u8>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, sequence: Option<u8>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            sequence,
            payload: payload.into(),
        }
    }

    pub fn login(password: &str) -> Self {
        Self::new(PacketKind::Login, None, password.as_bytes())
    }

    pub fn command(sequence: u8, text: &str) -> Self {
        Self::new(PacketKind::Command, Some(sequence), text.as_bytes())
    }

    /// Payload-less command; only resets the server's idle timer.
    pub fn keep_alive(sequence: u8) -> Self {
        Self::new(PacketKind::Command, Some(sequence), Vec::new())
    }

    pub fn acknowledge(sequence: u8) -> Self {
        Self::new(PacketKind::ACKNOWLEDGE, Some(sequence), Vec::new())
    }

    pub fn login_reply(accepted: bool) -> Self {
        let status = if accepted {
            crate::LOGIN_SUCCESS
        } else {
            crate::LOGIN_FAILURE
        };
        Self::new(PacketKind::Login, None, vec![status])
    }

    pub fn server_message(sequence: u8, text: &str) -> Self {
        Self::new(PacketKind::ServerMessage, Some(sequence), text.as_bytes())
    }

    /// Payload interpreted as text. The protocol speaks ASCII, anything else
    /// is replaced rather than rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self.kind, self.sequence, &self.payload)
    }

    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

/// CRC32 (IEEE) over the checksummed part of a frame.
pub fn checksum(body: &[u8]) -> u32 {
    crc32fast::hash(body)
}

/// Builds a complete frame. Each call allocates its own buffer so concurrent
/// senders never share encode state.
pub fn encode(kind: PacketKind, sequence: Option<u8>, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + 1 + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&[0u8; 4]);
    frame.push(SEPARATOR);
    frame.push(kind.as_byte());
    if let Some(sequence) = sequence {
        frame.push(sequence);
    }
    frame.extend_from_slice(payload);

    let crc = checksum(&frame[CHECKSUM_START..]);
    frame[2..CHECKSUM_START].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// Validates and splits a frame.
///
/// The header, the separator and the checksum are all verified before the
/// kind byte is looked at, so a corrupted datagram never reaches dispatch.
pub fn decode(bytes: &[u8]) -> ProtocolResult<Packet> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "{} bytes is shorter than the {} byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }
    if bytes[..2] != MAGIC {
        return Err(ProtocolError::MalformedFrame(format!(
            "bad magic {:#04x} {:#04x}",
            bytes[0], bytes[1]
        )));
    }
    if bytes[CHECKSUM_START] != SEPARATOR {
        return Err(ProtocolError::MalformedFrame(format!(
            "expected separator 0xff, found {:#04x}",
            bytes[CHECKSUM_START]
        )));
    }

    let expected = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let actual = checksum(&bytes[CHECKSUM_START..]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    let kind_byte = bytes[HEADER_LEN - 1];
    let kind = PacketKind::from_byte(kind_byte).ok_or(ProtocolError::UnknownKind(kind_byte))?;
    let body = &bytes[HEADER_LEN..];

    if !kind.has_sequence() {
        return Ok(Packet::new(kind, None, body));
    }

    match body.split_first() {
        Some((&sequence, payload)) => Ok(Packet::new(kind, Some(sequence), payload)),
        None => Err(ProtocolError::MalformedFrame(format!(
            "{:?} frame without sequence number",
            kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_login_layout() {
        let frame = Packet::login("secret").encode();

        assert_eq!(&frame[..2], b"BE");
        assert_eq!(frame[6], 0xFF);
        assert_eq!(frame[7], 0x00);
        assert_eq!(&frame[8..], b"secret");

        let crc = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
        assert_eq!(crc, crc32fast::hash(&frame[6..]));
    }

    #[test]
    fn test_encode_command_layout() {
        let frame = Packet::command(7, "players").encode();

        assert_eq!(frame[7], 0x01);
        assert_eq!(frame[8], 7);
        assert_eq!(&frame[9..], b"players");
    }

    #[test]
    fn test_keep_alive_is_header_plus_sequence() {
        let frame = Packet::keep_alive(200).encode();
        assert_eq!(frame.len(), HEADER_LEN + 1);
        assert_eq!(frame[8], 200);
    }

    #[test]
    fn test_known_checksum() {
        let frame = encode(PacketKind::Command, Some(0), &[]);
        let crc = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
        assert_eq!(crc, crc32fast::hash(&[0xFF, 0x01, 0x00]));
    }

    #[test]
    fn test_roundtrip_each_kind() {
        let packets = vec![
            Packet::login("changeme"),
            Packet::login_reply(true),
            Packet::command(0, "players"),
            Packet::command(255, ""),
            Packet::acknowledge(5),
            Packet::server_message(5, "Player #1 Bob connected"),
            Packet::new(PacketKind::Command, Some(3), vec![0x00, 0x02, 0x01, b'x']),
        ];

        for packet in packets {
            let decoded = decode(&packet.encode()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_decode_login_reply() {
        let packet = decode(&Packet::login_reply(false).encode()).unwrap();
        assert_eq!(packet.kind, PacketKind::Login);
        assert_eq!(packet.sequence, None);
        assert_eq!(packet.payload, vec![0x00]);
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let err = decode(b"BE\x00\x00\x00\x00\xFF").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));

        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut frame = Packet::command(1, "bans").encode();
        frame[0] = b'X';
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        let mut frame = Packet::command(1, "bans").encode();
        frame[6] = 0x00;
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_corrupted_checksum() {
        let mut frame = Packet::command(1, "bans").encode();
        frame[2] ^= 0xA5;
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_corrupted_payload() {
        let mut frame = Packet::server_message(9, "hello").encode();
        let last = frame.len() - 1;
        frame[last] = b'X';
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut patched = encode(PacketKind::Command, Some(1), b"x");
        patched[7] = 0x09;
        let crc = checksum(&patched[6..]);
        patched[2..6].copy_from_slice(&crc.to_le_bytes());

        assert_eq!(decode(&patched), Err(ProtocolError::UnknownKind(0x09)));
    }

    #[test]
    fn test_decode_command_without_sequence() {
        let frame = encode(PacketKind::Command, None, &[]);
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_text_is_lossy() {
        let packet = Packet::new(PacketKind::ServerMessage, Some(0), vec![b'o', b'k', 0xFF]);
        assert_eq!(packet.text(), "ok\u{FFFD}");
    }
}
