//! Command response payloads.
//!
//! After the echoed sequence number a response is either empty, a complete
//! text, or one fragment of a multi-part answer:
//!
//! ```text
//! 0x00 | total fragments | 0-based index | fragment text
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::{Packet, PacketKind};

/// Leading byte that marks a multi-part fragment.
pub const MULTIPART_MARKER: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBody<'a> {
    Empty,
    Single(&'a [u8]),
    Fragment {
        total: u8,
        index: u8,
        data: &'a [u8],
    },
}

impl<'a> ResponseBody<'a> {
    /// Classifies the payload of a command response (sequence byte already
    /// stripped).
    pub fn parse(payload: &'a [u8]) -> ProtocolResult<Self> {
        match payload {
            [] => Ok(ResponseBody::Empty),
            [MULTIPART_MARKER, total, index, data @ ..] => Ok(ResponseBody::Fragment {
                total: *total,
                index: *index,
                data,
            }),
            [MULTIPART_MARKER, ..] => Err(ProtocolError::MalformedFrame(format!(
                "multi-part header needs 3 bytes, got {}",
                payload.len()
            ))),
            text => Ok(ResponseBody::Single(text)),
        }
    }
}

/// Splits a response into datagrams of at most `fragment_size` text bytes.
///
/// Short responses go out as a single packet; longer ones get the multi-part
/// header. Used by the server side of the protocol.
pub fn fragment_response(sequence: u8, text: &[u8], fragment_size: usize) -> Vec<Packet> {
    let fragment_size = fragment_size.max(1);
    if text.len() <= fragment_size {
        return vec![Packet::new(PacketKind::Command, Some(sequence), text)];
    }

    let chunks: Vec<&[u8]> = text.chunks(fragment_size).collect();
    // The header only has one byte for the count; anything beyond is cut off.
    let total = chunks.len().min(u8::MAX as usize) as u8;

    chunks
        .into_iter()
        .take(total as usize)
        .enumerate()
        .map(|(index, chunk)| {
            let mut payload = Vec::with_capacity(3 + chunk.len());
            payload.push(MULTIPART_MARKER);
            payload.push(total);
            payload.push(index as u8);
            payload.extend_from_slice(chunk);
            Packet::new(PacketKind::Command, Some(sequence), payload)
        })
        .collect()
}
