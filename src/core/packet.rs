//! MySQL-style packet framing.
//!
//! Every frame is a 3-byte little-endian payload length, a 1-byte sequence
//! id and the payload itself. Decoding never touches the caller's buffer;
//! [`try_consume`] only reports how many bytes a complete frame occupies.

use crate::error::{HoneypotError, Result};

/// Length prefix plus sequence id
pub const HEADER_LEN: usize = 4;

/// Largest payload a 3-byte length prefix can describe
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: Vec<u8>) -> Self {
        Self {
            sequence_id,
            payload,
        }
    }

    /// Serialize header and payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self.sequence_id, &self.payload)
    }

    /// Parse a buffer holding exactly one frame
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        match try_consume(buf) {
            Consumed::Complete {
                sequence_id,
                payload,
                consumed,
            } if consumed == buf.len() => Ok(Self::new(sequence_id, payload.to_vec())),
            Consumed::Complete { .. } => Err(HoneypotError::MalformedInput),
            Consumed::Incomplete | Consumed::Partial { .. } => Err(HoneypotError::MalformedInput),
        }
    }
}

/// Outcome of inspecting a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed<'a> {
    /// Fewer than [`HEADER_LEN`] bytes buffered
    Incomplete,
    /// Header present, payload still arriving
    Partial { sequence_id: u8 },
    /// A whole frame is available; `consumed` bytes belong to it
    Complete {
        sequence_id: u8,
        payload: &'a [u8],
        consumed: usize,
    },
}

impl Consumed<'_> {
    /// Sequence id, once the header has arrived
    pub fn sequence_id(&self) -> Option<u8> {
        match self {
            Consumed::Incomplete => None,
            Consumed::Partial { sequence_id } | Consumed::Complete { sequence_id, .. } => {
                Some(*sequence_id)
            }
        }
    }
}

/// Frame `payload` at `sequence_id`
///
/// Empty payloads and payloads wider than the length prefix are rejected.
pub fn encode(sequence_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload.len();
    if len == 0 {
        return Err(HoneypotError::EmptyPacket);
    }
    if len > MAX_PAYLOAD_LEN {
        return Err(HoneypotError::OversizedPacket(len));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + len);
    out.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
    out.push(sequence_id);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Payload length declared by a header
#[inline]
pub fn declared_len(header: &[u8]) -> usize {
    u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize
}

/// Inspect `buf` for one frame without consuming it
pub fn try_consume(buf: &[u8]) -> Consumed<'_> {
    if buf.len() < HEADER_LEN {
        return Consumed::Incomplete;
    }

    let len = declared_len(buf);
    let sequence_id = buf[3];
    if buf.len() < HEADER_LEN + len {
        return Consumed::Partial { sequence_id };
    }

    Consumed::Complete {
        sequence_id,
        payload: &buf[HEADER_LEN..HEADER_LEN + len],
        consumed: HEADER_LEN + len,
    }
}
