use crate::core::packet::{self, Consumed, Packet, HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::error::HoneypotError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Tokio codec for length-prefixed, sequence-numbered packets
///
/// Used for framed I/O where only whole packets matter: test and scanner
/// clients, and writers that send packets built elsewhere. The decoy state
/// machines read raw bytes instead because they react to a bad sequence id
/// before the payload has arrived.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = HoneypotError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = match packet::try_consume(src) {
            Consumed::Complete {
                sequence_id,
                consumed,
                ..
            } => Some((sequence_id, consumed)),
            Consumed::Incomplete | Consumed::Partial { .. } => None,
        };

        let Some((sequence_id, consumed)) = frame else {
            if src.len() >= HEADER_LEN {
                let needed = HEADER_LEN + packet::declared_len(src);
                src.reserve(needed.saturating_sub(src.len()));
            }
            return Ok(None);
        };

        let mut frame = src.split_to(consumed);
        frame.advance(HEADER_LEN);
        Ok(Some(Packet::new(sequence_id, frame.to_vec())))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = HoneypotError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload.len();
        if len == 0 {
            return Err(HoneypotError::EmptyPacket);
        }
        if len > MAX_PAYLOAD_LEN {
            return Err(HoneypotError::OversizedPacket(len));
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_uint_le(len as u64, 3);
        dst.put_u8(item.sequence_id);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
