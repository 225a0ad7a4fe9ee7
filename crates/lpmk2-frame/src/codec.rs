use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::status::{Status, DATAEND1, DATAEND2, DATAEND3, MOREDATA};

/// Payload bytes carried by a full packet.
pub const PACKET_PAYLOAD: usize = 3;

/// Wire size of one stuffed packet: status + 3 payload bytes.
pub const PACKET_SIZE: usize = 4;

/// Largest payload accepted per write: 6 header + 5 * 80 + 1 footer, the size
/// of the device's biggest SysEx message.
pub const MAX_PAYLOAD: usize = 407;

// Every packet is padded to full width, so round up before dividing.
const SIZE_ROUND_UP: usize = PACKET_PAYLOAD - 1;

/// Result of one decode step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Payload bytes written to the output.
    pub produced: usize,
    /// Frame bytes fully consumed; always a multiple of [`PACKET_SIZE`].
    pub consumed: usize,
}

/// Size of the stuffed frame wrapping a payload of `payload_len` bytes.
pub fn stuffed_size(payload_len: usize) -> usize {
    (payload_len + SIZE_ROUND_UP) / PACKET_PAYLOAD * PACKET_SIZE
}

/// Stuff a payload into SysEx packets, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────┐   ┌──────────┬──────────────┐
/// │ MOREDATA │ b0 b1 b2     │ … │ DATAENDn │ n bytes + 0s │
/// └──────────┴──────────────┘   └──────────┴──────────────┘
/// ```
/// A payload that is a multiple of three ends on its last full packet, whose
/// status becomes DATAEND3; no empty trailing packet is emitted.
pub fn encode(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    dst.reserve(stuffed_size(payload.len()));

    let mut groups = payload.chunks_exact(PACKET_PAYLOAD);
    for group in &mut groups {
        dst.put_u8(MOREDATA);
        dst.put_slice(group);
    }

    match groups.remainder() {
        [] => {
            let last = dst.len() - PACKET_SIZE;
            dst[last] = DATAEND3;
        }
        [b0] => dst.put_slice(&[DATAEND1, *b0, 0, 0]),
        [b0, b1, ..] => dst.put_slice(&[DATAEND2, *b0, *b1, 0]),
    }
    Ok(())
}

/// Stuff a payload into a freshly allocated frame of exactly
/// `stuffed_size(payload.len())` bytes.
pub fn encode_to_bytes(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(stuffed_size(payload.len()));
    encode(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Destuff packets from `frame` into `out`.
///
/// Stops before the first packet whose payload does not fit in the remaining
/// output, leaving it unconsumed so decoding can resume there. Fails when a
/// status is unknown or a packet runs past the end of `frame`.
pub fn decode(frame: &[u8], out: &mut [u8]) -> Result<Decoded> {
    let mut step = Decoded::default();

    while step.consumed < frame.len() {
        let offset = step.consumed;
        let status_byte = frame[offset];
        let status = Status::from_byte(status_byte).ok_or(FrameError::UnknownStatus {
            status: status_byte,
            offset,
        })?;
        let width = status.payload_width();

        if out.len() - step.produced < width {
            break;
        }

        let packet = frame
            .get(offset..offset + PACKET_SIZE)
            .ok_or(FrameError::Truncated {
                offset,
                len: frame.len(),
            })?;

        out[step.produced..step.produced + width].copy_from_slice(&packet[1..1 + width]);
        step.produced += width;
        step.consumed += PACKET_SIZE;
    }

    Ok(step)
}

/// Destuff up to `max_out` payload bytes from `frame` into a new buffer.
pub fn decode_to_bytes(frame: &[u8], max_out: usize) -> Result<Bytes> {
    let mut out = vec![0u8; max_out];
    let step = decode(frame, &mut out)?;
    out.truncate(step.produced);
    Ok(Bytes::from(out))
}
