//! SysEx byte stuffing for the Launchpad MK2 bulk endpoints.
//!
//! Arbitrary payloads travel in fixed 4-byte packets:
//! - 1 status byte (continuation, end-of-data with 1-3 bytes, or button event)
//! - 3 payload bytes, zero padded when the status declares fewer
//!
//! Encoding and size arithmetic are exact; decoding is resumable and never
//! reads past the filled part of a buffer.

pub mod codec;
pub mod dump;
pub mod error;
pub mod status;

pub use codec::{
    decode, decode_to_bytes, encode, encode_to_bytes, stuffed_size, Decoded, MAX_PAYLOAD,
    PACKET_PAYLOAD, PACKET_SIZE,
};
pub use dump::HexDump;
pub use error::{FrameError, Result};
pub use status::{status_name, Status, BUTTON, DATAEND1, DATAEND2, DATAEND3, MOREDATA, SBUTTON};
