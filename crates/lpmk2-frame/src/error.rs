/// Errors that can occur during SysEx stuffing and destuffing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// There is nothing to stuff; a frame always carries at least one byte.
    #[error("cannot encode an empty payload")]
    EmptyPayload,

    /// The packet status nibble is not one of the known codes.
    #[error("unknown packet status {status:#04x} at offset {offset}")]
    UnknownStatus { status: u8, offset: usize },

    /// A packet runs past the end of the filled frame.
    #[error("truncated packet at offset {offset} (frame holds {len} bytes)")]
    Truncated { offset: usize, len: usize },
}

impl FrameError {
    /// Whether the error means the inbound data itself is inconsistent.
    pub fn is_framing_fault(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownStatus { .. } | FrameError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
