/// Errors a transport can report when a transfer cannot be submitted.
///
/// Failures of a transfer that was accepted are not errors at this level; they
/// arrive through the completion as a [`TransferStatus`](crate::TransferStatus).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The host could not allocate resources for the transfer.
    #[error("out of memory while submitting transfer")]
    NoMemory,

    /// The device behind the endpoint is gone.
    #[error("no such device")]
    NoDevice,

    /// The endpoint is halted and must be cleared before new submissions.
    #[error("endpoint {endpoint:#04x} stalled")]
    Stalled { endpoint: u8 },

    /// A transfer with this id is already in flight.
    #[error("transfer {0} already submitted")]
    Busy(u64),

    /// Any other submission failure, carrying the host's raw status code.
    #[error("submission failed with status {0}")]
    Failed(i32),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
