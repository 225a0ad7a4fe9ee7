use std::fmt;

use bytes::Bytes;

use crate::error::Result;

/// Identifier chosen by the submitter for one transfer.
///
/// Ids are unique per transport for as long as the transfer is in flight; the
/// same id is used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction of a bulk endpoint, taken from bit 7 of its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

impl Direction {
    /// Direction encoded in a USB endpoint address.
    pub fn of_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Final status of a transfer, delivered once through its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer finished; `Transfer::data` holds what moved.
    Completed,
    /// The transfer was killed by `Transport::cancel`.
    Cancelled,
    /// The transfer was unlinked because the connection was reset.
    Reset,
    /// The host controller or device is shutting down.
    Shutdown,
    /// The endpoint stalled.
    Stalled,
    /// Any other failure, carrying the host's raw status code.
    Failed(i32),
}

impl TransferStatus {
    /// Whether the transfer moved data successfully.
    pub fn is_ok(self) -> bool {
        matches!(self, TransferStatus::Completed)
    }

    /// Statuses produced by normal teardown rather than a device or bus fault.
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            TransferStatus::Cancelled | TransferStatus::Reset | TransferStatus::Shutdown
        )
    }
}

/// A finished transfer as seen by its completion.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: TransferId,
    pub status: TransferStatus,
    /// Bytes received for IN transfers; empty for OUT transfers.
    pub data: Bytes,
}

impl Transfer {
    /// Number of bytes the transfer actually moved.
    pub fn actual_length(&self) -> usize {
        self.data.len()
    }
}

/// Callback run exactly once when a submitted transfer finishes.
///
/// It may run on any thread, including inline from `submit_in`/`submit_out`,
/// so the submitter must not hold locks the callback takes.
pub type Completion = Box<dyn FnOnce(Transfer) + Send + 'static>;

/// Asynchronous bulk transfer primitive of the host.
///
/// A successful `submit_*` call guarantees exactly one invocation of the
/// completion, including for cancelled transfers. A failed submission never
/// invokes it.
pub trait Transport: Send + Sync {
    /// Queue a bulk IN transfer of up to `capacity` bytes on `endpoint`.
    fn submit_in(
        &self,
        id: TransferId,
        endpoint: u8,
        capacity: usize,
        completion: Completion,
    ) -> Result<()>;

    /// Queue a bulk OUT transfer of `data` on `endpoint`.
    fn submit_out(
        &self,
        id: TransferId,
        endpoint: u8,
        data: Bytes,
        completion: Completion,
    ) -> Result<()>;

    /// Request cancellation of an in-flight transfer.
    ///
    /// Unknown or already finished ids are ignored. The completion of a
    /// cancelled transfer still runs, with [`TransferStatus::Cancelled`].
    fn cancel(&self, id: TransferId);

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "usb-bulk"
    }
}
