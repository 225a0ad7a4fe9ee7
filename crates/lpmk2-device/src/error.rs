use std::io;

use lpmk2_frame::FrameError;
use lpmk2_transport::{TransferStatus, TransportError};

use crate::descriptor::DeviceId;

// Platform codes for the abstract error kinds (Linux values, positive).
pub const EIO: i32 = 5;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EFAULT: i32 = 14;
pub const ENODEV: i32 = 19;
pub const EINVAL: i32 = 22;
pub const EPIPE: i32 = 32;
pub const ERESTARTSYS: i32 = 512;

/// Errors returned by read and write calls on an attached device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device was disconnected. Takes precedence over every other error.
    #[error("device disconnected")]
    DeviceGone,

    /// Non-blocking call could not make progress right now.
    #[error("operation would block")]
    WouldBlock,

    /// A suspended wait was interrupted; the call may be retried.
    #[error("wait interrupted")]
    Interrupted,

    /// The endpoint stalled during an earlier transfer.
    #[error("endpoint stalled")]
    StalledPipe,

    /// An earlier or current transfer failed.
    #[error("transfer I/O error: {0}")]
    Io(#[from] IoCause),

    /// The host ran out of transfer resources.
    #[error("out of transfer resources")]
    ResourceExhausted,

    /// The call was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Inbound data violated the packet framing.
    #[error("protocol fault: {0}")]
    ProtocolFault(#[from] FrameError),
}

/// What went wrong behind a [`DeviceError::Io`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoCause {
    /// A transfer completed with a failure status.
    #[error("transfer finished with {0:?}")]
    Transfer(TransferStatus),

    /// The transport refused to queue a transfer.
    #[error("submission refused: {0}")]
    Submit(#[from] TransportError),
}

/// Abstract kind of a [`DeviceError`], for callers mapping to their own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceGone,
    WouldBlock,
    Interrupted,
    StalledPipe,
    Io,
    ResourceExhausted,
    InvalidArgument,
    ProtocolFault,
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::DeviceGone => ErrorKind::DeviceGone,
            DeviceError::WouldBlock => ErrorKind::WouldBlock,
            DeviceError::Interrupted => ErrorKind::Interrupted,
            DeviceError::StalledPipe => ErrorKind::StalledPipe,
            DeviceError::Io(_) => ErrorKind::Io,
            DeviceError::ResourceExhausted => ErrorKind::ResourceExhausted,
            DeviceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DeviceError::ProtocolFault(_) => ErrorKind::ProtocolFault,
        }
    }

    /// Platform error code for this error.
    pub fn errno(&self) -> i32 {
        match self.kind() {
            ErrorKind::DeviceGone => ENODEV,
            ErrorKind::WouldBlock => EAGAIN,
            ErrorKind::Interrupted => ERESTARTSYS,
            ErrorKind::StalledPipe => EPIPE,
            ErrorKind::Io => EIO,
            ErrorKind::ResourceExhausted => ENOMEM,
            ErrorKind::InvalidArgument => EINVAL,
            ErrorKind::ProtocolFault => EFAULT,
        }
    }

    /// Whether repeating the same call can succeed.
    ///
    /// Framing faults are never retryable: the stream they came from is corrupt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::WouldBlock
                | ErrorKind::Interrupted
                | ErrorKind::StalledPipe
                | ErrorKind::Io
                | ErrorKind::ResourceExhausted
        )
    }

    /// Error surfaced for a sticky transfer failure.
    pub(crate) fn from_status(status: TransferStatus) -> Self {
        match status {
            TransferStatus::Stalled => DeviceError::StalledPipe,
            other => DeviceError::Io(IoCause::Transfer(other)),
        }
    }

    /// Error surfaced when the transport refuses a submission.
    pub(crate) fn from_submit(err: TransportError) -> Self {
        match err {
            TransportError::NoMemory => DeviceError::ResourceExhausted,
            other => DeviceError::Io(IoCause::Submit(other)),
        }
    }
}

impl From<DeviceError> for io::Error {
    fn from(err: DeviceError) -> Self {
        let kind = match err.kind() {
            ErrorKind::DeviceGone => io::ErrorKind::NotConnected,
            ErrorKind::WouldBlock => io::ErrorKind::WouldBlock,
            ErrorKind::Interrupted => io::ErrorKind::Interrupted,
            ErrorKind::StalledPipe => io::ErrorKind::BrokenPipe,
            ErrorKind::Io => io::ErrorKind::Other,
            ErrorKind::ResourceExhausted => io::ErrorKind::OutOfMemory,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::ProtocolFault => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

/// Errors raised while binding a device on attachment.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// The interface does not belong to a supported device.
    #[error("device {0} is not supported")]
    Unsupported(DeviceId),

    /// The interface lacks a bulk-in or bulk-out endpoint.
    #[error("could not find both bulk-in and bulk-out endpoints")]
    MissingEndpoints,

    /// The read buffer could not be allocated.
    #[error("cannot allocate {size}-byte read buffer")]
    BufferAllocation { size: usize },

    /// Every minor number is taken.
    #[error("no free minor number")]
    NoMinor,

    /// The device configuration is unusable.
    #[error("invalid device config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalled_status_keeps_its_own_kind() {
        assert_eq!(
            DeviceError::from_status(TransferStatus::Stalled).kind(),
            ErrorKind::StalledPipe
        );
        assert_eq!(
            DeviceError::from_status(TransferStatus::Failed(-71)).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            DeviceError::from_status(TransferStatus::Shutdown).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn submission_errors_map_to_kinds() {
        assert_eq!(
            DeviceError::from_submit(TransportError::NoMemory).kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            DeviceError::from_submit(TransportError::NoDevice).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            DeviceError::from_submit(TransportError::Failed(-32)).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn io_errors_keep_their_typed_cause() {
        let err = DeviceError::from_status(TransferStatus::Failed(-71));
        assert!(matches!(
            err,
            DeviceError::Io(IoCause::Transfer(TransferStatus::Failed(-71)))
        ));
        assert_eq!(err.to_string(), "transfer I/O error: transfer finished with Failed(-71)");

        let err = DeviceError::from_submit(TransportError::Busy(7));
        assert!(matches!(
            err,
            DeviceError::Io(IoCause::Submit(TransportError::Busy(7)))
        ));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(
            source.downcast_ref::<IoCause>(),
            Some(&IoCause::Submit(TransportError::Busy(7)))
        );
    }

    #[test]
    fn errno_codes() {
        assert_eq!(DeviceError::DeviceGone.errno(), ENODEV);
        assert_eq!(DeviceError::WouldBlock.errno(), EAGAIN);
        assert_eq!(DeviceError::Interrupted.errno(), ERESTARTSYS);
        assert_eq!(DeviceError::StalledPipe.errno(), EPIPE);
        assert_eq!(
            DeviceError::Io(IoCause::Transfer(TransferStatus::Failed(-71))).errno(),
            EIO
        );
        assert_eq!(DeviceError::ResourceExhausted.errno(), ENOMEM);
        assert_eq!(DeviceError::InvalidArgument("x").errno(), EINVAL);
        assert_eq!(
            DeviceError::ProtocolFault(FrameError::EmptyPayload).errno(),
            EFAULT
        );
    }

    #[test]
    fn io_error_kinds() {
        let err: io::Error = DeviceError::WouldBlock.into();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        let err: io::Error = DeviceError::DeviceGone.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let err: io::Error = DeviceError::ProtocolFault(FrameError::Truncated {
            offset: 0,
            len: 2,
        })
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn framing_faults_are_not_retryable() {
        let fault = DeviceError::ProtocolFault(FrameError::UnknownStatus {
            status: 0,
            offset: 0,
        });
        assert!(!fault.is_retryable());
        assert!(!DeviceError::DeviceGone.is_retryable());
        assert!(DeviceError::StalledPipe.is_retryable());
    }
}
