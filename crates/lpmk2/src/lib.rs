//! Byte-stream adapter for the Novation Launchpad MK2.
//!
//! The MK2 speaks SysEx over a pair of USB bulk endpoints, packed into
//! 4-byte packets. lpmk2 hides the packing and the transfer plumbing: an
//! attached device reads and writes plain bytes.
//!
//! # Crate Structure
//!
//! - [`transport`]: asynchronous bulk transfer abstraction and simulator
//! - [`frame`]: SysEx packet stuffing codec
//! - [`device`]: read/write channels, lifecycle and driver registry
//! - [`logging`]: subscriber setup for hosts (behind `logging` feature)

/// Re-export transport types.
pub mod transport {
    pub use lpmk2_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lpmk2_frame::*;
}

/// Re-export device types.
pub mod device {
    pub use lpmk2_device::*;
}

#[cfg(feature = "logging")]
pub mod logging;

pub use lpmk2_device::{Device, DeviceConfig, DeviceError, DeviceHandle, Driver, Interrupt};
