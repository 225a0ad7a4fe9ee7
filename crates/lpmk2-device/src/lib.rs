//! Launchpad MK2 device adapter.
//!
//! Exposes an attached MK2 as a byte stream. Writes are stuffed into SysEx
//! packets and queued as bulk OUT transfers, with at most
//! `writes_in_flight` outstanding. Reads keep one bulk IN transfer running
//! and hand out destuffed bytes, letting callers drain a transfer across
//! several short reads.
//!
//! Disconnect tears everything down: blocked callers wake with
//! [`DeviceError::DeviceGone`] and all transfers are cancelled and reaped
//! before [`Device::disconnect`] returns.

mod anchor;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod driver;
pub mod error;
mod gate;
pub mod interrupt;
mod read;
mod write;

pub use config::{DeviceConfig, DEFAULT_WRITES_IN_FLIGHT};
pub use descriptor::{
    find_bulk_endpoints, matches, DeviceId, EndpointDescriptor, EndpointKind,
    InterfaceDescriptor, MK2_ID_TABLE, MK2_PRODUCT_ID, MK2_VENDOR_ID,
};
pub use device::{Device, DeviceHandle};
pub use driver::{node_name, Driver, MAX_MINORS, MINOR_BASE};
pub use error::{AttachError, DeviceError, ErrorKind, IoCause, Result};
pub use interrupt::Interrupt;
