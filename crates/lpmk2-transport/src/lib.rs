//! Host-side USB bulk transfer abstraction.
//!
//! This is the lowest layer of lpmk2. The adapter never moves bytes itself: it
//! hands transfers to a [`Transport`] and reacts to their completions. The
//! real host stack lives behind this trait; [`SimTransport`] (feature `sim`)
//! stands in for the device in tests and demos.

pub mod error;
pub mod traits;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::{Result, TransportError};
pub use traits::{Completion, Direction, Transfer, TransferId, TransferStatus, Transport};

#[cfg(any(test, feature = "sim"))]
pub use sim::SimTransport;
