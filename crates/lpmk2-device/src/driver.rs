//! Registry of attached devices, keyed by minor number.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lpmk2_transport::Transport;
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::descriptor::{matches, InterfaceDescriptor, MK2_ID_TABLE};
use crate::device::{Device, DeviceHandle};
use crate::error::{AttachError, DeviceError, Result};

/// First minor number handed out.
pub const MINOR_BASE: u32 = 8;

/// Number of minors available after [`MINOR_BASE`].
pub const MAX_MINORS: u32 = 16;

/// Device node name for a minor number.
pub fn node_name(minor: u32) -> String {
    format!("mk2-{minor}")
}

pub struct Driver {
    config: DeviceConfig,
    devices: Mutex<BTreeMap<u32, Arc<Device>>>,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            config: DeviceConfig::default(),
            devices: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver whose devices all use `config`.
    pub fn with_config(config: DeviceConfig) -> std::result::Result<Self, AttachError> {
        config.validate()?;
        Ok(Self {
            config,
            devices: Mutex::new(BTreeMap::new()),
        })
    }

    fn devices(&self) -> MutexGuard<'_, BTreeMap<u32, Arc<Device>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a newly plugged interface and register it under the lowest free
    /// minor number.
    pub fn attach(
        &self,
        interface: &InterfaceDescriptor,
        transport: Arc<dyn Transport>,
    ) -> std::result::Result<u32, AttachError> {
        let id = interface.device_id();
        if !matches(MK2_ID_TABLE, id) {
            debug!(%id, "interface not claimed");
            return Err(AttachError::Unsupported(id));
        }

        let mut devices = self.devices();
        let minor = (MINOR_BASE..MINOR_BASE + MAX_MINORS)
            .find(|minor| !devices.contains_key(minor))
            .ok_or(AttachError::NoMinor)?;

        let device = Device::new(node_name(minor), interface, transport, self.config.clone())?;
        devices.insert(minor, device);
        info!(%id, "launchpad mk2 now attached to {}", node_name(minor));
        Ok(minor)
    }

    /// Open a handle on the device registered under `minor`.
    pub fn open(&self, minor: u32) -> Result<DeviceHandle> {
        let device = self
            .devices()
            .get(&minor)
            .cloned()
            .ok_or(DeviceError::DeviceGone)?;
        device.open()
    }

    /// Unregister `minor` and tear its device down. Open handles keep the
    /// device alive but every call on them fails with `DeviceGone`.
    ///
    /// Returns false when nothing was attached under `minor`.
    pub fn detach(&self, minor: u32) -> bool {
        let Some(device) = self.devices().remove(&minor) else {
            return false;
        };
        device.disconnect();
        info!("{} now disconnected", node_name(minor));
        true
    }

    /// Minor numbers currently attached, ascending.
    pub fn attached(&self) -> Vec<u32> {
        self.devices().keys().copied().collect()
    }

    pub fn device(&self, minor: u32) -> Option<Arc<Device>> {
        self.devices().get(&minor).cloned()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        let devices = std::mem::take(&mut *self.devices());
        for device in devices.into_values() {
            device.disconnect();
        }
    }
}
