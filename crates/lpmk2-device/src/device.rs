//! Device lifecycle and the per-open caller handle.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lpmk2_transport::{TransferId, Transport};
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::descriptor::{find_bulk_endpoints, InterfaceDescriptor};
use crate::error::{AttachError, DeviceError, Result};
use crate::interrupt::{Interrupt, IoContext};
use crate::read::{ReadBuffer, ReadChannel};
use crate::write::WriteChannel;

/// Source of transfer ids, shared by both channels of a device.
#[derive(Debug, Default)]
pub(crate) struct TransferIds(AtomicU64);

impl TransferIds {
    pub(crate) fn next(&self) -> TransferId {
        TransferId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// One attached Launchpad MK2.
///
/// Shared through `Arc` by the driver registry and every open handle; the
/// last holder to drop it releases the read buffer.
pub struct Device {
    name: String,
    config: DeviceConfig,
    read: ReadChannel,
    write: WriteChannel,
    disconnected: AtomicBool,
}

impl Device {
    /// Bind a device to the bulk endpoints of `interface`.
    pub fn new(
        name: impl Into<String>,
        interface: &InterfaceDescriptor,
        transport: Arc<dyn Transport>,
        config: DeviceConfig,
    ) -> std::result::Result<Arc<Self>, AttachError> {
        config.validate()?;
        let (bulk_in, bulk_out) =
            find_bulk_endpoints(interface).ok_or(AttachError::MissingEndpoints)?;

        let size = usize::from(bulk_in.max_packet_size);
        if size == 0 {
            return Err(AttachError::BufferAllocation { size });
        }
        let buffer =
            ReadBuffer::with_capacity(size).map_err(|_| AttachError::BufferAllocation { size })?;

        let name = name.into();
        debug!(
            device = %name,
            bulk_in = bulk_in.address,
            bulk_out = bulk_out.address,
            buffer = size,
            transport = transport.transport_name(),
            "binding endpoints"
        );

        let ids = Arc::new(TransferIds::default());
        let read = ReadChannel::new(
            bulk_in.address,
            buffer,
            Arc::clone(&transport),
            Arc::clone(&ids),
        );
        let write = WriteChannel::new(
            bulk_out.address,
            config.writes_in_flight,
            config.max_out_len,
            transport,
            ids,
        );

        Ok(Arc::new(Self {
            name,
            config,
            read,
            write,
            disconnected: AtomicBool::new(false),
        }))
    }

    /// Open a new caller handle, blocking and uninterrupted by default.
    pub fn open(self: &Arc<Self>) -> Result<DeviceHandle> {
        if self.is_disconnected() {
            return Err(DeviceError::DeviceGone);
        }
        debug!(device = %self.name, "opened");
        Ok(DeviceHandle {
            device: Arc::clone(self),
            nonblocking: AtomicBool::new(false),
            interrupt: Interrupt::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn bulk_in_endpoint(&self) -> u8 {
        self.read.endpoint()
    }

    pub fn bulk_out_endpoint(&self) -> u8 {
        self.write.endpoint()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Number of OUT transfers submitted and not yet completed.
    pub fn writes_in_flight(&self) -> usize {
        self.write.in_flight()
    }

    /// Admission slots currently free for new writes.
    pub fn free_write_slots(&self) -> usize {
        self.write.free_slots()
    }

    /// Tear the device down: fail every blocked and future call with
    /// [`DeviceError::DeviceGone`], then cancel all transfers and wait until
    /// their completions have run. Calling it again does nothing.
    pub fn disconnect(&self) {
        {
            let mut read = self.read.lock_state();
            let mut write = self.write.lock_io();
            if read.disconnected && *write {
                return;
            }
            read.disconnected = true;
            *write = true;
            self.disconnected.store(true, Ordering::SeqCst);
        }

        self.write.close_gate();
        self.read.kill();
        self.write.kill_all();
        info!(device = %self.name, "disconnected");
    }

}

impl Drop for Device {
    fn drop(&mut self) {
        debug!(device = %self.name, "releasing device resources");
    }
}

/// One open instance of a device.
///
/// Handles are independent: each carries its own non-blocking flag and
/// interrupt token, and any number of them may be used concurrently.
pub struct DeviceHandle {
    device: Arc<Device>,
    nonblocking: AtomicBool,
    interrupt: Interrupt,
}

impl DeviceHandle {
    /// Read destuffed bytes from the device into `buf`.
    ///
    /// `buf` must hold at least one packet payload (3 bytes).
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let cx = IoContext::new(self.is_nonblocking(), &self.interrupt);
        self.device.read.read(buf, &cx)
    }

    /// Send `payload` as one stuffed frame.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        let cx = IoContext::new(self.is_nonblocking(), &self.interrupt);
        self.device.write.write(payload, &cx)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::SeqCst);
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::SeqCst)
    }

    /// Token that interrupts this handle's suspended calls from another thread.
    pub fn interrupter(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl io::Read for DeviceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DeviceHandle::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for DeviceHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DeviceHandle::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use lpmk2_frame::encode_to_bytes;
    use lpmk2_transport::SimTransport;

    use super::*;
    use crate::descriptor::{EndpointDescriptor, EndpointKind};

    fn attach(config: DeviceConfig) -> (Arc<SimTransport>, Arc<Device>) {
        let sim = Arc::new(SimTransport::new());
        let transport: Arc<dyn Transport> = sim.clone();
        let device = Device::new("mk2-8", &InterfaceDescriptor::mk2(64), transport, config).unwrap();
        (sim, device)
    }

    #[test]
    fn transfer_ids_are_unique() {
        let ids = TransferIds::default();
        assert_eq!(ids.next(), TransferId(1));
        assert_eq!(ids.next(), TransferId(2));
    }

    #[test]
    fn binds_mk2_endpoints() {
        let (_sim, device) = attach(DeviceConfig::default());
        assert_eq!(device.bulk_in_endpoint(), 0x81);
        assert_eq!(device.bulk_out_endpoint(), 0x02);
        assert_eq!(device.name(), "mk2-8");
    }

    #[test]
    fn rejects_interface_without_bulk_out() {
        let sim: Arc<dyn Transport> = Arc::new(SimTransport::new());
        let interface = InterfaceDescriptor {
            vendor_id: 0x1235,
            product_id: 0x0069,
            endpoints: vec![EndpointDescriptor {
                address: 0x81,
                kind: EndpointKind::Bulk,
                max_packet_size: 64,
            }],
        };
        assert!(matches!(
            Device::new("mk2-8", &interface, sim, DeviceConfig::default()),
            Err(AttachError::MissingEndpoints)
        ));
    }

    #[test]
    fn rejects_zero_sized_bulk_in() {
        let sim: Arc<dyn Transport> = Arc::new(SimTransport::new());
        assert!(matches!(
            Device::new("mk2-8", &InterfaceDescriptor::mk2(0), sim, DeviceConfig::default()),
            Err(AttachError::BufferAllocation { size: 0 })
        ));
    }

    #[test]
    fn handle_round_trip() {
        let (sim, device) = attach(DeviceConfig::default());
        let handle = device.open().unwrap();

        assert_eq!(handle.write(b"\xb0\x68\x3c").unwrap(), 3);
        sim.push_inbound(encode_to_bytes(b"\x90\x0b\x7f").unwrap());

        let mut buf = [0u8; 16];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\x90\x0b\x7f");
    }

    #[test]
    fn disconnect_fails_later_calls_without_transport() {
        let (sim, device) = attach(DeviceConfig::default());
        let handle = device.open().unwrap();
        device.disconnect();
        device.disconnect();

        let mut buf = [0u8; 8];
        assert!(matches!(handle.read(&mut buf), Err(DeviceError::DeviceGone)));
        assert!(matches!(handle.write(b"abc"), Err(DeviceError::DeviceGone)));
        assert!(matches!(device.open(), Err(DeviceError::DeviceGone)));
        assert_eq!(sim.in_submissions(), 0);
        assert_eq!(sim.out_submissions(), 0);
        assert!(device.is_disconnected());
    }

    #[test]
    fn disconnect_releases_blocked_callers() {
        let config = DeviceConfig {
            writes_in_flight: 1,
            ..DeviceConfig::default()
        };
        let (sim, device) = attach(config);
        sim.hold_writes(true);
        let handle = Arc::new(device.open().unwrap());
        handle.write(b"held").unwrap();

        let reader = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                handle.read(&mut buf)
            })
        };
        let writer = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || handle.write(b"blocked"))
        };

        thread::sleep(Duration::from_millis(30));
        device.disconnect();

        assert!(matches!(reader.join().unwrap(), Err(DeviceError::DeviceGone)));
        assert!(matches!(writer.join().unwrap(), Err(DeviceError::DeviceGone)));
        assert_eq!(device.writes_in_flight(), 0);
        assert!(!sim.has_pending_read());
        assert_eq!(sim.pending_writes(), 0);
    }

    #[test]
    fn interrupter_releases_blocked_read() {
        let (_sim, device) = attach(DeviceConfig::default());
        let handle = Arc::new(device.open().unwrap());
        let interrupt = handle.interrupter();

        let reader = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                handle.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(20));
        interrupt.raise();

        let err = reader.join().unwrap().unwrap_err();
        assert!(matches!(err, DeviceError::Interrupted));
        assert_eq!(err.errno(), crate::error::ERESTARTSYS);
    }

    #[test]
    fn interrupt_does_not_outlive_a_call_that_never_waited() {
        let (sim, device) = attach(DeviceConfig::default());
        let handle = device.open().unwrap();
        handle.interrupter().raise();

        sim.push_inbound(encode_to_bytes(b"abc").unwrap());
        let mut buf = [0u8; 3];
        assert_eq!(handle.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");

        let feeder = {
            let sim = Arc::clone(&sim);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                sim.push_inbound(encode_to_bytes(b"def").unwrap());
            })
        };
        assert_eq!(handle.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"def");
        feeder.join().unwrap();
    }

    #[test]
    fn nonblocking_handle_maps_to_io_would_block() {
        let (_sim, device) = attach(DeviceConfig::default());
        let mut handle = device.open().unwrap();
        handle.set_nonblocking(true);
        assert!(handle.is_nonblocking());

        let mut buf = [0u8; 8];
        let err = io::Read::read(&mut handle, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn io_write_reports_full_length() {
        let (sim, device) = attach(DeviceConfig::default());
        let mut handle = device.open().unwrap();

        io::Write::write_all(&mut handle, b"\x90\x51\x7f\x90\x52\x7f").unwrap();
        io::Write::flush(&mut handle).unwrap();
        assert_eq!(sim.out_submissions(), 1);
    }
}
