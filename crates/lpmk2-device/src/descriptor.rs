//! USB identity and endpoint descriptors of an attached interface.

use std::fmt;

use lpmk2_transport::Direction;
use serde::Deserialize;

/// Novation vendor id.
pub const MK2_VENDOR_ID: u16 = 0x1235;
/// Launchpad MK2 product id.
pub const MK2_PRODUCT_ID: u16 = 0x0069;

/// Vendor/product pair identifying a USB device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

impl DeviceId {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// Devices this adapter binds to.
pub const MK2_ID_TABLE: &[DeviceId] = &[DeviceId::new(MK2_VENDOR_ID, MK2_PRODUCT_ID)];

/// Returns true if `id` is listed in `table`.
pub fn matches(table: &[DeviceId], id: DeviceId) -> bool {
    table.contains(&id)
}

/// Transfer type of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// One endpoint of the active interface setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint address; bit 7 set means IN.
    pub address: u8,
    pub kind: EndpointKind,
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    pub fn direction(&self) -> Direction {
        Direction::of_address(self.address)
    }

    fn is_bulk(&self, direction: Direction) -> bool {
        self.kind == EndpointKind::Bulk && self.direction() == direction
    }
}

/// Interface handed over by the host when a device is plugged in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.vendor_id, self.product_id)
    }

    /// A Launchpad MK2 interface with the usual bulk endpoint pair.
    pub fn mk2(max_packet_size: u16) -> Self {
        Self {
            vendor_id: MK2_VENDOR_ID,
            product_id: MK2_PRODUCT_ID,
            endpoints: vec![
                EndpointDescriptor {
                    address: 0x81,
                    kind: EndpointKind::Bulk,
                    max_packet_size,
                },
                EndpointDescriptor {
                    address: 0x02,
                    kind: EndpointKind::Bulk,
                    max_packet_size,
                },
            ],
        }
    }
}

/// First bulk-in and first bulk-out endpoint of the interface.
pub fn find_bulk_endpoints(
    interface: &InterfaceDescriptor,
) -> Option<(EndpointDescriptor, EndpointDescriptor)> {
    let bulk_in = interface
        .endpoints
        .iter()
        .find(|ep| ep.is_bulk(Direction::In))?;
    let bulk_out = interface
        .endpoints
        .iter()
        .find(|ep| ep.is_bulk(Direction::Out))?;
    Some((*bulk_in, *bulk_out))
}
