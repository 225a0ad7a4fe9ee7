//! Packet status codes.
//!
//! Only the low nibble of a packet's first byte selects the status; the high
//! nibble carries the USB-MIDI cable number and is ignored.

/// More packets follow; three payload bytes.
pub const MOREDATA: u8 = 0x04;
/// Last packet; one payload byte.
pub const DATAEND1: u8 = 0x05;
/// Last packet; two payload bytes.
pub const DATAEND2: u8 = 0x06;
/// Last packet; three payload bytes.
pub const DATAEND3: u8 = 0x07;
/// Button message from the grid; three payload bytes.
pub const BUTTON: u8 = 0x09;
/// Side-button message; three payload bytes.
pub const SBUTTON: u8 = 0x0b;

/// Mask selecting the status code from a packet's first byte.
pub const STATUS_MASK: u8 = 0x0f;

/// Decoded packet status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    MoreData,
    DataEnd1,
    DataEnd2,
    DataEnd3,
    Button,
    SideButton,
}

impl Status {
    /// Parse the status from a packet's first byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte & STATUS_MASK {
            MOREDATA => Some(Status::MoreData),
            DATAEND1 => Some(Status::DataEnd1),
            DATAEND2 => Some(Status::DataEnd2),
            DATAEND3 => Some(Status::DataEnd3),
            BUTTON => Some(Status::Button),
            SBUTTON => Some(Status::SideButton),
            _ => None,
        }
    }

    /// Number of meaningful bytes following the status byte.
    pub fn payload_width(self) -> usize {
        match self {
            Status::MoreData | Status::Button | Status::SideButton | Status::DataEnd3 => 3,
            Status::DataEnd1 => 1,
            Status::DataEnd2 => 2,
        }
    }

    /// Wire value of the status.
    pub fn as_byte(self) -> u8 {
        match self {
            Status::MoreData => MOREDATA,
            Status::DataEnd1 => DATAEND1,
            Status::DataEnd2 => DATAEND2,
            Status::DataEnd3 => DATAEND3,
            Status::Button => BUTTON,
            Status::SideButton => SBUTTON,
        }
    }

    pub fn name(self) -> &'static str {
        status_name(self.as_byte())
    }

    /// Whether the packet terminates a stuffed frame.
    pub fn is_end(self) -> bool {
        matches!(self, Status::DataEnd1 | Status::DataEnd2 | Status::DataEnd3)
    }
}

/// Returns a human-readable name for a status byte.
pub fn status_name(byte: u8) -> &'static str {
    match byte & STATUS_MASK {
        MOREDATA => "MOREDATA",
        DATAEND1 => "DATAEND1",
        DATAEND2 => "DATAEND2",
        DATAEND3 => "DATAEND3",
        BUTTON => "BUTTON",
        SBUTTON => "SBUTTON",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_status_table() {
        assert_eq!(Status::MoreData.payload_width(), 3);
        assert_eq!(Status::Button.payload_width(), 3);
        assert_eq!(Status::SideButton.payload_width(), 3);
        assert_eq!(Status::DataEnd1.payload_width(), 1);
        assert_eq!(Status::DataEnd2.payload_width(), 2);
        assert_eq!(Status::DataEnd3.payload_width(), 3);
    }

    #[test]
    fn cable_nibble_is_ignored() {
        assert_eq!(Status::from_byte(0x19), Some(Status::Button));
        assert_eq!(Status::from_byte(0xF4), Some(Status::MoreData));
        assert_eq!(status_name(0x2b), "SBUTTON");
    }

    #[test]
    fn unknown_codes_rejected() {
        for byte in [0x00, 0x01, 0x02, 0x03, 0x08, 0x0a, 0x0c, 0x0f] {
            assert_eq!(Status::from_byte(byte), None, "byte {byte:#04x}");
            assert_eq!(status_name(byte), "UNKNOWN");
        }
    }

    #[test]
    fn byte_roundtrip() {
        for status in [
            Status::MoreData,
            Status::DataEnd1,
            Status::DataEnd2,
            Status::DataEnd3,
            Status::Button,
            Status::SideButton,
        ] {
            assert_eq!(Status::from_byte(status.as_byte()), Some(status));
        }
        assert!(Status::DataEnd3.is_end());
        assert_eq!(Status::SideButton.name(), "SBUTTON");
        assert!(!Status::Button.is_end());
    }
}
