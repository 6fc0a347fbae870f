//! CAN Frame and Identifier Layout
//!
//! Defines the wire shape of a frame and the identifier convention the
//! controller boards use: bits [10:6] carry the device address, bits [5:0]
//! the message kind.

use serde::{Deserialize, Serialize};

/// Mask for the 11 meaningful identifier bits (standard frame format).
pub const ID_MASK: u16 = 0x7FF;

/// Physical maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 8;

/// Known device roles on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeviceAddress {
    /// Positioning table (0x02)
    Table = 0x02,
    /// Backlight power board (0x04)
    Power = 0x04,
    /// Solid-state laser (0x0F)
    LaserT = 0x0F,
}

impl DeviceAddress {
    /// Address value as carried in identifier bits [10:6].
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Look up a known device role by raw address. Unknown addresses are
    /// valid wire values; they simply belong to no device of this rig.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x02 => Some(DeviceAddress::Table),
            0x04 => Some(DeviceAddress::Power),
            0x0F => Some(DeviceAddress::LaserT),
            _ => None,
        }
    }
}

/// Per-device message sub-type, identifier bits [5:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Request-to-act addressed to a device. Outbound only; inbound copies
    /// are ignored.
    CommandWrite = 0x00,
    /// Asynchronous status broadcast from a device; payload carries flag bits.
    StatusWrite = 0x02,
    /// Zero-payload poll asking a device to broadcast its status.
    StatusRead = 0x03,
}

impl MessageKind {
    /// Kind value as carried in identifier bits [5:0].
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Look up a message kind by raw value.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(MessageKind::CommandWrite),
            0x02 => Some(MessageKind::StatusWrite),
            0x03 => Some(MessageKind::StatusRead),
            _ => None,
        }
    }
}

/// Split an identifier into its raw (device address, message kind) parts.
pub fn split_id(id: u16) -> (u8, u8) {
    let id = id & ID_MASK;
    ((id >> 6) as u8, (id & 0x3F) as u8)
}

/// Compose an identifier from a device address and message kind.
pub fn compose_id(device: DeviceAddress, kind: MessageKind) -> u16 {
    (device.as_raw() as u16) << 6 | kind.as_raw() as u16
}

/// One CAN message: identifier plus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Frame identifier (11 bits used).
    pub id: u16,
    /// Declared payload length.
    pub dlc: u8,
    /// Payload bytes; only the first `dlc` (clamped to 8) are meaningful.
    pub data: [u8; MAX_PAYLOAD],
}

impl CanFrame {
    /// Build a frame from an identifier and payload bytes. Payloads longer
    /// than the physical maximum are truncated.
    pub fn new(id: u16, payload: &[u8]) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        let len = payload.len().min(MAX_PAYLOAD);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id: id & ID_MASK,
            dlc: len as u8,
            data,
        }
    }

    /// Zero-payload poll asking `device` to broadcast its status.
    pub fn status_request(device: DeviceAddress) -> Self {
        Self::new(compose_id(device, MessageKind::StatusRead), &[])
    }

    /// Raw device address from identifier bits [10:6].
    pub fn device_address(&self) -> u8 {
        split_id(self.id).0
    }

    /// Raw message kind from identifier bits [5:0].
    pub fn message_kind(&self) -> u8 {
        split_id(self.id).1
    }

    /// Meaningful payload bytes. A declared length beyond the physical
    /// maximum is clamped, not rejected.
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.dlc as usize).min(MAX_PAYLOAD)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compose_known_pairs() {
        // LaserT = 0x0F, StatusWrite = 0x02 => 0b01111_000010
        assert_eq!(compose_id(DeviceAddress::LaserT, MessageKind::StatusWrite), 0x3C2);
        assert_eq!(compose_id(DeviceAddress::Table, MessageKind::StatusRead), 0x83);
        assert_eq!(compose_id(DeviceAddress::Power, MessageKind::CommandWrite), 0x100);
    }

    #[test]
    fn test_split_recovers_compose() {
        for device in [DeviceAddress::Table, DeviceAddress::Power, DeviceAddress::LaserT] {
            for kind in [
                MessageKind::CommandWrite,
                MessageKind::StatusWrite,
                MessageKind::StatusRead,
            ] {
                let id = compose_id(device, kind);
                let (addr, raw_kind) = split_id(id);
                assert_eq!(DeviceAddress::from_raw(addr), Some(device));
                assert_eq!(MessageKind::from_raw(raw_kind), Some(kind));
            }
        }
    }

    #[test]
    fn test_unknown_raw_values() {
        assert_eq!(DeviceAddress::from_raw(0x03), None);
        assert_eq!(DeviceAddress::from_raw(0x1F), None);
        assert_eq!(MessageKind::from_raw(0x01), None);
        assert_eq!(MessageKind::from_raw(0x3F), None);
    }

    #[test]
    fn test_frame_payload_clamps_declared_length() {
        let mut frame = CanFrame::new(0x3C2, &[0x03]);
        frame.dlc = 12;
        assert_eq!(frame.payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_status_request_shape() {
        let frame = CanFrame::status_request(DeviceAddress::LaserT);
        assert_eq!(frame.id, 0x3C3);
        assert_eq!(frame.dlc, 0);
        assert!(frame.payload().is_empty());
    }

    proptest! {
        #[test]
        fn identifier_round_trips(id in 0u16..0x800) {
            let (addr, kind) = split_id(id);
            prop_assert!(addr <= 0x1F);
            prop_assert!(kind <= 0x3F);
            prop_assert_eq!((addr as u16) << 6 | kind as u16, id);
        }
    }
}
