//! Status Flag Decoding
//!
//! StatusWrite payloads carry a bit-packed flag vector. Bits are numbered
//! least-significant-first within each byte (bit 0 is `byte[0] & 0x01`),
//! the one convention every board on this bus follows.

use serde::{Deserialize, Serialize};

/// Read one bit out of a payload. Bits past the end of the buffer read as
/// zero, so short payloads decode without failing.
pub fn payload_bit(payload: &[u8], bit: usize) -> bool {
    payload
        .get(bit / 8)
        .map_or(false, |byte| byte >> (bit % 8) & 1 == 1)
}

/// Flags a board reports in its StatusWrite payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Bit 0: the board is switched on.
    pub on: bool,
    /// Bit 1: studio mode is engaged.
    pub studio: bool,
}

impl DeviceStatus {
    /// Decode from the first status byte. Missing bits read as false.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self {
            on: payload_bit(payload, 0),
            studio: payload_bit(payload, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_flags_set() {
        let status = DeviceStatus::from_payload(&[0b0000_0011]);
        assert!(status.on);
        assert!(status.studio);
    }

    #[test]
    fn test_no_flags_set() {
        let status = DeviceStatus::from_payload(&[0b0000_0000]);
        assert!(!status.on);
        assert!(!status.studio);
    }

    #[test]
    fn test_studio_without_on() {
        let status = DeviceStatus::from_payload(&[0b0000_0010]);
        assert!(!status.on);
        assert!(status.studio);
    }

    #[test]
    fn test_empty_payload_decodes_all_false() {
        let status = DeviceStatus::from_payload(&[]);
        assert_eq!(status, DeviceStatus::default());
    }

    #[test]
    fn test_only_first_byte_matters() {
        // Flag bits live in byte 0; trailing bytes carry other fields.
        let status = DeviceStatus::from_payload(&[0x01, 0xFF, 0xFF, 0xFF]);
        assert!(status.on);
        assert!(!status.studio);
    }

    #[test]
    fn test_bit_helper_crosses_byte_boundary() {
        let payload = [0x00, 0x01];
        assert!(payload_bit(&payload, 8));
        assert!(!payload_bit(&payload, 9));
        assert!(!payload_bit(&payload, 16));
    }
}
