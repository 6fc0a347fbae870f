//! Message Routing
//!
//! Maps a frame's device address to the decoder registered for it. A table
//! miss is not an error: addresses outside this rig's device set are
//! expected on the bus and their frames are dropped.

use std::collections::HashMap;

use tracing::trace;

use crate::frame::{split_id, CanFrame, DeviceAddress, MessageKind};
use crate::status::DeviceStatus;

/// Decoder for one device's StatusWrite payload.
pub type StatusDecoder = fn(&[u8]) -> DeviceStatus;

/// What routing a single frame produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A StatusWrite decoded by the device's registered decoder.
    Status {
        device: DeviceAddress,
        status: DeviceStatus,
    },
    /// A kind this side never acts on inbound (a command, or an echo of our
    /// own status poll).
    Ignored {
        device: DeviceAddress,
        kind: MessageKind,
    },
    /// Routed device, but the kind bits match no known message kind.
    UnknownKind { device: DeviceAddress, raw: u8 },
    /// No decoder registered for this address; the frame is dropped.
    Unrouted { address: u8 },
}

/// Address-to-decoder table.
pub struct MessageRouter {
    decoders: HashMap<DeviceAddress, StatusDecoder>,
}

impl MessageRouter {
    /// Empty table; every frame routes to [`RouteOutcome::Unrouted`].
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Table with the decoders deployed on this rig: the positioning table
    /// and the laser. Power is a known address without a status decoder.
    pub fn with_known_devices() -> Self {
        let mut router = Self::new();
        router.register(DeviceAddress::Table, DeviceStatus::from_payload);
        router.register(DeviceAddress::LaserT, DeviceStatus::from_payload);
        router
    }

    /// Register (or replace) the decoder for a device.
    pub fn register(&mut self, device: DeviceAddress, decoder: StatusDecoder) {
        self.decoders.insert(device, decoder);
    }

    /// Devices with a registered decoder, ordered by raw address so callers
    /// get reproducible transmit batches.
    pub fn routed_devices(&self) -> Vec<DeviceAddress> {
        let mut devices: Vec<_> = self.decoders.keys().copied().collect();
        devices.sort();
        devices
    }

    /// Route one frame: extract the device address, find its decoder, let
    /// the decoder interpret the message kind.
    pub fn route(&self, frame: &CanFrame) -> RouteOutcome {
        let (addr_raw, kind_raw) = split_id(frame.id);

        let device = match DeviceAddress::from_raw(addr_raw) {
            Some(device) if self.decoders.contains_key(&device) => device,
            _ => {
                trace!("no decoder for address {:#04x}, frame dropped", addr_raw);
                return RouteOutcome::Unrouted { address: addr_raw };
            }
        };

        match MessageKind::from_raw(kind_raw) {
            Some(MessageKind::StatusWrite) => {
                let decode = self.decoders[&device];
                RouteOutcome::Status {
                    device,
                    status: decode(frame.payload()),
                }
            }
            Some(kind) => {
                trace!("{:?} frame from {:?} ignored", kind, device);
                RouteOutcome::Ignored { device, kind }
            }
            None => {
                trace!("unknown kind {:#04x} from {:?} ignored", kind_raw, device);
                RouteOutcome::UnknownKind {
                    device,
                    raw: kind_raw,
                }
            }
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::with_known_devices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::compose_id;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_status_write_decodes() {
        let router = MessageRouter::with_known_devices();
        let frame = CanFrame::new(0x3C2, &[0x03]);
        assert_eq!(
            router.route(&frame),
            RouteOutcome::Status {
                device: DeviceAddress::LaserT,
                status: DeviceStatus {
                    on: true,
                    studio: true
                },
            }
        );
    }

    #[test]
    fn test_unmapped_address_is_dropped() {
        let router = MessageRouter::with_known_devices();
        // Address 0x03 is a valid wire value with no device role here.
        let frame = CanFrame::new(0x0C3, &[]);
        assert_eq!(router.route(&frame), RouteOutcome::Unrouted { address: 0x03 });
    }

    #[test]
    fn test_known_device_without_decoder_is_dropped() {
        let router = MessageRouter::with_known_devices();
        let frame = CanFrame::new(
            compose_id(DeviceAddress::Power, MessageKind::StatusWrite),
            &[0x03],
        );
        assert_eq!(router.route(&frame), RouteOutcome::Unrouted { address: 0x04 });
    }

    #[test]
    fn test_command_and_poll_echo_are_ignored() {
        let router = MessageRouter::with_known_devices();
        for kind in [MessageKind::CommandWrite, MessageKind::StatusRead] {
            let frame = CanFrame::new(compose_id(DeviceAddress::Table, kind), &[]);
            assert_eq!(
                router.route(&frame),
                RouteOutcome::Ignored {
                    device: DeviceAddress::Table,
                    kind,
                }
            );
        }
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let router = MessageRouter::with_known_devices();
        let frame = CanFrame::new(0x3FF, &[]);
        assert_eq!(
            router.route(&frame),
            RouteOutcome::UnknownKind {
                device: DeviceAddress::LaserT,
                raw: 0x3F,
            }
        );
    }

    #[test]
    fn test_routed_devices_are_sorted() {
        let router = MessageRouter::with_known_devices();
        assert_eq!(
            router.routed_devices(),
            vec![DeviceAddress::Table, DeviceAddress::LaserT]
        );
    }

    static DECODER_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_decoder(payload: &[u8]) -> DeviceStatus {
        DECODER_CALLS.fetch_add(1, Ordering::SeqCst);
        DeviceStatus::from_payload(payload)
    }

    #[test]
    fn test_miss_invokes_no_decoder() {
        let mut router = MessageRouter::new();
        router.register(DeviceAddress::Table, counting_decoder);

        router.route(&CanFrame::new(0x0C3, &[0x03]));
        assert_eq!(DECODER_CALLS.load(Ordering::SeqCst), 0);

        router.route(&CanFrame::new(
            compose_id(DeviceAddress::Table, MessageKind::StatusWrite),
            &[0x03],
        ));
        assert_eq!(DECODER_CALLS.load(Ordering::SeqCst), 1);
    }
}
