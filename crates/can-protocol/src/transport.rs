//! CAN Transport Capability
//!
//! The abstract driver surface the channel controller consumes. Exactly one
//! owner holds an opened channel at a time; all calls are synchronous, and
//! the only blocking primitive, `wait_for_event`, carries an explicit
//! timeout so a poll tick never blocks indefinitely.

use std::ops::BitOr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportResult;
use crate::frame::CanFrame;

/// Logical channel number on the adapter board.
pub type ChannelId = u8;

/// Identifier format requested when opening a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdFormat {
    /// Standard frame format, 11-bit identifiers.
    Standard11,
    /// Extended frame format, 29-bit identifiers.
    Extended29,
}

/// Supported bus bit-rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitRate {
    Kbit10,
    Kbit20,
    Kbit50,
    Kbit100,
    Kbit125,
    Kbit250,
    Kbit500,
    Mbit1,
}

impl BitRate {
    /// Controller BTR register pair (prescaler, timing) for this rate.
    pub fn btr(self) -> (u8, u8) {
        match self {
            BitRate::Kbit10 => (0x31, 0x1C),
            BitRate::Kbit20 => (0x18, 0x1C),
            BitRate::Kbit50 => (0x09, 0x1C),
            BitRate::Kbit100 => (0x04, 0x1C),
            BitRate::Kbit125 => (0x03, 0x1C),
            BitRate::Kbit250 => (0x01, 0x1C),
            BitRate::Kbit500 => (0x00, 0x1C),
            BitRate::Mbit1 => (0x00, 0x14),
        }
    }

    /// Rate in kbit/s, for diagnostics output.
    pub fn as_kbit(self) -> u32 {
        match self {
            BitRate::Kbit10 => 10,
            BitRate::Kbit20 => 20,
            BitRate::Kbit50 => 50,
            BitRate::Kbit100 => 100,
            BitRate::Kbit125 => 125,
            BitRate::Kbit250 => 250,
            BitRate::Kbit500 => 500,
            BitRate::Mbit1 => 1000,
        }
    }
}

impl Default for BitRate {
    fn default() -> Self {
        // The deployment rate.
        BitRate::Kbit125
    }
}

/// Bus events a wait can subscribe to and report. Bit values mirror the
/// driver's wait flags, so implementations pass them through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSet(u16);

impl EventSet {
    /// Nothing signaled (a timeout outcome).
    pub const EMPTY: EventSet = EventSet(0);
    /// Frames are waiting in the receive queue.
    pub const RECEIVE: EventSet = EventSet(0x01);
    /// The controller latched a bus error.
    pub const ERROR: EventSet = EventSet(0x02);
    /// The transmit queue crossed its threshold.
    pub const TRANSMIT: EventSet = EventSet(0x04);

    /// Raw flag bits as exchanged with the driver.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Reconstruct from driver flag bits; undefined bits are discarded.
    pub const fn from_bits(bits: u16) -> Self {
        EventSet(bits & 0x07)
    }

    /// True if every flag in `other` is set in `self`.
    pub const fn contains(self, other: EventSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventSet {
    type Output = EventSet;

    fn bitor(self, rhs: EventSet) -> EventSet {
        EventSet(self.0 | rhs.0)
    }
}

/// Progress of the transmitter on the last frame handed to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    /// A frame is still being transferred to the network.
    Incomplete,
    /// The last transfer reached the network.
    CompletedOk,
    /// The last transfer was dropped.
    Aborted,
}

/// Snapshot of the transmit side: last-transfer state plus queued frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitReport {
    pub state: TransmitState,
    /// Frames currently waiting in the transmit queue.
    pub queued: u16,
}

/// What cancelling the current transmit request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No transfer request was in flight.
    NoTransmission,
    /// The in-flight request was dropped before reaching the network.
    AbortedPending,
    /// The in-flight request was dropped after its frame went out.
    AbortedTransmitted,
}

/// Result of a transmit cancel: outcome plus purged frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitCancel {
    pub outcome: CancelOutcome,
    /// Frames erased from the transmit queue.
    pub purged: u16,
}

/// Adapter board identification, for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    pub name: String,
    pub manufacturer: String,
    /// Channel numbers the board exposes.
    pub channels: Vec<ChannelId>,
}

/// Raw CAN I/O primitives of the adapter driver.
pub trait CanTransport {
    /// Open `channel` exclusively in the given identifier format.
    fn open(&mut self, channel: ChannelId, format: IdFormat) -> TransportResult<()>;

    /// Release an opened channel.
    fn close(&mut self, channel: ChannelId) -> TransportResult<()>;

    /// Set the bus bit-rate. Valid between open and start.
    fn set_bit_rate(&mut self, channel: ChannelId, rate: BitRate) -> TransportResult<()>;

    /// Begin bus activity on an opened, configured channel.
    fn start(&mut self, channel: ChannelId) -> TransportResult<()>;

    /// Halt bus activity.
    fn stop(&mut self, channel: ChannelId) -> TransportResult<()>;

    /// Queue frames for transmission; returns how many the driver accepted,
    /// which may be fewer than requested.
    fn transmit_batch(&mut self, channel: ChannelId, frames: &[CanFrame]) -> TransportResult<usize>;

    /// Block up to `timeout` for any event in `interest`. An empty returned
    /// set means the timeout elapsed with nothing signaled.
    fn wait_for_event(
        &mut self,
        channel: ChannelId,
        interest: EventSet,
        timeout: Duration,
    ) -> TransportResult<EventSet>;

    /// Number of frames waiting in the receive queue.
    fn receive_queue_depth(&mut self, channel: ChannelId) -> TransportResult<u16>;

    /// Read `count` frames from the receive queue in one batch. Either the
    /// requested frames come back or an error does; there is no
    /// partial-count success case.
    fn read_batch(&mut self, channel: ChannelId, count: u16) -> TransportResult<Vec<CanFrame>>;

    /// Drop the in-flight transmit request and purge the transmit queue.
    fn cancel_transmit(&mut self, channel: ChannelId) -> TransportResult<TransmitCancel>;

    /// Erase the contents of the receive queue; returns the purged count.
    fn cancel_receive_queue(&mut self, channel: ChannelId) -> TransportResult<u16>;

    /// Current transmit-queue threshold.
    fn transmit_queue_threshold(&mut self, channel: ChannelId) -> TransportResult<u16>;

    /// Set the transmit-queue threshold.
    fn set_transmit_queue_threshold(
        &mut self,
        channel: ChannelId,
        value: u16,
    ) -> TransportResult<()>;

    /// State of the transmit side.
    fn transmit_status(&mut self, channel: ChannelId) -> TransportResult<TransmitReport>;

    /// Identification of the board in slot `index`, when one is present.
    fn board_info(&mut self, index: u8) -> TransportResult<BoardInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_set_ops() {
        let interest = EventSet::RECEIVE | EventSet::ERROR | EventSet::TRANSMIT;
        assert_eq!(interest.bits(), 0x07);
        assert!(interest.contains(EventSet::RECEIVE));
        assert!(!EventSet::RECEIVE.contains(interest));
        assert!(EventSet::EMPTY.is_empty());
    }

    #[test]
    fn test_event_set_discards_undefined_bits() {
        let set = EventSet::from_bits(0xFF);
        assert_eq!(set.bits(), 0x07);
    }

    #[test]
    fn test_deployment_bit_rate() {
        assert_eq!(BitRate::default(), BitRate::Kbit125);
        assert_eq!(BitRate::Kbit125.btr(), (0x03, 0x1C));
        assert_eq!(BitRate::Kbit125.as_kbit(), 125);
    }
}
