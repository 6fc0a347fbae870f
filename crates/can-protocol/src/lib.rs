//! CAN Wire Protocol and Transport Capability
//!
//! Frame identifier layout, per-device status decoding, message routing, and
//! the transport trait the channel controller drives. The `chai` feature
//! links the vendor driver library; without it a stand-in driver with the
//! same symbols is compiled, so everything builds and tests hardware-free.

mod chai;
mod error;
mod frame;
mod mock;
mod router;
mod status;
mod transport;

pub use chai::{ChaiBoardInfo, ChaiMsg, ChaiTransport, ChaiWait};
pub use error::{ErrorCode, TransportError, TransportResult};
pub use frame::{compose_id, split_id, CanFrame, DeviceAddress, MessageKind, ID_MASK, MAX_PAYLOAD};
pub use mock::{Call, MockTransport};
pub use router::{MessageRouter, RouteOutcome, StatusDecoder};
pub use status::{payload_bit, DeviceStatus};
pub use transport::{
    BitRate, BoardInfo, CanTransport, CancelOutcome, ChannelId, EventSet, IdFormat,
    TransmitCancel, TransmitReport, TransmitState,
};
