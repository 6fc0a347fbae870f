//! Scriptable Transport for Tests
//!
//! Records every call and plays back scripted outcomes so controller
//! behavior can be pinned down without an adapter board attached.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{ErrorCode, TransportError, TransportResult};
use crate::frame::CanFrame;
use crate::transport::{
    BitRate, BoardInfo, CanTransport, CancelOutcome, ChannelId, EventSet, IdFormat,
    TransmitCancel, TransmitReport, TransmitState,
};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(ChannelId),
    Close(ChannelId),
    SetBitRate(ChannelId, BitRate),
    Start(ChannelId),
    Stop(ChannelId),
    TransmitBatch(ChannelId, usize),
    WaitForEvent(ChannelId),
    ReceiveQueueDepth(ChannelId),
    ReadBatch(ChannelId, u16),
    CancelTransmit(ChannelId),
    CancelReceiveQueue(ChannelId),
    TransmitQueueThreshold(ChannelId),
    TransmitStatus(ChannelId),
    BoardInfo(u8),
}

/// Scriptable [`CanTransport`] double.
pub struct MockTransport {
    /// Every call in arrival order.
    pub calls: Vec<Call>,
    /// Scripted wait-for-event outcomes, consumed front-first; an exhausted
    /// script reads as a timeout.
    pub wait_script: VecDeque<TransportResult<EventSet>>,
    /// Frames waiting in the simulated receive queue.
    pub rx_queue: VecDeque<CanFrame>,
    /// Frames handed to `transmit_batch`.
    pub transmitted: Vec<CanFrame>,
    /// Cap on how many frames one transmit accepts.
    pub accept_limit: Option<usize>,
    /// Simulated transmit-queue threshold.
    pub threshold: u16,
    /// Simulated last-transfer state.
    pub transmit_state: TransmitState,
    /// Boards visible to `board_info`, by slot.
    pub boards: Vec<BoardInfo>,
    pub fail_open: Option<ErrorCode>,
    pub fail_set_bit_rate: Option<ErrorCode>,
    pub fail_start: Option<ErrorCode>,
    pub fail_stop: Option<ErrorCode>,
    pub fail_close: Option<ErrorCode>,
    pub fail_depth: Option<ErrorCode>,
    pub fail_read: Option<ErrorCode>,
    pub fail_transmit: Option<ErrorCode>,
    pub fail_cancel_transmit: Option<ErrorCode>,
    pub fail_cancel_receive: Option<ErrorCode>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            wait_script: VecDeque::new(),
            rx_queue: VecDeque::new(),
            transmitted: Vec::new(),
            accept_limit: None,
            threshold: 16,
            transmit_state: TransmitState::CompletedOk,
            boards: Vec::new(),
            fail_open: None,
            fail_set_bit_rate: None,
            fail_start: None,
            fail_stop: None,
            fail_close: None,
            fail_depth: None,
            fail_read: None,
            fail_transmit: None,
            fail_cancel_transmit: None,
            fail_cancel_receive: None,
        }
    }

    /// Script the next wait-for-event outcome.
    pub fn push_wait(&mut self, outcome: TransportResult<EventSet>) {
        self.wait_script.push_back(outcome);
    }

    /// Put frames on the simulated receive queue.
    pub fn push_frames(&mut self, frames: &[CanFrame]) {
        self.rx_queue.extend(frames.iter().copied());
    }

    fn gate(&self, fail: Option<ErrorCode>, op: &'static str, channel: ChannelId) -> TransportResult<()> {
        match fail {
            Some(code) => Err(TransportError { op, channel, code }),
            None => Ok(()),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CanTransport for MockTransport {
    fn open(&mut self, channel: ChannelId, _format: IdFormat) -> TransportResult<()> {
        self.calls.push(Call::Open(channel));
        self.gate(self.fail_open, "open", channel)
    }

    fn close(&mut self, channel: ChannelId) -> TransportResult<()> {
        self.calls.push(Call::Close(channel));
        self.gate(self.fail_close, "close", channel)
    }

    fn set_bit_rate(&mut self, channel: ChannelId, rate: BitRate) -> TransportResult<()> {
        self.calls.push(Call::SetBitRate(channel, rate));
        self.gate(self.fail_set_bit_rate, "set_bit_rate", channel)
    }

    fn start(&mut self, channel: ChannelId) -> TransportResult<()> {
        self.calls.push(Call::Start(channel));
        self.gate(self.fail_start, "start", channel)
    }

    fn stop(&mut self, channel: ChannelId) -> TransportResult<()> {
        self.calls.push(Call::Stop(channel));
        self.gate(self.fail_stop, "stop", channel)
    }

    fn transmit_batch(&mut self, channel: ChannelId, frames: &[CanFrame]) -> TransportResult<usize> {
        self.calls.push(Call::TransmitBatch(channel, frames.len()));
        self.gate(self.fail_transmit, "transmit_batch", channel)?;
        let accepted = self.accept_limit.unwrap_or(frames.len()).min(frames.len());
        self.transmitted.extend_from_slice(&frames[..accepted]);
        Ok(accepted)
    }

    fn wait_for_event(
        &mut self,
        channel: ChannelId,
        _interest: EventSet,
        _timeout: Duration,
    ) -> TransportResult<EventSet> {
        self.calls.push(Call::WaitForEvent(channel));
        self.wait_script.pop_front().unwrap_or(Ok(EventSet::EMPTY))
    }

    fn receive_queue_depth(&mut self, channel: ChannelId) -> TransportResult<u16> {
        self.calls.push(Call::ReceiveQueueDepth(channel));
        self.gate(self.fail_depth, "receive_queue_depth", channel)?;
        Ok(self.rx_queue.len() as u16)
    }

    fn read_batch(&mut self, channel: ChannelId, count: u16) -> TransportResult<Vec<CanFrame>> {
        self.calls.push(Call::ReadBatch(channel, count));
        self.gate(self.fail_read, "read_batch", channel)?;
        let take = (count as usize).min(self.rx_queue.len());
        Ok(self.rx_queue.drain(..take).collect())
    }

    fn cancel_transmit(&mut self, channel: ChannelId) -> TransportResult<TransmitCancel> {
        self.calls.push(Call::CancelTransmit(channel));
        self.gate(self.fail_cancel_transmit, "cancel_transmit", channel)?;
        Ok(TransmitCancel {
            outcome: CancelOutcome::NoTransmission,
            purged: 0,
        })
    }

    fn cancel_receive_queue(&mut self, channel: ChannelId) -> TransportResult<u16> {
        self.calls.push(Call::CancelReceiveQueue(channel));
        self.gate(self.fail_cancel_receive, "cancel_receive_queue", channel)?;
        let purged = self.rx_queue.len() as u16;
        self.rx_queue.clear();
        Ok(purged)
    }

    fn transmit_queue_threshold(&mut self, channel: ChannelId) -> TransportResult<u16> {
        self.calls.push(Call::TransmitQueueThreshold(channel));
        Ok(self.threshold)
    }

    fn set_transmit_queue_threshold(
        &mut self,
        channel: ChannelId,
        value: u16,
    ) -> TransportResult<()> {
        self.calls.push(Call::TransmitQueueThreshold(channel));
        self.threshold = value;
        Ok(())
    }

    fn transmit_status(&mut self, channel: ChannelId) -> TransportResult<TransmitReport> {
        self.calls.push(Call::TransmitStatus(channel));
        Ok(TransmitReport {
            state: self.transmit_state,
            queued: 0,
        })
    }

    fn board_info(&mut self, index: u8) -> TransportResult<BoardInfo> {
        self.calls.push(Call::BoardInfo(index));
        self.boards.get(index as usize).cloned().ok_or(TransportError {
            op: "board_info",
            channel: index,
            code: ErrorCode::NoDevice,
        })
    }
}
