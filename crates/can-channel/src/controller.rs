//! Channel Controller
//!
//! Owns the lifecycle of one CAN channel and the poll cycle that drains it:
//! open -> configure -> start -> poll ticks -> teardown. The poll cycle is
//! driven either by [`ChannelController::run`] on a tokio interval or by a
//! harness calling [`ChannelController::poll`] directly.

use can_protocol::{
    CanFrame, CanTransport, ChannelId, DeviceAddress, DeviceStatus, EventSet, IdFormat,
    MessageRouter, RouteOutcome, TransportError,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::ChannelConfig;

/// Lifecycle of the managed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Opened,
    Configured,
    Running,
}

/// Controller-level failures.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// An operation was called in the wrong lifecycle stage.
    #[error("channel {channel} is {actual:?}, operation requires {required:?}")]
    InvalidState {
        channel: ChannelId,
        actual: ChannelState,
        required: ChannelState,
    },
    /// The transport refused a call.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A decoded status broadcast, forwarded to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub device: DeviceAddress,
    pub status: DeviceStatus,
}

/// What one poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The channel is not running; nothing was polled.
    NotRunning,
    /// wait-for-event failed at the transport level. Logged; the channel
    /// stays running and the next tick proceeds normally.
    WaitFailed,
    /// No event within the wait timeout.
    Idle,
    /// Events were handled this tick.
    Handled { read: usize, decoded: usize },
}

/// State machine managing a single CAN channel over an abstract transport.
pub struct ChannelController<T: CanTransport> {
    transport: T,
    config: ChannelConfig,
    state: ChannelState,
    router: MessageRouter,
    status_tx: Option<mpsc::Sender<StatusEvent>>,
}

impl<T: CanTransport> ChannelController<T> {
    /// Controller in the Closed state with the rig's default routing table.
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Self {
            transport,
            config,
            state: ChannelState::Closed,
            router: MessageRouter::with_known_devices(),
            status_tx: None,
        }
    }

    /// Replace the routing table.
    pub fn with_router(mut self, router: MessageRouter) -> Self {
        self.router = router;
        self
    }

    /// Forward decoded status broadcasts to `tx` in addition to logging
    /// them. The send never blocks; a full sink drops the event.
    pub fn with_status_sink(mut self, tx: mpsc::Sender<StatusEvent>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn require(&self, required: ChannelState) -> Result<(), ChannelError> {
        if self.state == required {
            Ok(())
        } else {
            Err(ChannelError::InvalidState {
                channel: self.config.channel,
                actual: self.state,
                required,
            })
        }
    }

    /// Open the channel exclusively, standard 11-bit identifiers.
    pub fn open(&mut self) -> Result<(), ChannelError> {
        self.require(ChannelState::Closed)?;
        self.transport.open(self.config.channel, IdFormat::Standard11)?;
        self.state = ChannelState::Opened;
        info!("channel {} opened", self.config.channel);
        Ok(())
    }

    /// Set the bus bit-rate. A transport refusal tears the channel down so
    /// a half-opened channel is never left behind.
    pub fn configure(&mut self) -> Result<(), ChannelError> {
        self.require(ChannelState::Opened)?;
        if let Err(err) = self
            .transport
            .set_bit_rate(self.config.channel, self.config.bit_rate)
        {
            warn!("bit-rate setup failed, tearing channel down: {}", err);
            self.shutdown();
            return Err(err.into());
        }
        self.state = ChannelState::Configured;
        info!(
            "channel {} configured at {} kbit/s",
            self.config.channel,
            self.config.bit_rate.as_kbit()
        );
        Ok(())
    }

    /// Begin bus activity and arm the poll cycle. A transport refusal tears
    /// the channel down.
    pub fn start(&mut self) -> Result<(), ChannelError> {
        self.require(ChannelState::Configured)?;
        if let Err(err) = self.transport.start(self.config.channel) {
            warn!("start failed, tearing channel down: {}", err);
            self.shutdown();
            return Err(err.into());
        }
        self.state = ChannelState::Running;
        info!("channel {} running", self.config.channel);
        Ok(())
    }

    /// Open, configure and start the channel, then ask every routed device
    /// for its status. A failed status poll is logged, not fatal: the
    /// channel is up and devices broadcast on their own as well.
    pub fn bring_up(&mut self) -> Result<(), ChannelError> {
        self.open()?;
        self.configure()?;
        self.start()?;
        let devices = self.router.routed_devices();
        if let Err(err) = self.request_device_status(&devices) {
            warn!("startup status poll failed: {}", err);
        }
        Ok(())
    }

    /// Transmit zero-payload status polls to `devices` through the transmit
    /// queue. Returns how many frames the driver accepted.
    pub fn request_device_status(
        &mut self,
        devices: &[DeviceAddress],
    ) -> Result<usize, ChannelError> {
        self.require(ChannelState::Running)?;
        if devices.is_empty() {
            return Ok(0);
        }
        let frames: Vec<CanFrame> = devices
            .iter()
            .map(|&device| CanFrame::status_request(device))
            .collect();
        let accepted = self.transport.transmit_batch(self.config.channel, &frames)?;
        if accepted < frames.len() {
            warn!(
                "transmit queue accepted {} of {} status polls",
                accepted,
                frames.len()
            );
        } else {
            debug!("status poll queued for {:?}", devices);
        }
        Ok(accepted)
    }

    /// One poll tick: wait briefly for bus events and handle them in fixed
    /// order — receive, then error report, then transmit report — so a tick
    /// with several simultaneous flags is deterministic.
    pub fn poll(&mut self) -> PollOutcome {
        if self.state != ChannelState::Running {
            return PollOutcome::NotRunning;
        }

        let interest = EventSet::RECEIVE | EventSet::ERROR | EventSet::TRANSMIT;
        let events = match self.transport.wait_for_event(
            self.config.channel,
            interest,
            self.config.wait_timeout,
        ) {
            Ok(events) => events,
            Err(err) => {
                warn!("event wait failed: {}", err);
                return PollOutcome::WaitFailed;
            }
        };
        if events.is_empty() {
            trace!("tick: no event");
            return PollOutcome::Idle;
        }

        let mut read = 0;
        let mut decoded = 0;
        if events.contains(EventSet::RECEIVE) {
            let frames = self.read_frames();
            read = frames.len();
            decoded = self.dispatch(&frames);
        }
        if events.contains(EventSet::ERROR) {
            warn!("channel {} latched a bus error", self.config.channel);
        }
        if events.contains(EventSet::TRANSMIT) {
            self.report_transmit_side();
        }
        PollOutcome::Handled { read, decoded }
    }

    /// Drain the receive queue: query its depth, then read exactly that many
    /// frames in one batch. Any failure yields an empty batch for this tick.
    fn read_frames(&mut self) -> Vec<CanFrame> {
        let depth = match self.transport.receive_queue_depth(self.config.channel) {
            Ok(depth) => depth,
            Err(err) => {
                warn!("receive queue introspection failed: {}", err);
                return Vec::new();
            }
        };
        if depth == 0 {
            return Vec::new();
        }
        match self.transport.read_batch(self.config.channel, depth) {
            Ok(frames) => frames,
            Err(err) => {
                warn!("batch read failed: {}", err);
                Vec::new()
            }
        }
    }

    fn dispatch(&mut self, frames: &[CanFrame]) -> usize {
        let mut decoded = 0;
        for frame in frames {
            match self.router.route(frame) {
                RouteOutcome::Status { device, status } => {
                    decoded += 1;
                    info!(
                        "{:?} status: on={} studio={}",
                        device, status.on, status.studio
                    );
                    if let Some(tx) = &self.status_tx {
                        if tx.try_send(StatusEvent { device, status }).is_err() {
                            debug!("status sink full or gone, event dropped");
                        }
                    }
                }
                RouteOutcome::Ignored { device, kind } => {
                    trace!("{:?} from {:?} ignored", kind, device)
                }
                RouteOutcome::UnknownKind { device, raw } => {
                    trace!("unknown kind {:#04x} from {:?} ignored", raw, device)
                }
                RouteOutcome::Unrouted { address } => {
                    trace!("no decoder for address {:#04x}, frame dropped", address)
                }
            }
        }
        decoded
    }

    /// Observability for transmit-threshold events: queue threshold and the
    /// state of the last transfer. No control action.
    fn report_transmit_side(&mut self) {
        let channel = self.config.channel;
        match self.transport.transmit_queue_threshold(channel) {
            Ok(threshold) => info!("transmit queue threshold: {}", threshold),
            Err(err) => warn!("threshold query failed: {}", err),
        }
        match self.transport.transmit_status(channel) {
            Ok(report) => info!(
                "last transfer {:?}, {} frames queued",
                report.state, report.queued
            ),
            Err(err) => warn!("transmit status query failed: {}", err),
        }
    }

    /// Best-effort teardown, valid from any state. The poll gate drops out
    /// of Running before the queues are purged, so a late tick cannot race
    /// the purge. Each step is attempted exactly once, in order: transmit
    /// cancel, receive-queue cancel, stop, close. Failures only log; the
    /// state always ends Closed.
    pub fn shutdown(&mut self) {
        if self.state == ChannelState::Closed {
            debug!("channel {} already closed", self.config.channel);
            return;
        }
        let channel = self.config.channel;
        self.state = ChannelState::Closed;

        match self.transport.cancel_transmit(channel) {
            Ok(cancel) => info!(
                "transmit queue cleared ({:?}, {} frames erased)",
                cancel.outcome, cancel.purged
            ),
            Err(err) => warn!("transmit cancel failed: {}", err),
        }
        match self.transport.cancel_receive_queue(channel) {
            Ok(purged) => info!("receive queue cleared ({} frames erased)", purged),
            Err(err) => warn!("receive queue cancel failed: {}", err),
        }
        match self.transport.stop(channel) {
            Ok(()) => info!("channel {} stopped", channel),
            Err(err) => warn!("stop failed: {}", err),
        }
        match self.transport.close(channel) {
            Ok(()) => info!("channel {} closed", channel),
            Err(err) => warn!("close failed: {}", err),
        }
    }

    /// Drive the poll cycle on a fixed tick until `shutdown_rx` flips to
    /// true (or its sender goes away), then run the teardown sequence.
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        while self.state == ChannelState::Running {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }
}
