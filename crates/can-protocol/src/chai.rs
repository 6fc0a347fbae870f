//! CHAI Driver Binding
//!
//! Safe wrapper over the vendor CAN library that drives the adapter boards.
//! The `chai` feature links the real shared library; without it a stand-in
//! with the same symbols is compiled so the crate builds and tests run with
//! no hardware attached.

use libc::c_char;

use std::time::Duration;

use tracing::info;

use crate::error::{TransportError, TransportResult};
use crate::frame::{CanFrame, ID_MASK, MAX_PAYLOAD};
use crate::transport::{
    BitRate, BoardInfo, CanTransport, CancelOutcome, ChannelId, EventSet, IdFormat,
    TransmitCancel, TransmitReport, TransmitState,
};

/// Frame layout shared with the driver.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ChaiMsg {
    pub id: u32,
    pub data: [u8; MAX_PAYLOAD],
    pub len: u8,
    pub flags: u16,
    pub ts: u32,
}

impl ChaiMsg {
    const fn zeroed() -> Self {
        Self {
            id: 0,
            data: [0; MAX_PAYLOAD],
            len: 0,
            flags: 0,
            ts: 0,
        }
    }
}

impl From<&CanFrame> for ChaiMsg {
    fn from(frame: &CanFrame) -> Self {
        Self {
            id: frame.id as u32,
            data: frame.data,
            len: frame.dlc,
            flags: 0,
            ts: 0,
        }
    }
}

impl From<ChaiMsg> for CanFrame {
    fn from(msg: ChaiMsg) -> Self {
        Self {
            id: msg.id as u16 & ID_MASK,
            dlc: msg.len,
            data: msg.data,
        }
    }
}

/// Wait descriptor: channel, flags of interest, flags signaled.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ChaiWait {
    pub chan: u8,
    pub wflags: u16,
    pub rflags: u16,
}

/// Board identification block filled by the driver.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ChaiBoardInfo {
    pub brdnum: u8,
    pub hwver: u32,
    /// Channel numbers; negative entries are unpopulated.
    pub chip: [i16; 4],
    pub name: [c_char; 64],
    pub manufact: [c_char; 64],
}

impl ChaiBoardInfo {
    const fn zeroed(brdnum: u8) -> Self {
        Self {
            brdnum,
            hwver: 0,
            chip: [-1; 4],
            name: [0; 64],
            manufact: [0; 64],
        }
    }
}

/// Open mode flags.
const CIO_CAN11: u8 = 0x02;
const CIO_CAN29: u8 = 0x04;

/// Threshold query/update selectors.
const CI_CMD_GET: u8 = 0;
const CI_CMD_SET: u8 = 1;

/// Transmit-cancel outcomes.
const CI_TRCANCEL_NOTRANSMISSION: i16 = 1;
const CI_TRCANCEL_ABORTED: i16 = 2;
const CI_TRCANCEL_TRANSMITTED: i16 = 3;

/// Transmit-state codes.
const CI_TR_INCOMPLETE: i16 = 0;
const CI_TR_COMPLETE_OK: i16 = 1;
const CI_TR_COMPLETE_ABORT: i16 = 2;

#[cfg(feature = "chai")]
mod driver {
    #![allow(non_snake_case)]

    use super::{ChaiBoardInfo, ChaiMsg, ChaiWait};

    #[link(name = "chai")]
    extern "C" {
        pub fn CiInit() -> i16;
        pub fn CiOpen(chan: u8, flags: u8) -> i16;
        pub fn CiClose(chan: u8) -> i16;
        pub fn CiSetBaud(chan: u8, bt0: u8, bt1: u8) -> i16;
        pub fn CiStart(chan: u8) -> i16;
        pub fn CiStop(chan: u8) -> i16;
        pub fn CiTransmitSeries(chan: u8, mbuf: *const ChaiMsg, cnt: i16, errcode: *mut i32)
            -> i16;
        pub fn CiWaitEvent(cw: *mut ChaiWait, cwcount: i16, timeout_ms: i32) -> i16;
        pub fn CiRcQueGetCnt(chan: u8, rcqcnt: *mut u16) -> i16;
        pub fn CiRead(chan: u8, mbuf: *mut ChaiMsg, cnt: i16) -> i16;
        pub fn CiTrCancel(chan: u8, trqcnt: *mut u16) -> i16;
        pub fn CiRcQueCancel(chan: u8, rcqcnt: *mut u16) -> i16;
        pub fn CiTrQueThreshold(chan: u8, cmd: u8, thres: *mut u16) -> i16;
        pub fn CiTrStat(chan: u8, trqcnt: *mut u16) -> i16;
        pub fn CiBoardInfo(binfo: *mut ChaiBoardInfo) -> i16;
    }
}

/// Stand-in driver for builds without the vendor library. One virtual board
/// in slot 0; a status poll transmitted to a device is answered with a
/// synthetic status broadcast on the receive queue.
#[cfg(not(feature = "chai"))]
mod driver {
    #![allow(non_snake_case)]

    use std::sync::Mutex;

    use super::{
        ChaiBoardInfo, ChaiMsg, ChaiWait, CI_CMD_SET, CI_TRCANCEL_NOTRANSMISSION,
        CI_TR_COMPLETE_OK,
    };
    use libc::c_char;

    struct DriverState {
        open_mask: u8,
        started_mask: u8,
        rx: Vec<ChaiMsg>,
        threshold: u16,
    }

    static STATE: Mutex<DriverState> = Mutex::new(DriverState {
        open_mask: 0,
        started_mask: 0,
        rx: Vec::new(),
        threshold: 16,
    });

    fn chan_bit(chan: u8) -> u8 {
        1u8 << (chan & 0x07)
    }

    pub unsafe fn CiInit() -> i16 {
        0
    }

    pub unsafe fn CiOpen(chan: u8, _flags: u8) -> i16 {
        let mut state = STATE.lock().unwrap();
        if state.open_mask & chan_bit(chan) != 0 {
            return -7;
        }
        state.open_mask |= chan_bit(chan);
        0
    }

    pub unsafe fn CiClose(chan: u8) -> i16 {
        let mut state = STATE.lock().unwrap();
        state.open_mask &= !chan_bit(chan);
        state.started_mask &= !chan_bit(chan);
        0
    }

    pub unsafe fn CiSetBaud(chan: u8, _bt0: u8, _bt1: u8) -> i16 {
        let state = STATE.lock().unwrap();
        if state.open_mask & chan_bit(chan) == 0 {
            return -5;
        }
        0
    }

    pub unsafe fn CiStart(chan: u8) -> i16 {
        let mut state = STATE.lock().unwrap();
        if state.open_mask & chan_bit(chan) == 0 {
            return -5;
        }
        state.started_mask |= chan_bit(chan);
        0
    }

    pub unsafe fn CiStop(chan: u8) -> i16 {
        let mut state = STATE.lock().unwrap();
        state.started_mask &= !chan_bit(chan);
        0
    }

    pub unsafe fn CiTransmitSeries(
        chan: u8,
        mbuf: *const ChaiMsg,
        cnt: i16,
        errcode: *mut i32,
    ) -> i16 {
        let mut state = STATE.lock().unwrap();
        if state.started_mask & chan_bit(chan) == 0 {
            *errcode = -5;
            return 0;
        }
        *errcode = 0;
        for i in 0..cnt {
            let msg = *mbuf.offset(i as isize);
            // A status poll gets a synthetic status broadcast in reply.
            if msg.id & 0x3F == 0x03 {
                let mut reply = ChaiMsg::zeroed();
                reply.id = (msg.id & !0x3F) | 0x02;
                reply.len = 1;
                reply.data[0] = 0x03;
                state.rx.push(reply);
            }
        }
        cnt
    }

    pub unsafe fn CiWaitEvent(cw: *mut ChaiWait, _cwcount: i16, _timeout_ms: i32) -> i16 {
        let state = STATE.lock().unwrap();
        let wait = &mut *cw;
        wait.rflags = 0;
        if wait.wflags & 0x01 != 0 && !state.rx.is_empty() {
            wait.rflags = 0x01;
            return 1;
        }
        0
    }

    pub unsafe fn CiRcQueGetCnt(_chan: u8, rcqcnt: *mut u16) -> i16 {
        let state = STATE.lock().unwrap();
        *rcqcnt = state.rx.len() as u16;
        0
    }

    pub unsafe fn CiRead(_chan: u8, mbuf: *mut ChaiMsg, cnt: i16) -> i16 {
        let mut state = STATE.lock().unwrap();
        let take = (cnt as usize).min(state.rx.len());
        for (i, msg) in state.rx.drain(..take).enumerate() {
            *mbuf.add(i) = msg;
        }
        take as i16
    }

    pub unsafe fn CiTrCancel(_chan: u8, trqcnt: *mut u16) -> i16 {
        *trqcnt = 0;
        CI_TRCANCEL_NOTRANSMISSION
    }

    pub unsafe fn CiRcQueCancel(_chan: u8, rcqcnt: *mut u16) -> i16 {
        let mut state = STATE.lock().unwrap();
        *rcqcnt = state.rx.len() as u16;
        state.rx.clear();
        0
    }

    pub unsafe fn CiTrQueThreshold(_chan: u8, cmd: u8, thres: *mut u16) -> i16 {
        let mut state = STATE.lock().unwrap();
        if cmd == CI_CMD_SET {
            state.threshold = *thres;
        } else {
            *thres = state.threshold;
        }
        0
    }

    pub unsafe fn CiTrStat(_chan: u8, trqcnt: *mut u16) -> i16 {
        *trqcnt = 0;
        CI_TR_COMPLETE_OK
    }

    pub unsafe fn CiBoardInfo(binfo: *mut ChaiBoardInfo) -> i16 {
        let info = &mut *binfo;
        if info.brdnum != 0 {
            return -6;
        }
        write_cstr(&mut info.name, "CAN-bus-USB");
        write_cstr(&mut info.manufact, "Marathon Ltd");
        info.chip = [0, 1, -1, -1];
        0
    }

    fn write_cstr(dst: &mut [c_char], s: &str) {
        for (slot, byte) in dst.iter_mut().zip(s.bytes().chain(std::iter::once(0))) {
            *slot = byte as c_char;
        }
    }
}

use driver::*;

fn check(op: &'static str, channel: ChannelId, ret: i16) -> TransportResult<i16> {
    if ret < 0 {
        Err(TransportError::from_raw(op, channel, ret as i32))
    } else {
        Ok(ret)
    }
}

fn cstr_field(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Safe [`CanTransport`] implementation over the CHAI driver.
pub struct ChaiTransport {
    _private: (),
}

impl ChaiTransport {
    /// Initialize the driver library and hand out the transport.
    pub fn new() -> TransportResult<Self> {
        let ret = unsafe { CiInit() };
        check("init", 0, ret)?;
        info!("CHAI driver library initialized");
        Ok(Self { _private: () })
    }
}

impl CanTransport for ChaiTransport {
    fn open(&mut self, channel: ChannelId, format: IdFormat) -> TransportResult<()> {
        let mode = match format {
            IdFormat::Standard11 => CIO_CAN11,
            IdFormat::Extended29 => CIO_CAN29,
        };
        check("open", channel, unsafe { CiOpen(channel, mode) }).map(|_| ())
    }

    fn close(&mut self, channel: ChannelId) -> TransportResult<()> {
        check("close", channel, unsafe { CiClose(channel) }).map(|_| ())
    }

    fn set_bit_rate(&mut self, channel: ChannelId, rate: BitRate) -> TransportResult<()> {
        let (bt0, bt1) = rate.btr();
        check("set_bit_rate", channel, unsafe {
            CiSetBaud(channel, bt0, bt1)
        })
        .map(|_| ())
    }

    fn start(&mut self, channel: ChannelId) -> TransportResult<()> {
        check("start", channel, unsafe { CiStart(channel) }).map(|_| ())
    }

    fn stop(&mut self, channel: ChannelId) -> TransportResult<()> {
        check("stop", channel, unsafe { CiStop(channel) }).map(|_| ())
    }

    fn transmit_batch(&mut self, channel: ChannelId, frames: &[CanFrame]) -> TransportResult<usize> {
        let mbuf: Vec<ChaiMsg> = frames.iter().map(ChaiMsg::from).collect();
        let mut errcode: i32 = 0;
        let written = unsafe {
            CiTransmitSeries(channel, mbuf.as_ptr(), mbuf.len() as i16, &mut errcode)
        };
        if errcode != 0 {
            return Err(TransportError::from_raw("transmit_batch", channel, errcode));
        }
        Ok(written.max(0) as usize)
    }

    fn wait_for_event(
        &mut self,
        channel: ChannelId,
        interest: EventSet,
        timeout: Duration,
    ) -> TransportResult<EventSet> {
        let mut wait = ChaiWait {
            chan: channel,
            wflags: interest.bits(),
            rflags: 0,
        };
        let ret = unsafe { CiWaitEvent(&mut wait, 1, timeout.as_millis() as i32) };
        check("wait_for_event", channel, ret)?;
        if ret == 0 {
            Ok(EventSet::EMPTY)
        } else {
            Ok(EventSet::from_bits(wait.rflags))
        }
    }

    fn receive_queue_depth(&mut self, channel: ChannelId) -> TransportResult<u16> {
        let mut depth: u16 = 0;
        check("receive_queue_depth", channel, unsafe {
            CiRcQueGetCnt(channel, &mut depth)
        })?;
        Ok(depth)
    }

    fn read_batch(&mut self, channel: ChannelId, count: u16) -> TransportResult<Vec<CanFrame>> {
        let mut mbuf = vec![ChaiMsg::zeroed(); count as usize];
        let ret = unsafe { CiRead(channel, mbuf.as_mut_ptr(), count as i16) };
        check("read_batch", channel, ret)?;
        mbuf.truncate(ret as usize);
        Ok(mbuf.into_iter().map(CanFrame::from).collect())
    }

    fn cancel_transmit(&mut self, channel: ChannelId) -> TransportResult<TransmitCancel> {
        let mut purged: u16 = 0;
        let ret = unsafe { CiTrCancel(channel, &mut purged) };
        let outcome = match check("cancel_transmit", channel, ret)? {
            CI_TRCANCEL_NOTRANSMISSION => CancelOutcome::NoTransmission,
            CI_TRCANCEL_ABORTED => CancelOutcome::AbortedPending,
            CI_TRCANCEL_TRANSMITTED => CancelOutcome::AbortedTransmitted,
            _ => CancelOutcome::NoTransmission,
        };
        Ok(TransmitCancel { outcome, purged })
    }

    fn cancel_receive_queue(&mut self, channel: ChannelId) -> TransportResult<u16> {
        let mut purged: u16 = 0;
        check("cancel_receive_queue", channel, unsafe {
            CiRcQueCancel(channel, &mut purged)
        })?;
        Ok(purged)
    }

    fn transmit_queue_threshold(&mut self, channel: ChannelId) -> TransportResult<u16> {
        let mut threshold: u16 = 0;
        check("transmit_queue_threshold", channel, unsafe {
            CiTrQueThreshold(channel, CI_CMD_GET, &mut threshold)
        })?;
        Ok(threshold)
    }

    fn set_transmit_queue_threshold(
        &mut self,
        channel: ChannelId,
        value: u16,
    ) -> TransportResult<()> {
        let mut value = value;
        check("set_transmit_queue_threshold", channel, unsafe {
            CiTrQueThreshold(channel, CI_CMD_SET, &mut value)
        })
        .map(|_| ())
    }

    fn transmit_status(&mut self, channel: ChannelId) -> TransportResult<TransmitReport> {
        let mut queued: u16 = 0;
        let ret = unsafe { CiTrStat(channel, &mut queued) };
        let state = match check("transmit_status", channel, ret)? {
            CI_TR_INCOMPLETE => TransmitState::Incomplete,
            CI_TR_COMPLETE_OK => TransmitState::CompletedOk,
            CI_TR_COMPLETE_ABORT => TransmitState::Aborted,
            _ => TransmitState::CompletedOk,
        };
        Ok(TransmitReport { state, queued })
    }

    fn board_info(&mut self, index: u8) -> TransportResult<BoardInfo> {
        let mut info = ChaiBoardInfo::zeroed(index);
        check("board_info", index, unsafe { CiBoardInfo(&mut info) })?;
        Ok(BoardInfo {
            name: cstr_field(&info.name),
            manufacturer: cstr_field(&info.manufact),
            channels: info
                .chip
                .iter()
                .filter(|&&chip| chip >= 0)
                .map(|&chip| chip as ChannelId)
                .collect(),
        })
    }
}

// These run against the stand-in driver; with the real library linked they
// would touch hardware.
#[cfg(all(test, not(feature = "chai")))]
mod tests {
    use super::*;
    use crate::frame::DeviceAddress;

    #[test]
    fn test_poll_roundtrip_on_channel_0() {
        let mut transport = ChaiTransport::new().unwrap();
        transport.open(0, IdFormat::Standard11).unwrap();
        transport.set_bit_rate(0, BitRate::Kbit125).unwrap();
        transport.start(0).unwrap();

        let poll = CanFrame::status_request(DeviceAddress::LaserT);
        assert_eq!(transport.transmit_batch(0, &[poll]).unwrap(), 1);

        let events = transport
            .wait_for_event(0, EventSet::RECEIVE | EventSet::ERROR, Duration::from_millis(10))
            .unwrap();
        assert!(events.contains(EventSet::RECEIVE));

        let depth = transport.receive_queue_depth(0).unwrap();
        assert_eq!(depth, 1);
        let frames = transport.read_batch(0, depth).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].device_address(), DeviceAddress::LaserT.as_raw());
        assert_eq!(frames[0].message_kind(), 0x02);

        transport.stop(0).unwrap();
        transport.close(0).unwrap();
    }

    #[test]
    fn test_double_open_reports_busy_on_channel_1() {
        use crate::error::ErrorCode;

        let mut transport = ChaiTransport::new().unwrap();
        transport.open(1, IdFormat::Standard11).unwrap();
        let err = transport.open(1, IdFormat::Standard11).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);
        transport.close(1).unwrap();
    }

    #[test]
    fn test_board_inventory() {
        let mut transport = ChaiTransport::new().unwrap();
        let board = transport.board_info(0).unwrap();
        assert_eq!(board.manufacturer, "Marathon Ltd");
        assert_eq!(board.channels, vec![0, 1]);
        assert!(transport.board_info(3).is_err());
    }
}
