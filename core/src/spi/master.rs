//! Component E — the SPI master link-layer protocol driver.
//!
//! One transfer is in flight at a time, drawn from a small FIFO queue of
//! caller-supplied [`SpiMasterTrx`] descriptors. [`SpiMaster::service`] does
//! at most one byte's worth of work per call — it never busy-waits for the
//! slave — so the owning process drives it by calling `service` once per
//! foreground iteration and watching the event queue for completion.

use crate::config;
use crate::crc16::Crc16;
use crate::hal::SpiMasterHardware;
use crate::process::{Event, EventKind, EventQueue};
use crate::spi::llp;

pub const EVENT_SPIM_TRX_COMPLETED_SUCCESSFULLY: EventKind = 20;
pub const EVENT_SPIM_ERR_NO_RESPONSE: EventKind = 21;
pub const EVENT_SPIM_ERR_SLAVE_NOT_READY: EventKind = 22;
pub const EVENT_SPIM_ERR_SLAVE: EventKind = 23;
pub const EVENT_SPIM_ERR_CRC_FAILURE: EventKind = 24;
pub const EVENT_SPIM_ERR_MESSAGE_TOO_LARGE: EventKind = 25;
pub const EVENT_SPIM_ERR_RESPONSE_TOO_LARGE: EventKind = 26;
pub const EVENT_SPIM_ERR_RESPONSE_CRC_FAILURE: EventKind = 27;

const NONE: u8 = u8::MAX;

/// Byte buffer shared by both transfer kinds, sized per [`config::SPIM_BUF_CAP`].
pub type Buf = heapless::Vec<u8, { config::SPIM_BUF_CAP }>;

/// A transfer the caller wants the master to run.
#[derive(Clone)]
pub enum SpiMasterTrx {
    /// Raw half-duplex exchange: send `tx`, then clock `rx_len` more dummy
    /// bytes to receive a reply of that length. No framing, no retries.
    Simple { tx: Buf, rx_len: u8 },
    /// A link-layer-protocol request: `request_type` plus `payload`, CRC'd
    /// and framed, with the handshake-strict response handling described in
    /// the module docs.
    Framed { request_type: u8, payload: Buf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpimError {
    /// No free slot in the transfer queue — the arena's only two states are
    /// "free" and "queued", so an exhausted arena is indistinguishable from
    /// every slot already holding a queued transfer.
    AlreadyQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpimHandle(u8);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    SimpleTx,
    SimpleDummyRx,
    FramedTxType,
    FramedTxSize,
    FramedTxPayload,
    FramedTxCrcHi,
    FramedTxCrcLo,
    FramedPolling,
    FramedRxSize,
    FramedRxPayload,
    FramedRxCrcHi,
    FramedRxCrcLo,
}

enum Outcome {
    Success,
    ErrNoResponse,
    ErrSlaveNotReady,
    ErrSlave,
    ErrCrcFailure,
    ErrMessageTooLarge,
    ErrResponseTooLarge,
    ErrResponseCrcFailure,
}

#[derive(Clone)]
struct TrxSlot {
    trx: SpiMasterTrx,
    notify: u8,
    queued: bool,
    in_transmission: bool,
    response: Buf,
    response_type: u8,
    next: u8,
}

impl TrxSlot {
    const fn empty() -> Self {
        TrxSlot {
            trx: SpiMasterTrx::Simple { tx: Buf::new(), rx_len: 0 },
            notify: 0,
            queued: false,
            in_transmission: false,
            response: Buf::new(),
            response_type: 0,
            next: NONE,
        }
    }
}

/// `true` once `step()` has nothing left to do this call; `false` means
/// progress was made (a byte moved, a delay tick elapsed) and the caller
/// should keep calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Busy,
}

pub struct SpiMaster<const N: usize> {
    slots: [TrxSlot; N],
    free_head: u8,
    queue_head: u8,
    queue_tail: u8,
    phase: Phase,
    delay: u8,
    rx_delay_remaining: u8,
    cursor: usize,
    crc: Crc16,
    rx_crc_hi: u8,
}

impl<const N: usize> SpiMaster<N> {
    pub fn new() -> Self {
        assert!(N > 0 && N < NONE as usize, "SpiMaster arena must fit in u8 and be non-empty");
        let slots = core::array::from_fn(|i| {
            let mut slot = TrxSlot::empty();
            slot.next = if i + 1 < N { (i + 1) as u8 } else { NONE };
            slot
        });
        SpiMaster {
            slots,
            free_head: 0,
            queue_head: NONE,
            queue_tail: NONE,
            phase: Phase::Idle,
            delay: 0,
            rx_delay_remaining: 0,
            cursor: 0,
            crc: Crc16::new(),
            rx_crc_hi: 0,
        }
    }

    fn pop_free(&mut self) -> Option<u8> {
        if self.free_head == NONE {
            return None;
        }
        let idx = self.free_head;
        self.free_head = self.slots[idx as usize].next;
        Some(idx)
    }

    fn push_free(&mut self, idx: u8) {
        self.slots[idx as usize].next = self.free_head;
        self.free_head = idx;
    }

    pub fn queue(&mut self, trx: SpiMasterTrx, notify: u8) -> Result<SpimHandle, SpimError> {
        let idx = self.pop_free().ok_or_else(|| {
            log::warn!("spi master queue full, transfer rejected");
            SpimError::AlreadyQueued
        })?;
        let slot = &mut self.slots[idx as usize];
        slot.trx = trx;
        slot.notify = notify;
        slot.queued = true;
        slot.in_transmission = false;
        slot.response.clear();
        slot.response_type = 0;
        slot.next = NONE;
        if self.queue_tail == NONE {
            self.queue_head = idx;
        } else {
            self.slots[self.queue_tail as usize].next = idx;
        }
        self.queue_tail = idx;
        Ok(SpimHandle(idx))
    }

    pub fn is_queued(&self, handle: SpimHandle) -> bool {
        self.slots[handle.0 as usize].queued
    }

    pub fn is_in_transmission(&self, handle: SpimHandle) -> bool {
        self.slots[handle.0 as usize].in_transmission
    }

    /// The accumulated response bytes for a completed Framed or Simple
    /// transfer. Valid to read once the caller observes a completion event
    /// for `handle`.
    pub fn response(&self, handle: SpimHandle) -> &[u8] {
        &self.slots[handle.0 as usize].response
    }

    pub fn response_type(&self, handle: SpimHandle) -> u8 {
        self.slots[handle.0 as usize].response_type
    }

    /// Advance the in-flight transfer by one byte or one delay tick.
    /// Returns [`StepOutcome::Idle`] when the queue is empty.
    pub fn service<const M: usize>(
        &mut self,
        hw: &mut impl SpiMasterHardware,
        queue: &mut EventQueue<M>,
    ) -> StepOutcome {
        if self.phase == Phase::Idle {
            if self.queue_head == NONE {
                return StepOutcome::Idle;
            }
            self.begin_transfer(hw);
            return StepOutcome::Busy;
        }
        if self.delay > 0 {
            self.delay -= 1;
            return StepOutcome::Busy;
        }
        match self.phase {
            Phase::Idle => unreachable!(),
            Phase::SimpleTx => self.step_simple_tx(hw, queue),
            Phase::SimpleDummyRx => self.step_simple_dummy_rx(hw, queue),
            Phase::FramedTxType => self.step_framed_tx_type(hw, queue),
            Phase::FramedTxSize => self.step_framed_tx_size(hw, queue),
            Phase::FramedTxPayload => self.step_framed_tx_payload(hw, queue),
            Phase::FramedTxCrcHi => self.step_framed_tx_crc_hi(hw, queue),
            Phase::FramedTxCrcLo => self.step_framed_tx_crc_lo(hw, queue),
            Phase::FramedPolling => self.step_framed_polling(hw, queue),
            Phase::FramedRxSize => self.step_framed_rx_size(hw, queue),
            Phase::FramedRxPayload => self.step_framed_rx_payload(hw, queue),
            Phase::FramedRxCrcHi => self.step_framed_rx_crc_hi(hw, queue),
            Phase::FramedRxCrcLo => self.step_framed_rx_crc_lo(hw, queue),
        }
        StepOutcome::Busy
    }

    fn begin_transfer(&mut self, hw: &mut impl SpiMasterHardware) {
        hw.select();
        self.cursor = 0;
        self.slots[self.queue_head as usize].in_transmission = true;
        let simple = matches!(self.slots[self.queue_head as usize].trx, SpiMasterTrx::Simple { .. });
        self.phase = if simple { Phase::SimpleTx } else { Phase::FramedTxType };
        if !simple {
            self.crc = Crc16::new();
        }
        self.delay = 0;
    }

    fn step_simple_tx<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let idx = self.queue_head as usize;
        let (tx_len, byte, rx_len) = match &self.slots[idx].trx {
            SpiMasterTrx::Simple { tx, rx_len } => (tx.len(), tx.get(self.cursor).copied(), *rx_len),
            SpiMasterTrx::Framed { .. } => unreachable!(),
        };
        if let Some(byte) = byte {
            let rx = hw.transfer(byte);
            if self.slots[idx].response.len() < rx_len as usize {
                self.slots[idx].response.push(rx).ok();
            }
            self.cursor += 1;
            if self.cursor == tx_len {
                self.cursor = 0;
                self.phase = Phase::SimpleDummyRx;
            }
        } else {
            self.phase = Phase::SimpleDummyRx;
        }
        if self.phase == Phase::SimpleDummyRx {
            self.step_simple_dummy_rx(hw, queue);
        }
    }

    fn step_simple_dummy_rx<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let idx = self.queue_head as usize;
        let rx_len = match &self.slots[idx].trx {
            SpiMasterTrx::Simple { rx_len, .. } => *rx_len as usize,
            SpiMasterTrx::Framed { .. } => unreachable!(),
        };
        if self.slots[idx].response.len() < rx_len {
            let rx = hw.transfer(0);
            self.slots[idx].response.push(rx).ok();
        }
        if self.slots[idx].response.len() >= rx_len {
            self.finish(hw, queue, Outcome::Success);
        }
    }

    /// Exchange one byte during the request phase, verifying the slave
    /// echoes back [`llp::TYPE_RX_PROCESSING`]. Returns `None` (having
    /// already terminated the transfer) if it didn't.
    fn tx_byte_checked<const M: usize>(
        &mut self,
        hw: &mut impl SpiMasterHardware,
        queue: &mut EventQueue<M>,
        byte: u8,
    ) -> Option<()> {
        let echo = hw.transfer(byte);
        self.crc.update(byte);
        if echo != llp::TYPE_RX_PROCESSING {
            self.finish(hw, queue, Outcome::ErrSlaveNotReady);
            return None;
        }
        Some(())
    }

    fn step_framed_tx_type<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let request_type = match &self.slots[self.queue_head as usize].trx {
            SpiMasterTrx::Framed { request_type, .. } => *request_type,
            SpiMasterTrx::Simple { .. } => unreachable!(),
        };
        if self.tx_byte_checked(hw, queue, request_type).is_some() {
            self.phase = Phase::FramedTxSize;
            self.delay = config::LLP_TX_DELAY_STEPS;
        }
    }

    fn step_framed_tx_size<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let idx = self.queue_head as usize;
        let len = match &self.slots[idx].trx {
            SpiMasterTrx::Framed { payload, .. } => payload.len(),
            SpiMasterTrx::Simple { .. } => unreachable!(),
        };
        if self.tx_byte_checked(hw, queue, len as u8).is_some() {
            self.cursor = 0;
            self.phase = if len == 0 { Phase::FramedTxCrcHi } else { Phase::FramedTxPayload };
            self.delay = config::LLP_TX_DELAY_STEPS;
        }
    }

    fn step_framed_tx_payload<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let idx = self.queue_head as usize;
        let (byte, len) = match &self.slots[idx].trx {
            SpiMasterTrx::Framed { payload, .. } => (payload[self.cursor], payload.len()),
            SpiMasterTrx::Simple { .. } => unreachable!(),
        };
        if self.tx_byte_checked(hw, queue, byte).is_some() {
            self.cursor += 1;
            if self.cursor == len {
                self.phase = Phase::FramedTxCrcHi;
            }
            self.delay = config::LLP_TX_DELAY_STEPS;
        }
    }

    fn step_framed_tx_crc_hi<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let byte = self.crc.high();
        if self.tx_byte_checked(hw, queue, byte).is_some() {
            self.phase = Phase::FramedTxCrcLo;
            self.delay = config::LLP_TX_DELAY_STEPS;
        }
    }

    fn step_framed_tx_crc_lo<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let byte = self.crc.low();
        if self.tx_byte_checked(hw, queue, byte).is_some() {
            self.phase = Phase::FramedPolling;
            self.rx_delay_remaining = config::MAX_RX_DELAY;
            self.delay = config::LLP_RX_DELAY_STEPS;
        }
    }

    fn step_framed_polling<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let echo = hw.transfer(0);
        if echo == llp::TYPE_RX_PROCESSING {
            if self.rx_delay_remaining == 0 {
                self.finish(hw, queue, Outcome::ErrNoResponse);
            } else {
                self.rx_delay_remaining -= 1;
                self.delay = config::LLP_RX_DELAY_STEPS;
            }
            return;
        }
        if echo == llp::ERR_CRC_FAILURE {
            self.finish(hw, queue, Outcome::ErrCrcFailure);
            return;
        }
        if echo == llp::ERR_MESSAGE_TOO_LARGE {
            self.finish(hw, queue, Outcome::ErrMessageTooLarge);
            return;
        }
        if llp::is_error_type(echo) {
            self.finish(hw, queue, Outcome::ErrSlave);
            return;
        }
        self.slots[self.queue_head as usize].response_type = echo;
        self.crc = Crc16::new();
        self.crc.update(echo);
        self.cursor = 0;
        self.phase = Phase::FramedRxSize;
        self.delay = config::LLP_TX_DELAY_STEPS;
    }

    fn step_framed_rx_size<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let size = hw.transfer(0);
        self.crc.update(size);
        if size as usize > config::SPIM_BUF_CAP {
            self.finish(hw, queue, Outcome::ErrResponseTooLarge);
            return;
        }
        self.cursor = 0;
        self.phase = if size == 0 { Phase::FramedRxCrcHi } else { Phase::FramedRxPayload };
        self.delay = config::LLP_TX_DELAY_STEPS;
        // stash the expected length in the response buffer's target capacity
        // by pre-reserving nothing; length is re-derived from `size` each step
        self.slots[self.queue_head as usize].response.clear();
        self.rx_crc_hi = size; // reuse field to carry `size` across to payload steps
    }

    fn step_framed_rx_payload<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let size = self.rx_crc_hi as usize;
        let byte = hw.transfer(0);
        self.crc.update(byte);
        self.slots[self.queue_head as usize].response.push(byte).ok();
        self.cursor += 1;
        if self.cursor == size {
            self.phase = Phase::FramedRxCrcHi;
        }
        self.delay = config::LLP_TX_DELAY_STEPS;
    }

    fn step_framed_rx_crc_hi<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, _queue: &mut EventQueue<M>) {
        self.rx_crc_hi = hw.transfer(0);
        self.phase = Phase::FramedRxCrcLo;
        self.delay = config::LLP_TX_DELAY_STEPS;
    }

    fn step_framed_rx_crc_lo<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>) {
        let lo = hw.transfer(0);
        if self.rx_crc_hi == self.crc.high() && lo == self.crc.low() {
            self.finish(hw, queue, Outcome::Success);
        } else {
            self.finish(hw, queue, Outcome::ErrResponseCrcFailure);
        }
    }

    fn finish<const M: usize>(&mut self, hw: &mut impl SpiMasterHardware, queue: &mut EventQueue<M>, outcome: Outcome) {
        hw.deselect();
        let kind = match outcome {
            Outcome::Success => EVENT_SPIM_TRX_COMPLETED_SUCCESSFULLY,
            Outcome::ErrNoResponse => {
                log::warn!("spi master transfer aborted: no response from slave");
                EVENT_SPIM_ERR_NO_RESPONSE
            }
            Outcome::ErrSlaveNotReady => {
                log::warn!("spi master transfer aborted: slave not echoing RX_PROCESSING");
                EVENT_SPIM_ERR_SLAVE_NOT_READY
            }
            Outcome::ErrSlave => {
                log::warn!("spi master transfer aborted: slave reported an error response");
                EVENT_SPIM_ERR_SLAVE
            }
            Outcome::ErrCrcFailure => {
                log::warn!("spi master transfer aborted: slave rejected request CRC");
                EVENT_SPIM_ERR_CRC_FAILURE
            }
            Outcome::ErrMessageTooLarge => {
                log::warn!("spi master transfer aborted: slave rejected request as too large");
                EVENT_SPIM_ERR_MESSAGE_TOO_LARGE
            }
            Outcome::ErrResponseTooLarge => {
                log::warn!("spi master transfer aborted: response larger than local buffer");
                EVENT_SPIM_ERR_RESPONSE_TOO_LARGE
            }
            Outcome::ErrResponseCrcFailure => {
                log::warn!("spi master transfer aborted: response CRC mismatch");
                EVENT_SPIM_ERR_RESPONSE_CRC_FAILURE
            }
        };
        let head = self.queue_head as usize;
        let notify = self.slots[head].notify;
        let handle_idx = self.queue_head;
        self.slots[head].queued = false;
        self.slots[head].in_transmission = false;
        queue.push(Event::new(notify, kind, handle_idx as usize)).ok();
        let next = self.slots[head].next;
        self.push_free(self.queue_head);
        self.queue_head = next;
        if self.queue_head == NONE {
            self.queue_tail = NONE;
        }
        self.phase = Phase::Idle;
        self.delay = 0;
    }
}

impl<const N: usize> Default for SpiMaster<N> {
    fn default() -> Self {
        Self::new()
    }
}
