//! Component F — the SPI slave link-layer protocol responder.
//!
//! Exactly one transfer is in flight. [`SpiSlave::on_transfer_complete`] is
//! the hardware transfer-complete interrupt: it consumes the byte the
//! master just clocked in and programs the byte that goes out on the
//! following clock, advancing a twelve-state machine. The CRC over an
//! outgoing response is computed once, up front, in [`SpiSlave::send_response`]
//! rather than incrementally per transmitted byte — the accumulate-as-you-go
//! approach is what let the original firmware's CRC go stale mid-payload.

use crate::crc16::Crc16;
use crate::hal::SpiSlaveHardware;
use crate::process::{Event, EventKind, EventQueue};
use crate::spi::llp;

pub const EVENT_SPIS_MESSAGE_RECEIVED: EventKind = 30;
pub const EVENT_SPIS_RESPONSE_TRANSMITTED: EventKind = 31;
pub const EVENT_SPIS_RESPONSE_ERROR: EventKind = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpisError {
    /// `send_response` called outside `WaitCallback`, or the in-flight
    /// transfer was aborted by the master before the client replied.
    NoTrxInProgress,
    InvalidType,
    MessageTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Ready,
    RxSize,
    RxPayload,
    RxFooter0,
    RxFooter1,
    WaitCallback,
    TxSize,
    TxPayload,
    TxFooter0,
    TxFooter1,
    Completed,
    Draining,
    AbortedAwaitingCallback,
}

pub struct SpiSlave<const N: usize> {
    state: SlaveState,
    owner: u8,
    rx_type: u8,
    rx_len: u8,
    rx_received: u16,
    rx_buf: heapless::Vec<u8, N>,
    rx_crc: Crc16,
    rx_footer_hi: u8,
    tx_buf: heapless::Vec<u8, N>,
    tx_cursor: usize,
    tx_crc_hi: u8,
    tx_crc_lo: u8,
}

impl<const N: usize> SpiSlave<N> {
    pub fn new(owner: u8) -> Self {
        SpiSlave {
            state: SlaveState::Ready,
            owner,
            rx_type: 0,
            rx_len: 0,
            rx_received: 0,
            rx_buf: heapless::Vec::new(),
            rx_crc: Crc16::new(),
            rx_footer_hi: 0,
            tx_buf: heapless::Vec::new(),
            tx_cursor: 0,
            tx_crc_hi: 0,
            tx_crc_lo: 0,
        }
    }

    /// The most recently received request: `(type, payload)`. Valid once a
    /// `EVENT_SPIS_MESSAGE_RECEIVED` has been observed for it.
    pub fn received(&self) -> (u8, &[u8]) {
        (self.rx_type, &self.rx_buf)
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state == SlaveState::WaitCallback
    }

    fn end_transfer(&mut self, hw: &mut impl SpiSlaveHardware, code: u8) {
        hw.set_next_tx_byte(code);
        self.state = SlaveState::Draining;
    }

    /// The hardware transfer-complete interrupt. `data` is the byte the
    /// master just clocked in.
    pub fn on_transfer_complete<const M: usize>(
        &mut self,
        hw: &mut impl SpiSlaveHardware,
        data: u8,
        queue: &mut EventQueue<M>,
    ) {
        match self.state {
            SlaveState::Ready => {
                self.rx_type = data;
                self.rx_crc = Crc16::new();
                self.rx_crc.update(data);
                hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                self.state = SlaveState::RxSize;
            }
            SlaveState::RxSize => {
                self.rx_len = data;
                self.rx_received = 0;
                self.rx_buf.clear();
                self.rx_crc.update(data);
                if self.rx_len as usize > N {
                    log::warn!("spi slave rejected request of {} bytes, buffer holds {}", self.rx_len, N);
                    self.end_transfer(hw, llp::ERR_MESSAGE_TOO_LARGE);
                } else {
                    hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                    self.state = if data == 0 { SlaveState::RxFooter0 } else { SlaveState::RxPayload };
                }
            }
            SlaveState::RxPayload => {
                self.rx_crc.update(data);
                if self.rx_buf.len() < N {
                    self.rx_buf.push(data).ok();
                }
                self.rx_received += 1;
                hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                if self.rx_received == self.rx_len as u16 {
                    self.state = SlaveState::RxFooter0;
                }
            }
            SlaveState::RxFooter0 => {
                self.rx_footer_hi = data;
                if self.rx_footer_hi != self.rx_crc.high() {
                    log::warn!("spi slave rejected request: CRC mismatch");
                    self.end_transfer(hw, llp::ERR_CRC_FAILURE);
                } else {
                    hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                    self.state = SlaveState::RxFooter1;
                }
            }
            SlaveState::RxFooter1 => {
                if data != self.rx_crc.low() {
                    log::warn!("spi slave rejected request: CRC mismatch");
                    self.end_transfer(hw, llp::ERR_CRC_FAILURE);
                } else {
                    hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                    self.state = SlaveState::WaitCallback;
                    queue
                        .push(Event::new(self.owner, EVENT_SPIS_MESSAGE_RECEIVED, self.rx_type as usize))
                        .ok();
                }
            }
            SlaveState::WaitCallback => {
                hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
            }
            SlaveState::TxSize => {
                hw.set_next_tx_byte(self.tx_buf.len() as u8);
                self.tx_cursor = 0;
                self.state = if self.tx_buf.is_empty() { SlaveState::TxFooter0 } else { SlaveState::TxPayload };
            }
            SlaveState::TxPayload => {
                hw.set_next_tx_byte(self.tx_buf[self.tx_cursor]);
                self.tx_cursor += 1;
                if self.tx_cursor == self.tx_buf.len() {
                    self.state = SlaveState::TxFooter0;
                }
            }
            SlaveState::TxFooter0 => {
                hw.set_next_tx_byte(self.tx_crc_hi);
                self.state = SlaveState::TxFooter1;
            }
            SlaveState::TxFooter1 => {
                hw.set_next_tx_byte(self.tx_crc_lo);
                self.state = SlaveState::Completed;
            }
            SlaveState::Completed => {
                hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
                self.state = SlaveState::Ready;
                queue.push(Event::new(self.owner, EVENT_SPIS_RESPONSE_TRANSMITTED, 0)).ok();
            }
            SlaveState::Draining => {
                hw.set_next_tx_byte(0);
            }
            SlaveState::AbortedAwaitingCallback => {
                // No transfer is actually in progress; a stray clock here
                // would indicate a hardware/SS wiring fault, not a protocol
                // event. Nothing to do.
            }
        }
    }

    /// The SS-rising-edge interrupt: the master released the bus, whether
    /// or not the exchange had finished.
    pub fn on_ss_rising_edge<const M: usize>(&mut self, hw: &mut impl SpiSlaveHardware, queue: &mut EventQueue<M>) {
        match self.state {
            SlaveState::WaitCallback => {
                queue.push(Event::new(self.owner, EVENT_SPIS_RESPONSE_ERROR, 0)).ok();
                self.state = SlaveState::AbortedAwaitingCallback;
            }
            SlaveState::TxSize
            | SlaveState::TxPayload
            | SlaveState::TxFooter0
            | SlaveState::TxFooter1
            | SlaveState::Completed => {
                queue.push(Event::new(self.owner, EVENT_SPIS_RESPONSE_ERROR, 0)).ok();
                self.state = SlaveState::Ready;
            }
            _ => self.state = SlaveState::Ready,
        }
        hw.set_next_tx_byte(llp::TYPE_RX_PROCESSING);
    }

    /// The client's reply to a received message. Only valid while
    /// [`SpiSlave::is_awaiting_response`] is `true`.
    pub fn send_response(
        &mut self,
        hw: &mut impl SpiSlaveHardware,
        response_type: u8,
        payload: &[u8],
    ) -> Result<(), SpisError> {
        if self.state == SlaveState::AbortedAwaitingCallback {
            log::warn!("send_response called after master aborted the transfer");
            self.state = if hw.is_selected() { SlaveState::Draining } else { SlaveState::Ready };
            return Err(SpisError::NoTrxInProgress);
        }
        if self.state != SlaveState::WaitCallback {
            log::warn!("send_response called with no transfer awaiting a reply");
            return Err(SpisError::NoTrxInProgress);
        }
        if response_type == llp::TYPE_RX_PROCESSING || llp::is_error_type(response_type) {
            log::warn!("send_response rejected reserved response type {}", response_type);
            return Err(SpisError::InvalidType);
        }
        if payload.len() > N {
            log::warn!("send_response rejected {}-byte payload, buffer holds {}", payload.len(), N);
            return Err(SpisError::MessageTooLarge);
        }
        self.tx_buf.clear();
        self.tx_buf.extend_from_slice(payload).ok();
        let mut crc = Crc16::new();
        crc.update(response_type);
        crc.update(payload.len() as u8);
        crc.update_all(payload);
        self.tx_crc_hi = crc.high();
        self.tx_crc_lo = crc.low();
        hw.set_next_tx_byte(response_type);
        self.state = SlaveState::TxSize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHw {
        selected: bool,
        programmed: heapless::Vec<u8, 32>,
    }

    impl FakeHw {
        fn new() -> Self {
            FakeHw { selected: true, programmed: heapless::Vec::new() }
        }
    }

    impl SpiSlaveHardware for FakeHw {
        fn set_next_tx_byte(&mut self, byte: u8) {
            self.programmed.push(byte).ok();
        }
        fn is_selected(&self) -> bool {
            self.selected
        }
    }

    fn request_frame(request_type: u8, payload: &[u8]) -> heapless::Vec<u8, 32> {
        let mut crc = Crc16::new();
        crc.update(request_type);
        crc.update(payload.len() as u8);
        crc.update_all(payload);
        let mut frame = heapless::Vec::new();
        frame.push(request_type).ok();
        frame.push(payload.len() as u8).ok();
        for &b in payload {
            frame.push(b).ok();
        }
        frame.push(crc.high()).ok();
        frame.push(crc.low()).ok();
        frame
    }

    #[test]
    fn full_round_trip_delivers_message_and_transmits_reply() {
        let mut hw = FakeHw::new();
        let mut slave: SpiSlave<16> = SpiSlave::new(4);
        let mut queue: EventQueue<8> = EventQueue::new();

        for byte in request_frame(1, &[10, 20, 30]) {
            slave.on_transfer_complete(&mut hw, byte, &mut queue);
        }
        let event = queue.pop().unwrap();
        assert_eq!(event.kind, EVENT_SPIS_MESSAGE_RECEIVED);
        assert_eq!(slave.received(), (1, &[10, 20, 30][..]));
        assert!(slave.is_awaiting_response());

        slave.send_response(&mut hw, 2, &[1, 2]).unwrap();
        // One dummy clock per remaining response byte: size, payload x2, crc x2.
        for _ in 0..5 {
            slave.on_transfer_complete(&mut hw, 0, &mut queue);
        }
        let event = queue.pop().unwrap();
        assert_eq!(event.kind, EVENT_SPIS_RESPONSE_TRANSMITTED);
    }

    #[test]
    fn oversized_request_is_rejected_immediately_after_the_size_byte() {
        let mut hw = FakeHw::new();
        let mut slave: SpiSlave<4> = SpiSlave::new(0);
        let mut queue: EventQueue<8> = EventQueue::new();

        slave.on_transfer_complete(&mut hw, 1, &mut queue); // type
        slave.on_transfer_complete(&mut hw, 8, &mut queue); // size, exceeds capacity 4
        assert_eq!(*hw.programmed.last().unwrap(), llp::ERR_MESSAGE_TOO_LARGE);
        assert!(slave.rx_buf.is_empty(), "no payload byte should ever be drained into rx_buf");

        // Further clocks while draining are ignored, not reinterpreted as a
        // fresh request.
        slave.on_transfer_complete(&mut hw, 99, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn crc_high_byte_mismatch_is_rejected_before_the_low_byte_is_clocked_in() {
        let mut hw = FakeHw::new();
        let mut slave: SpiSlave<16> = SpiSlave::new(0);
        let mut queue: EventQueue<8> = EventQueue::new();

        let mut frame = request_frame(1, &[10, 20]);
        frame.pop().unwrap(); // drop the low CRC byte; it must never be needed
        *frame.last_mut().unwrap() ^= 0xFF; // corrupt the high CRC byte

        for byte in &frame {
            slave.on_transfer_complete(&mut hw, *byte, &mut queue);
        }
        assert_eq!(*hw.programmed.last().unwrap(), llp::ERR_CRC_FAILURE);
        assert!(queue.is_empty());
    }

    #[test]
    fn ss_rising_while_awaiting_callback_aborts_and_blocks_late_response() {
        let mut hw = FakeHw::new();
        let mut slave: SpiSlave<16> = SpiSlave::new(0);
        let mut queue: EventQueue<8> = EventQueue::new();

        for byte in request_frame(1, &[]) {
            slave.on_transfer_complete(&mut hw, byte, &mut queue);
        }
        queue.pop().unwrap();
        slave.on_ss_rising_edge(&mut hw, &mut queue);
        assert_eq!(queue.pop().unwrap().kind, EVENT_SPIS_RESPONSE_ERROR);

        hw.selected = false;
        let result = slave.send_response(&mut hw, 2, &[]);
        assert_eq!(result, Err(SpisError::NoTrxInProgress));
    }
}
