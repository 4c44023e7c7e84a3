//! Shared fake hardware used by the integration tests in this directory.
//! The per-module `#[cfg(test)]` blocks each keep their own narrowly
//! scoped fakes; this file is for scenarios that exercise more than one
//! component together, the way `firmware`'s foreground loop would.

use labpsu_core::hal::{AdcHardware, SpiMasterHardware, SpiSlaveHardware};
use labpsu_core::process::EventQueue;
use labpsu_core::spi::llp;
use labpsu_core::spi::SpiSlave;

/// An ADC that always reports the same raw conversion result and records
/// which channels currently have their digital input buffer disabled.
pub struct FakeAdc {
    pub result: u16,
    pub digital_disabled: [bool; 8],
}

impl FakeAdc {
    pub fn new(result: u16) -> Self {
        FakeAdc { result, digital_disabled: [false; 8] }
    }
}

impl AdcHardware for FakeAdc {
    fn set_channel(&mut self, _channel: Option<u8>) {}
    fn read_result(&self) -> u16 {
        self.result
    }
    fn digital_input_disable(&mut self, channel: u8) {
        self.digital_disabled[channel as usize] = true;
    }
    fn digital_input_enable(&mut self, channel: u8) {
        self.digital_disabled[channel as usize] = false;
    }
}

/// The slave side's shift register: holds whatever byte was last armed by
/// `set_next_tx_byte`, which is what the next clock actually puts on MISO.
pub struct SlaveShiftRegister {
    pending: u8,
}

impl SlaveShiftRegister {
    pub fn new() -> Self {
        SlaveShiftRegister { pending: llp::TYPE_RX_PROCESSING }
    }
}

impl SpiSlaveHardware for SlaveShiftRegister {
    fn set_next_tx_byte(&mut self, byte: u8) {
        self.pending = byte;
    }
    fn is_selected(&self) -> bool {
        true
    }
}

/// Bridges a real [`labpsu_core::spi::SpiMaster`]'s byte-at-a-time
/// `transfer()` calls to a real [`SpiSlave`], the way two physically wired
/// boards' MOSI/MISO/SCK lines would: each clock simultaneously delivers
/// the master's outgoing byte to the slave and returns whatever the slave
/// had already loaded into its shift register from the previous clock.
/// SS is not modeled here — tests that need an SS-rising-edge call
/// `slave.on_ss_rising_edge` directly, mirroring how that's a separate
/// pin-change interrupt on real silicon, not something `transfer()` sees.
pub struct Wire<'a, const SBUF: usize, const EVQ: usize> {
    pub slave: &'a mut SpiSlave<SBUF>,
    pub slave_hw: &'a mut SlaveShiftRegister,
    pub slave_queue: &'a mut EventQueue<EVQ>,
}

impl<'a, const SBUF: usize, const EVQ: usize> SpiMasterHardware for Wire<'a, SBUF, EVQ> {
    fn select(&mut self) {}
    fn deselect(&mut self) {}
    fn transfer(&mut self, byte: u8) -> u8 {
        let echoed = self.slave_hw.pending;
        self.slave.on_transfer_complete(self.slave_hw, byte, self.slave_queue);
        echoed
    }
}
