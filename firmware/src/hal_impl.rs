//! AVR register backing for the `labpsu_core::hal` traits.
//!
//! Each type here is a zero-sized handle to one `avr_device::atmega328p`
//! peripheral, obtained via that peripheral's `steal()` wherever it's
//! needed — the standard avr-device pattern for register blocks that are
//! genuinely just memory-mapped addresses, not a uniquely owned resource,
//! so both the foreground loop and an interrupt handler can hold one
//! without fighting over move semantics. All register-level detail
//! (prescaler, mux bits, SPI clock polarity) lives in `main::init_peripherals`,
//! which programs the peripherals once at boot; these wrappers only do the
//! per-operation reads and writes the `core` traits ask for.

use avr_device::atmega328p::{ADC, PORTB, SPI, TC0, TC2};
use labpsu_core::hal::{AdcHardware, ClockHardware, SpiMasterHardware, SpiSlaveHardware, TimerHardware};

/// The SS line lives on PB2 on the board's SPI header.
const SS_BIT: u8 = 1 << 2;

/// Timer0's free-running counter, extended in software on overflow —
/// [`labpsu_core::clock::Clock`]'s time base.
pub struct Timer0Clock(pub TC0);

impl ClockHardware for Timer0Clock {
    fn read_counter(&self) -> u8 {
        self.0.tcnt0.read().bits()
    }
}

/// Timer2's free-running counter and compare register, dedicated to the
/// scheduler's compare-match interrupt — a separate 8-bit peripheral from
/// the one backing [`Timer0Clock`], matching the original firmware's split
/// between the free-running clock and the scheduler's own timer.
pub struct Timer2Compare(pub TC2);

impl TimerHardware for Timer2Compare {
    fn counter(&self) -> u8 {
        self.0.tcnt2.read().bits()
    }

    fn compare(&self) -> u8 {
        self.0.ocr2a.read().bits()
    }

    fn set_compare(&mut self, value: u8) {
        self.0.ocr2a.write(|w| w.bits(value));
    }
}

pub struct Adc(pub ADC);

impl AdcHardware for Adc {
    fn set_channel(&mut self, channel: Option<u8>) {
        // GND (ADC channel 0b1111 on the 328P) parks the mux when nothing
        // is pending, matching `core::adc`'s use of `None` for the same.
        let mux = channel.unwrap_or(0b1111);
        self.0.admux.modify(|_, w| w.mux().bits(mux));
    }

    fn read_result(&self) -> u16 {
        // ADLAR is left cleared at init, so the 10-bit result is
        // right-adjusted across ADCL:ADCH, low byte first per the
        // datasheet's required read order.
        let lo = self.0.adcl.read().bits() as u16;
        let hi = self.0.adch.read().bits() as u16;
        (hi << 8) | lo
    }

    fn digital_input_disable(&mut self, channel: u8) {
        self.0.didr0.modify(|r, w| unsafe { w.bits(r.bits() | (1 << channel)) });
    }

    fn digital_input_enable(&mut self, channel: u8) {
        self.0.didr0.modify(|r, w| unsafe { w.bits(r.bits() & !(1 << channel)) });
    }
}

pub struct SpiMaster {
    pub spi: SPI,
    pub portb: PORTB,
}

impl SpiMasterHardware for SpiMaster {
    fn select(&mut self) {
        self.portb.portb.modify(|r, w| unsafe { w.bits(r.bits() & !SS_BIT) });
    }

    fn deselect(&mut self) {
        self.portb.portb.modify(|r, w| unsafe { w.bits(r.bits() | SS_BIT) });
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        self.spi.spdr.write(|w| w.bits(byte));
        while self.spi.spsr.read().spif().bit_is_clear() {}
        self.spi.spdr.read().bits()
    }
}

pub struct SpiSlave {
    pub spi: SPI,
    pub portb: PORTB,
}

impl SpiSlaveHardware for SpiSlave {
    fn set_next_tx_byte(&mut self, byte: u8) {
        self.spi.spdr.write(|w| w.bits(byte));
    }

    fn is_selected(&self) -> bool {
        self.portb.pinb.read().bits() & SS_BIT == 0
    }
}
