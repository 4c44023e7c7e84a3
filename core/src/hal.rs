//! Hardware traits — the seams between the platform-agnostic runtime and the
//! board support package.
//!
//! Everything in this module is the "external collaborator" surface
//! mentioned throughout the component design: the runtime calls these
//! traits, but never implements them for real silicon itself. The `firmware`
//! crate provides AVR-backed implementations; tests provide fakes.

/// The clock's 8-bit hardware timer.
///
/// The runtime composes a 16-bit logical tick out of this counter's low byte
/// and a software-extended upper byte incremented on overflow.
pub trait ClockHardware {
    /// Current value of the free-running hardware counter.
    fn read_counter(&self) -> u8;
}

/// The scheduler's compare-match timer.
///
/// Width matches [`ClockHardware`]'s counter: an 8-bit compare register with
/// a 1024 prescaler, per the spec's external interface section.
pub trait TimerHardware {
    /// Current value of the free-running counter driving the compare match.
    fn counter(&self) -> u8;

    /// Value currently loaded into the compare register.
    fn compare(&self) -> u8;

    /// Reprogram the compare register.
    fn set_compare(&mut self, value: u8);

    /// The largest value the compare register can hold (`u8::MAX` for an
    /// 8-bit timer).
    fn max_compare(&self) -> u8 {
        u8::MAX
    }
}

/// The ADC peripheral: channel mux, free-running conversion and raw result
/// register.
pub trait AdcHardware {
    /// Program the multiplexer to sample `channel` (0-7) on the conversion
    /// after next. `None` selects the GND reference channel used to park the
    /// mux when no measurement is pending.
    fn set_channel(&mut self, channel: Option<u8>);

    /// Read the just-completed conversion's 10-bit result, right-adjusted.
    fn read_result(&self) -> u16;

    /// Disable the digital input buffer on `channel` to save power while it
    /// is used as an analog input.
    fn digital_input_disable(&mut self, channel: u8);

    /// Re-enable the digital input buffer on `channel`.
    fn digital_input_enable(&mut self, channel: u8);
}

/// The SPI peripheral operated as bus master.
pub trait SpiMasterHardware {
    /// Assert the slave-select line for the addressed device.
    fn select(&mut self);

    /// Release the slave-select line.
    fn deselect(&mut self);

    /// Shift `byte` out while simultaneously shifting a byte in, blocking
    /// until the hardware transfer-complete flag is set. This is the
    /// `tx_byte` + `wait_for_tx_complete` + `read_response_byte` sequence of
    /// the original firmware collapsed into one full-duplex call.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// The SPI peripheral operated as bus slave.
///
/// Unlike the master, the slave never chooses when a byte moves: the bus
/// master drives the clock. The slave only ever reacts to a
/// transfer-complete interrupt (by reading the byte it just received and
/// programming the next byte to shift out) and to the slave-select line
/// changing.
pub trait SpiSlaveHardware {
    /// Program the byte that will be shifted out on the *next* transfer.
    fn set_next_tx_byte(&mut self, byte: u8);

    /// `true` if the slave-select line is currently asserted (low).
    fn is_selected(&self) -> bool;
}
