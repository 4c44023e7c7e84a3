//! Wires the `log` facade to USART0, busy-waiting one byte at a time. This
//! is the only consumer of `core`'s `log::warn!`/`log::error!` calls on
//! real hardware; host-side tests run under `env_logger` or just ignore
//! the records instead.

use core::fmt::Write;
use critical_section::Mutex;
use core::cell::RefCell;

struct Uart;

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
        for byte in s.as_bytes() {
            while dp.USART0.ucsr0a.read().udre0().bit_is_clear() {}
            dp.USART0.udr0.write(|w| w.bits(*byte));
        }
        Ok(())
    }
}

static UART: Mutex<RefCell<Uart>> = Mutex::new(RefCell::new(Uart));

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        critical_section::with(|cs| {
            let mut uart = UART.borrow_ref_mut(cs);
            let _ = writeln!(uart, "[{}] {}", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Configures baud 9600 at 16 MHz (`UBRR0 = 103`) and installs the global
/// logger. Must run before interrupts are enabled.
pub fn init() {
    let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
    const UBRR: u16 = 103;
    dp.USART0.ubrr0.write(|w| w.bits(UBRR));
    dp.USART0.ucsr0b.write(|w| w.txen0().set_bit());
    dp.USART0.ucsr0c.write(|w| w.ucsz0().chr8());

    log::set_logger(&LOGGER).ok();
    log::set_max_level(log::LevelFilter::Warn);
}
