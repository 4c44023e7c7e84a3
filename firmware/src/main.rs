//! `labpsu-firmware` — the AVR board-support binary.
//!
//! Everything that reasons about schedules, events, ADC measurements or the
//! SPI protocol lives in `labpsu_core`; this crate only owns the registers.
//! Interrupt vectors here do the minimum register-level work (read the data
//! that caused the interrupt, hand it to `core`) and return — all of the
//! actual state machine logic runs either inside that call or, for
//! non-time-critical follow-up, in `main`'s foreground loop.

#![no_std]
#![no_main]

mod hal_impl;
mod logger;

use core::cell::RefCell;
use critical_section::Mutex;
use labpsu_core::adc::EVENT_ADC_MEASUREMENT_COMPLETED;
use labpsu_core::spi::slave::EVENT_SPIS_MESSAGE_RECEIVED;
use labpsu_core::Clock;
use labpsu_core::Event;
use labpsu_core::Runtime;

/// Process identities. Assigned by this binary, not by `core` — the
/// runtime only ever sees small integers.
const PROCESS_ADC: u8 = 0;
const PROCESS_SPI_SLAVE: u8 = 1;
const PROCESS_CONTROL_LOOP: u8 = 2;

type Fleet = Runtime<8, 16, 8, 8, 4, 255>;

static RUNTIME: Mutex<RefCell<Option<Fleet>>> = Mutex::new(RefCell::new(None));
static CLOCK: Mutex<RefCell<Option<Clock<hal_impl::Timer0Clock>>>> = Mutex::new(RefCell::new(None));

#[avr_device::entry]
fn main() -> ! {
    let dp = avr_device::atmega328p::Peripherals::take().unwrap();
    logger::init();

    let mut rt = Fleet::new(PROCESS_ADC, PROCESS_SPI_SLAVE);
    rt.start(PROCESS_ADC).ok();
    rt.start(PROCESS_SPI_SLAVE).ok();
    rt.start(PROCESS_CONTROL_LOOP).ok();

    init_peripherals(&dp);
    let clock = Clock::new(hal_impl::Timer0Clock(dp.TC0));

    critical_section::with(|cs| {
        *RUNTIME.borrow_ref_mut(cs) = Some(rt);
        *CLOCK.borrow_ref_mut(cs) = Some(clock);
    });

    unsafe { avr_device::interrupt::enable() };

    loop {
        let event = critical_section::with(|cs| {
            let mut slot = RUNTIME.borrow_ref_mut(cs);
            let rt = slot.as_mut().unwrap();
            rt.exec_one_task();
            rt.dispatch_one_event()
        });
        if let Some(event) = event {
            route_event(event);
        }
        // A real board would `sleep_mode()` here once both the scheduler and
        // event queue report idle; left out since it needs its own register
        // sequence unrelated to `core`.
    }
}

/// React to an event `core`'s own engines didn't already fully consume.
/// Runs outside the critical section that popped it so a slow response
/// (logging, the placeholder SPI reply below) doesn't extend the time
/// interrupts stay masked.
fn route_event(event: Event) {
    match event.kind {
        EVENT_ADC_MEASUREMENT_COMPLETED => {
            log::debug!("measurement ready for channel slot {}", event.data);
        }
        EVENT_SPIS_MESSAGE_RECEIVED => {
            critical_section::with(|cs| {
                let mut slot = RUNTIME.borrow_ref_mut(cs);
                let rt = slot.as_mut().unwrap();
                let (request_type, payload) = rt.spi_slave.received();
                log::debug!("spi request type {} len {}", request_type, payload.len());
                // The control-loop process decides how to answer in a full
                // build; this placeholder reply just keeps the slave state
                // machine from stalling while that logic is out of scope
                // for this repo's bench-controller core.
                let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
                let mut hw = hal_impl::SpiSlave { spi: dp.SPI, portb: dp.PORTB };
                rt.spi_slave.send_response(&mut hw, request_type, &[]).ok();
            });
        }
        _ => {}
    }
}

fn init_peripherals(dp: &avr_device::atmega328p::Peripherals) {
    // Timer0: free-running, no output compare, used only for the software-
    // extended clock. Prescaler 1024 to match the scheduler's tick period.
    dp.TC0.tccr0b.write(|w| w.cs0().prescale_1024());
    dp.TC0.timsk0.write(|w| w.toie0().set_bit());

    // Timer2: free-running with output compare A driving the scheduler's
    // interrupt, same 1024 prescaler so both timers share one tick length.
    dp.TC2.tccr2b.write(|w| w.cs2().prescale_1024());
    dp.TC2.timsk2.write(|w| w.ocie2a().set_bit());

    // ADC: AREF reference, free-running trigger, prescaler 128 for a clock
    // within spec at a 16 MHz system clock.
    dp.ADC.adcsra.write(|w| w.aden().set_bit().adate().set_bit().adps().prescaler_128());
    dp.ADC.adcsrb.write(|w| w.adts().free_running());

    // SPI: slave mode, MSB first, mode 0, interrupt-driven. This board is
    // the bench controller's peripheral side of the link, answering the
    // host rather than polling one of its own.
    dp.SPI.spcr.write(|w| w.spe().set_bit().spie().set_bit());
    dp.PORTB.ddrb.modify(|r, w| unsafe { w.bits(r.bits() & !(1 << 2)) });

    // PCINT0 watches PB2 (SS) so the slave state machine learns about a
    // deselect even when no further byte is clocked in to tell it.
    dp.EXINT.pcicr.write(|w| w.pcie0().set_bit());
    dp.EXINT.pcmsk0.write(|w| w.pcint2().set_bit());
}

#[avr_device::interrupt(atmega328p)]
fn TIMER0_OVF() {
    critical_section::with(|cs| {
        if let Some(clock) = CLOCK.borrow_ref(cs).as_ref() {
            clock.on_overflow();
        }
    });
}

#[avr_device::interrupt(atmega328p)]
fn TIMER2_COMPA() {
    critical_section::with(|cs| {
        let mut slot = RUNTIME.borrow_ref_mut(cs);
        if let Some(rt) = slot.as_mut() {
            let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
            let mut hw = hal_impl::Timer2Compare(dp.TC2);
            rt.scheduler.on_compare_match(&mut hw);
        }
    });
}

#[avr_device::interrupt(atmega328p)]
fn ADC() {
    critical_section::with(|cs| {
        let mut slot = RUNTIME.borrow_ref_mut(cs);
        if let Some(rt) = slot.as_mut() {
            let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
            let mut hw = hal_impl::Adc(dp.ADC);
            let adc_process = rt.adc_process();
            rt.adc.on_conversion_complete(&mut hw, adc_process, &mut rt.events);
        }
    });
}

#[avr_device::interrupt(atmega328p)]
fn SPI_STC() {
    critical_section::with(|cs| {
        let mut slot = RUNTIME.borrow_ref_mut(cs);
        if let Some(rt) = slot.as_mut() {
            let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
            let data = dp.SPI.spdr.read().bits();
            let mut hw = hal_impl::SpiSlave { spi: dp.SPI, portb: dp.PORTB };
            rt.spi_slave.on_transfer_complete(&mut hw, data, &mut rt.events);
        }
    });
}

#[avr_device::interrupt(atmega328p)]
fn PCINT0() {
    critical_section::with(|cs| {
        let mut slot = RUNTIME.borrow_ref_mut(cs);
        if let Some(rt) = slot.as_mut() {
            let dp = unsafe { avr_device::atmega328p::Peripherals::steal() };
            if dp.PORTB.pinb.read().bits() & (1 << 2) != 0 {
                let mut hw = hal_impl::SpiSlave { spi: dp.SPI, portb: dp.PORTB };
                rt.spi_slave.on_ss_rising_edge(&mut hw, &mut rt.events);
            }
        }
    });
}

use panic_halt as _;
