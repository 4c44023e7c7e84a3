//! Hardware-agnostic core of the lab bench power supply controller
//! firmware: a tick scheduler, a cooperative process/event framework, an
//! ADC acquisition engine, and an SPI master/slave link-layer protocol.
//!
//! Every subsystem is generic over a small [`hal`] trait and touches no
//! register directly, so it builds and runs its test suite on the host.
//! The `firmware` crate wires these traits to real AVR peripherals.

#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod clock;
pub mod config;
pub mod crc16;
pub mod hal;
pub mod process;
pub mod runtime;
pub mod sched;
pub mod spi;
pub mod tick;

pub use clock::Clock;
pub use process::{Event, EventQueue, Process, ProcessTable};
pub use runtime::Runtime;
pub use sched::Scheduler;
pub use tick::Tick;
