//! Compile-time configuration knobs.
//!
//! These are the defaults from the spec's external interfaces section.
//! Downstream crates are not required to use them: every type that needs a
//! capacity takes it as a const generic, so an application can instantiate a
//! [`crate::sched::Scheduler`] or [`crate::process::EventQueue`] with a
//! different size directly. These constants exist so `firmware` (and tests
//! exercising the spec's literal scenarios) have a single place to read the
//! documented defaults from.

/// Default task arena capacity for [`crate::sched::Scheduler`].
pub const SCHED_TASKS_MAX: usize = 8;

/// Default number of distinct process identities tracked by
/// [`crate::process::ProcessTable`].
pub const PROCESS_MAX: usize = 8;

/// Default event ring capacity for [`crate::process::EventQueue`].
/// Must be a power of two.
pub const EVENT_QUEUE_SIZE: usize = 16;

/// Default SPI slave receive buffer size. Must fit in `0..=255`.
pub const SPIS_RX_BUF_SIZE: usize = 255;

/// Upper bound on the number of handshake polls
/// [`crate::spi::SpiMaster`] will retry while the slave keeps echoing
/// `TYPE_RX_PROCESSING` before giving up on a framed response.
pub const MAX_RX_DELAY: u8 = 15;

/// Default ADC channel list capacity.
pub const ADC_LIST_MAX: usize = 8;

/// Default SPI master transmit queue capacity.
pub const SPIM_QUEUE_MAX: usize = 4;

/// Fixed capacity of the tx/rx byte buffers carried by a queued SPI master
/// transfer, Simple or Framed.
pub const SPIM_BUF_CAP: usize = 32;

/// Foreground `step()` calls the master waits between two bytes of a framed
/// exchange — the abstract, host-testable stand-in for `LLP_TX_DELAY`
/// (~25-30 us of real time on the wire).
pub const LLP_TX_DELAY_STEPS: u8 = 3;

/// Foreground `step()` calls the master waits after its last transmitted
/// byte, and between handshake polls, before checking the slave's response
/// — the stand-in for `LLP_RX_DELAY` (~40-50 us of real time).
pub const LLP_RX_DELAY_STEPS: u8 = 5;
