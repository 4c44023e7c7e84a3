//! The foreground driver loop — the single interior-mutable region the
//! firmware's `main` drives, bundling every component behind one struct so
//! interrupt handlers and the foreground loop share state through plain
//! field access guarded by the caller's own critical sections.
//!
//! `Runtime` does not hide [`Scheduler`], [`AdcEngine`], [`SpiMaster`] or
//! [`SpiSlave`] behind its own API — ISRs call straight into them. What it
//! adds is the two calls a cooperative foreground loop actually needs:
//! [`Runtime::exec_one_task`] to run the next due scheduler callback, and
//! [`Runtime::dispatch_one_event`] to pop one event, let built-in engines
//! react to their own private bookkeeping kinds, and hand the event back so
//! application processes can route it to their own `resume`.

use crate::adc::{self, AdcEngine};
use crate::process::{Event, EventQueue, ProcessError, ProcessTable};
use crate::sched::{ExecStatus, Scheduler};
use crate::spi::{SpiMaster, SpiSlave};

pub struct Runtime<const TASKS: usize, const EVENTS: usize, const PROCESSES: usize, const ADC: usize, const SPIM: usize, const SPIS_BUF: usize> {
    pub scheduler: Scheduler<TASKS>,
    pub processes: ProcessTable<PROCESSES>,
    pub events: EventQueue<EVENTS>,
    pub adc: AdcEngine<ADC>,
    pub spi_master: SpiMaster<SPIM>,
    pub spi_slave: SpiSlave<SPIS_BUF>,
    adc_process: u8,
}

impl<const TASKS: usize, const EVENTS: usize, const PROCESSES: usize, const ADC: usize, const SPIM: usize, const SPIS_BUF: usize>
    Runtime<TASKS, EVENTS, PROCESSES, ADC, SPIM, SPIS_BUF>
{
    /// `adc_process` and `spi_slave_owner` are the process identities the
    /// ADC engine and SPI slave responder notify of their own lifecycle
    /// events (list-changed, message-received); they are ordinary entries
    /// in `processes` like any application process.
    pub fn new(adc_process: u8, spi_slave_owner: u8) -> Self {
        Runtime {
            scheduler: Scheduler::new(),
            processes: ProcessTable::new(),
            events: EventQueue::new(),
            adc: AdcEngine::new(),
            spi_master: SpiMaster::new(),
            spi_slave: SpiSlave::new(spi_slave_owner),
            adc_process,
        }
    }

    pub fn start(&mut self, process: u8) -> Result<(), ProcessError> {
        self.processes.start(process, &mut self.events)
    }

    pub fn stop(&mut self, process: u8) -> Result<(), ProcessError> {
        self.processes.stop(process)
    }

    pub fn post(&mut self, event: Event) -> Result<(), ProcessError> {
        self.processes.post(event, &mut self.events)
    }

    /// Run the next due scheduler callback, if any.
    pub fn exec_one_task(&mut self) -> ExecStatus {
        self.scheduler.exec()
    }

    /// Pop one pending event. Engine-private kinds (ADC list-changed,
    /// conversion-complete) are handled here and never need a matching
    /// `resume` arm in application code; every popped event, including
    /// those, is still returned so the caller can route it to the right
    /// process or simply observe it in a test.
    pub fn dispatch_one_event(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        match event.kind {
            adc::EVENT_ADC_LIST_CHANGED => self.adc.handle_list_changed(),
            adc::EVENT_ADC_CONVERSION_COMPLETE => {
                self.adc.handle_completed_conversion(event.data as u8, &mut self.events)
            }
            _ => {}
        }
        Some(event)
    }

    /// `true` once both the ready task queue and the event ring are empty —
    /// the point at which the foreground loop would put the MCU to sleep
    /// until the next interrupt.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle() && self.events.is_empty()
    }

    pub fn adc_process(&self) -> u8 {
        self.adc_process
    }
}
