//! Component C — the cooperative process/event framework.
//!
//! A process is any type implementing [`Process`]; it encodes its resume
//! point as a plain state field and reacts to events synchronously inside
//! [`Process::resume`] — the safe-Rust shape of a stackless protothread.
//! This module only provides the bookkeeping every process shares: a
//! start/stop identity table and a bounded FIFO of pending events. Routing a
//! popped event to the right process's `resume` is a handful of concrete
//! processes known statically, so it is a plain match in the aggregate
//! runtime rather than a table of trait objects here.

/// Opaque payload carried by an event, unexamined by the framework itself.
pub type EventData = usize;

/// Application-defined event discriminant.
pub type EventKind = u8;

/// Posted to a process immediately after [`ProcessTable::start`] succeeds,
/// before any other event can reach it.
pub const EVENT_INIT: EventKind = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub target: u8,
    pub kind: EventKind,
    pub data: EventData,
}

impl Event {
    pub const fn new(target: u8, kind: EventKind, data: EventData) -> Self {
        Event { target, kind, data }
    }
}

/// A cooperative process: reacts to one event at a time and returns control
/// immediately. Long-running waits are expressed by storing a resume state
/// in `self` and matching on it at the top of `resume`, not by blocking.
pub trait Process {
    fn resume(&mut self, event: Event);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// `start` was called for a process identity that is already running.
    AlreadyStarted,
    /// `stop` or `post` targeted a process identity that is not running.
    NotStarted,
    /// The event queue had no room left.
    QueueFull,
}

/// Tracks which of up to `N` process identities are currently running.
/// Identities are small integers the application assigns meaning to (e.g.
/// "the ADC process is identity 0").
pub struct ProcessTable<const N: usize> {
    started: [bool; N],
}

impl<const N: usize> ProcessTable<N> {
    pub const fn new() -> Self {
        ProcessTable { started: [false; N] }
    }

    /// Mark `id` as running and enqueue its [`EVENT_INIT`] event. Fails
    /// without enqueueing anything if `id` is already started or the queue
    /// is full.
    pub fn start<const M: usize>(
        &mut self,
        id: u8,
        queue: &mut EventQueue<M>,
    ) -> Result<(), ProcessError> {
        if self.started[id as usize] {
            log::warn!("start() called for already-running process {}", id);
            return Err(ProcessError::AlreadyStarted);
        }
        queue.push(Event::new(id, EVENT_INIT, 0)).map_err(|_| {
            log::error!("event queue full, process {} failed to start", id);
            ProcessError::QueueFull
        })?;
        self.started[id as usize] = true;
        Ok(())
    }

    /// Mark `id` as stopped. Events already queued for it are delivered and
    /// silently ignored by [`ProcessTable::post`]'s callers once popped —
    /// this table only gates new posts.
    pub fn stop(&mut self, id: u8) -> Result<(), ProcessError> {
        if !self.started[id as usize] {
            log::warn!("stop() called for process {} that is not running", id);
            return Err(ProcessError::NotStarted);
        }
        self.started[id as usize] = false;
        Ok(())
    }

    pub fn is_started(&self, id: u8) -> bool {
        self.started[id as usize]
    }

    /// Enqueue `event` for its target, rejecting events for processes that
    /// are not running.
    pub fn post<const M: usize>(
        &self,
        event: Event,
        queue: &mut EventQueue<M>,
    ) -> Result<(), ProcessError> {
        if !self.started[event.target as usize] {
            log::warn!("post() dropped event kind {} for stopped process {}", event.kind, event.target);
            return Err(ProcessError::NotStarted);
        }
        queue.push(event).map_err(|_| {
            log::error!("event queue full, dropped event kind {} for process {}", event.kind, event.target);
            ProcessError::QueueFull
        })
    }
}

impl<const N: usize> Default for ProcessTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded FIFO of pending events. Capacity `N` must be a power of two.
pub struct EventQueue<const N: usize> {
    buf: [Event; N],
    head: usize,
    tail: usize,
    len: usize,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        assert!(N != 0 && (N & (N - 1)) == 0, "event queue capacity must be a power of two");
        const EMPTY: Event = Event::new(0, 0, 0);
        EventQueue { buf: [EMPTY; N], head: 0, tail: 0, len: 0 }
    }

    pub fn push(&mut self, event: Event) -> Result<(), ()> {
        if self.len == N {
            return Err(());
        }
        self.buf[self.tail] = event;
        self.tail = (self.tail + 1) & (N - 1);
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let event = self.buf[self.head];
        self.head = (self.head + 1) & (N - 1);
        self.len -= 1;
        Some(event)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
