//! Component D — the ADC acquisition engine.
//!
//! Measurements live in a fixed-capacity arena, sorted by channel ascending,
//! and are fed through a three-slot pipeline (`current`/`next`/`next_next`)
//! so the next conversion's channel is always programmed into the
//! multiplexer one conversion ahead of when it is needed. A rotating
//! `period` byte implements the skip filter: a measurement participates in
//! period `P` iff `skip & P == 0`.

use crate::hal::AdcHardware;
use crate::process::{Event, EventKind, EventQueue};

/// Posted (to the engine's own process identity) when the enabled set
/// changes, prompting a pipeline refill.
pub const EVENT_ADC_LIST_CHANGED: EventKind = 10;
/// Posted (to the engine's own process identity) from the conversion-complete
/// ISR, carrying the arena index of the slot that was just sampled.
pub const EVENT_ADC_CONVERSION_COMPLETE: EventKind = 11;
/// Posted to a measurement's owning process once its oversample count is
/// exhausted, carrying the arena index of the finished measurement.
pub const EVENT_ADC_MEASUREMENT_COMPLETED: EventKind = 12;

const NONE: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    /// `channel` is outside the 0-7 range the multiplexer supports.
    InvalidChannel,
    /// `oversamples` is not one of {1, 4, 16, 64, 256}.
    InvalidNbOversamples,
    /// `skip` is not one of {0, 1, 3, 7, 15}.
    InvalidSkip,
    /// No arena slot is free. Every slot is either enabled (in the sorted
    /// list) or free, so "no free slot" and "already in the list" describe
    /// the same exhausted-arena condition.
    AlreadyInList,
}

/// Opaque identity of one enabled measurement, returned by
/// [`AdcEngine::enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcHandle(u8);

#[derive(Clone, Copy)]
struct AdcSlot {
    channel: u8,
    oversamples: u16,
    skip: u8,
    next_value: u32,
    value: u16,
    oversamples_remaining: u16,
    enabled: bool,
    owner: u8,
    list_next: u8,
}

impl AdcSlot {
    const fn empty() -> Self {
        AdcSlot {
            channel: 0,
            oversamples: 1,
            skip: 0,
            next_value: 0,
            value: 0,
            oversamples_remaining: 0,
            enabled: false,
            owner: 0,
            list_next: NONE,
        }
    }
}

/// Left-shift applied to an oversampled accumulator so its valid dynamic
/// range occupies the word's upper bits: `max(0, 6 - log2(oversamples))`.
/// Only the five legal oversample counts are accepted; anything else is an
/// [`AdcError::InvalidNbOversamples`] at [`AdcEngine::enable`] time, so this
/// never needs a fallback case.
fn oversample_shift(oversamples: u16) -> u32 {
    match oversamples {
        1 => 6,
        4 => 4,
        16 => 2,
        64 | 256 => 0,
        _ => 0,
    }
}

fn is_legal_oversamples(oversamples: u16) -> bool {
    matches!(oversamples, 1 | 4 | 16 | 64 | 256)
}

fn is_legal_skip(skip: u8) -> bool {
    matches!(skip, 0 | 1 | 3 | 7 | 15)
}

/// The ADC engine, generic over its arena capacity `N`
/// ([`crate::config::ADC_LIST_MAX`] by default).
pub struct AdcEngine<const N: usize> {
    slots: [AdcSlot; N],
    free_head: u8,
    list_head: u8,
    current: u8,
    next: u8,
    next_next: u8,
    period: u8,
    cursor: u8,
}

impl<const N: usize> AdcEngine<N> {
    pub const fn new() -> Self {
        assert!(N > 0 && N < NONE as usize, "ADC arena must fit in u8 indices");
        let mut slots = [AdcSlot::empty(); N];
        let mut i = 0;
        while i + 1 < N {
            slots[i].list_next = (i + 1) as u8;
            i += 1;
        }
        AdcEngine {
            slots,
            free_head: 0,
            list_head: NONE,
            current: NONE,
            next: NONE,
            next_next: NONE,
            period: 0,
            cursor: NONE,
        }
    }

    fn channel_of(&self, idx: u8) -> Option<u8> {
        if idx == NONE {
            None
        } else {
            Some(self.slots[idx as usize].channel)
        }
    }

    /// Insert a new measurement, validate its parameters, disable the pin's
    /// digital input buffer, and post [`EVENT_ADC_LIST_CHANGED`] so the
    /// pipeline refill can pick it up. `owner` is the process identity that
    /// will receive [`EVENT_ADC_MEASUREMENT_COMPLETED`] events for it.
    pub fn enable<const M: usize>(
        &mut self,
        hw: &mut impl AdcHardware,
        channel: u8,
        oversamples: u16,
        skip: u8,
        owner: u8,
        self_process_id: u8,
        queue: &mut EventQueue<M>,
    ) -> Result<AdcHandle, AdcError> {
        if channel > 7 {
            log::warn!("adc_enable rejected out-of-range channel {}", channel);
            return Err(AdcError::InvalidChannel);
        }
        if !is_legal_oversamples(oversamples) {
            log::warn!("adc_enable rejected illegal oversamples {}", oversamples);
            return Err(AdcError::InvalidNbOversamples);
        }
        if !is_legal_skip(skip) {
            log::warn!("adc_enable rejected illegal skip {}", skip);
            return Err(AdcError::InvalidSkip);
        }
        if self.free_head == NONE {
            log::warn!("adc arena exhausted, channel {} not enabled", channel);
            return Err(AdcError::AlreadyInList);
        }

        let idx = self.free_head;
        self.free_head = self.slots[idx as usize].list_next;

        self.slots[idx as usize] = AdcSlot {
            channel,
            oversamples,
            skip,
            next_value: 0,
            value: 0,
            oversamples_remaining: oversamples,
            enabled: true,
            owner,
            list_next: NONE,
        };

        // Insert sorted by channel ascending.
        let mut prev: u8 = NONE;
        let mut cursor = self.list_head;
        loop {
            if cursor == NONE || self.slots[cursor as usize].channel > channel {
                break;
            }
            prev = cursor;
            cursor = self.slots[cursor as usize].list_next;
        }
        self.slots[idx as usize].list_next = cursor;
        if prev == NONE {
            self.list_head = idx;
        } else {
            self.slots[prev as usize].list_next = idx;
        }

        hw.digital_input_disable(channel);
        let _ = queue.push(Event::new(self_process_id, EVENT_ADC_LIST_CHANGED, idx as usize));
        Ok(AdcHandle(idx))
    }

    /// Unlink `handle`, clear its enable bit, fix up the refill cursor and
    /// pipeline pointers that may have referenced it, and return its slot to
    /// the free arena. Re-enables the pin's digital input buffer only if no
    /// other enabled measurement still references the same channel.
    pub fn disable(&mut self, hw: &mut impl AdcHardware, handle: AdcHandle) {
        let target = handle.0;
        let channel = self.slots[target as usize].channel;

        let mut prev: u8 = NONE;
        let mut cursor = self.list_head;
        loop {
            if cursor == NONE {
                break;
            }
            if cursor == target {
                let next = self.slots[cursor as usize].list_next;
                if prev == NONE {
                    self.list_head = next;
                } else {
                    self.slots[prev as usize].list_next = next;
                }
                break;
            }
            prev = cursor;
            cursor = self.slots[cursor as usize].list_next;
        }

        self.slots[target as usize].enabled = false;

        if self.cursor == target {
            self.cursor = self.slots[target as usize].list_next;
        }
        if self.next_next == target {
            self.next_next = NONE;
        }
        // `current`/`next` are left pointing at the disabled slot: the
        // pipeline's `is_enabled` check at sample-read time guards against
        // ever accumulating into it again, matching the spec's invariant
        // that disable takes effect no later than the next conversion
        // boundary without requiring the in-flight pipeline to be rewound.

        let still_referenced = (0..N as u8).any(|i| {
            i != target && self.slots[i as usize].enabled && self.slots[i as usize].channel == channel
        });
        if !still_referenced {
            hw.digital_input_enable(channel);
        }

        self.slots[target as usize].list_next = self.free_head;
        self.free_head = target;
    }

    /// Call from the conversion-complete interrupt. Programs the
    /// multiplexer for the slot after next, then — if `current` is still
    /// enabled — reads the result, accumulates it into `current`'s own
    /// `next_value`, and posts [`EVENT_ADC_CONVERSION_COMPLETE`] with
    /// `current` as payload. A second entry sharing the same physical
    /// channel is a separate pipeline slot with its own skip mask and gets
    /// its own turn through `current` on its own schedule; it never
    /// piggybacks on another entry's conversion. Finally advances the
    /// pipeline by one position.
    pub fn on_conversion_complete<const M: usize>(
        &mut self,
        hw: &mut impl AdcHardware,
        self_process_id: u8,
        queue: &mut EventQueue<M>,
    ) {
        hw.set_channel(self.channel_of(self.next_next));

        if self.current != NONE && self.slots[self.current as usize].enabled {
            let result = hw.read_result();
            self.slots[self.current as usize].next_value += result as u32;
            let _ = queue.push(Event::new(self_process_id, EVENT_ADC_CONVERSION_COMPLETE, self.current as usize));
        }

        self.current = self.next;
        self.next = self.next_next;
        self.next_next = NONE;
    }

    /// Foreground handler for [`EVENT_ADC_LIST_CHANGED`]: advances the
    /// rotation cursor and (re)populates `next_next` now that the enabled
    /// set has changed.
    pub fn handle_list_changed(&mut self) {
        self.refill_next_next();
    }

    /// Foreground handler for [`EVENT_ADC_CONVERSION_COMPLETE`]: decrements
    /// the named slot's remaining oversample count, latches and left-aligns
    /// the accumulator once it reaches zero (posting
    /// [`EVENT_ADC_MEASUREMENT_COMPLETED`] to the owner), then refills
    /// `next_next` from the rotation cursor.
    pub fn handle_completed_conversion<const M: usize>(
        &mut self,
        adc_idx: u8,
        queue: &mut EventQueue<M>,
    ) {
        let slot = &mut self.slots[adc_idx as usize];
        if !slot.enabled {
            return;
        }
        if slot.oversamples_remaining > 0 {
            slot.oversamples_remaining -= 1;
        }
        if slot.oversamples_remaining == 0 {
            let shift = oversample_shift(slot.oversamples);
            slot.value = (slot.next_value << shift) as u16;
            slot.next_value = 0;
            slot.oversamples_remaining = slot.oversamples;
            let owner = slot.owner;
            let _ = queue.push(Event::new(owner, EVENT_ADC_MEASUREMENT_COMPLETED, adc_idx as usize));
        }
        self.refill_next_next();
    }

    /// The latched value of `handle`'s most recently completed measurement.
    pub fn value(&self, handle: AdcHandle) -> u16 {
        self.slots[handle.0 as usize].value
    }

    fn refill_next_next(&mut self) {
        let max_steps = 16usize.saturating_mul(N + 1);
        let mut idx = self.cursor;

        for _ in 0..max_steps {
            if idx == NONE {
                self.period = self.period.wrapping_add(1);
                idx = self.list_head;
                if idx == NONE {
                    self.next_next = NONE;
                    self.cursor = NONE;
                    return;
                }
                continue;
            }

            let slot = self.slots[idx as usize];
            let eligible = slot.enabled && (slot.skip & self.period) == 0;
            let after = slot.list_next;
            if eligible {
                self.next_next = idx;
                self.cursor = after;
                return;
            }
            idx = after;
        }

        self.next_next = NONE;
    }
}

impl<const N: usize> Default for AdcEngine<N> {
    fn default() -> Self {
        Self::new()
    }
}
