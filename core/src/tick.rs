//! Monotonic 16-bit tick counter — component A of the runtime.
//!
//! One tick is one prescaled timer cycle. The counter wraps at 2^16, so all
//! comparisons between two ticks use signed-difference arithmetic rather than
//! `Ord`: `Tick(0)` is "after" `Tick(0xFFFF)` even though `0 < 0xFFFF`.

use core::ops::Add;

/// A point in the scheduler's tick domain.
///
/// Wrapping `u16` arithmetic. Do not compare with `<`/`>` directly — use
/// [`Tick::before`] or [`Tick::diff`], which interpret the difference modulo
/// 2^16 and so tolerate wraparound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick(pub u16);

impl Tick {
    pub const fn new(ticks: u16) -> Self {
        Tick(ticks)
    }

    /// `self + delta`, wrapping at 2^16.
    pub fn advance(self, delta: u16) -> Self {
        Tick(self.0.wrapping_add(delta))
    }

    /// Signed distance from `other` to `self`, i.e. `self - other` taken mod
    /// 2^16 and reinterpreted as a signed 16-bit quantity.
    ///
    /// A positive result means `self` is `other` plus that many ticks,
    /// forward in time; negative means `self` precedes `other`. This is only
    /// meaningful for ticks within half the wraparound period of each other,
    /// which holds for every comparison the scheduler performs since no task
    /// is ever scheduled more than `u16::MAX / 2` ticks out.
    pub fn diff(self, other: Tick) -> i16 {
        self.0.wrapping_sub(other.0) as i16
    }

    /// `true` if `self` occurs strictly before `other` in wraparound order.
    pub fn before(self, other: Tick) -> bool {
        self.diff(other) < 0
    }

    /// `true` if `self` occurs at or before `other` in wraparound order.
    pub fn before_or_eq(self, other: Tick) -> bool {
        self.diff(other) <= 0
    }
}

impl Add<u16> for Tick {
    type Output = Tick;
    fn add(self, delta: u16) -> Tick {
        self.advance(delta)
    }
}
