//! Time APIs used by instant-based LLCP procedures.
//!
//! These are deliberately small: the engine only ever needs to express connection-event counts
//! (`u16`, wrapping) and, for the handful of procedures that quote a duration in their PDUs
//! (window size/offset, interval, timeout), a microsecond-resolution [`Duration`].

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// A duration with microsecond resolution.
///
/// This can represent a maximum duration of about 1 hour. Overflows result in a panic, but
/// shouldn't happen since the LLCP engine doesn't deal with durations that large.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u32);

impl Duration {
    /// Creates a [`Duration`] from a number of microseconds.
    pub fn from_micros(micros: u32) -> Self {
        Duration(micros)
    }

    /// Creates a [`Duration`] representing the given number of milliseconds.
    pub fn from_millis(millis: u32) -> Self {
        Duration(millis * 1_000)
    }

    /// Creates a [`Duration`] representing a number of seconds.
    pub fn from_secs(secs: u32) -> Self {
        Duration(secs * 1_000_000)
    }

    /// Returns the number of microseconds represented by `self`.
    pub fn as_micros(&self) -> u32 {
        self.0
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Duration(self.0.checked_add(rhs.0).expect("duration overflow"))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Duration(self.0.checked_sub(rhs.0).expect("duration underflow"))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

/// A 16-bit, wrapping connection-event counter (`connEventCount` in the Bluetooth spec).
///
/// Wraps at `2^16`. Comparisons between two counters must go through
/// [`EventCounter::events_until`], since a plain numeric comparison doesn't account for wraparound.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct EventCounter(u16);

impl EventCounter {
    pub const ZERO: Self = EventCounter(0);

    pub fn new(raw: u16) -> Self {
        EventCounter(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Advances the counter by one connection event, wrapping at `2^16`.
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Returns `self + events`, wrapping at `2^16`.
    pub fn plus(&self, events: u16) -> Self {
        EventCounter(self.0.wrapping_add(events))
    }

    /// Returns whether `instant` has been reached or passed by `self`.
    ///
    /// Uses the signed-modulo comparison mandated by the Bluetooth spec for instant arithmetic:
    /// `instant` is considered reached once `(self - instant) mod 2^16 <= 0x7FFF`.
    pub fn has_reached(&self, instant: EventCounter) -> bool {
        self.0.wrapping_sub(instant.0) <= 0x7FFF
    }

    /// Returns whether `instant` is a valid future instant relative to `self`, i.e. scheduling it
    /// now would satisfy `(instant - self) mod 2^16 <= 0x7FFF`.
    pub fn is_valid_future_instant(&self, instant: EventCounter) -> bool {
        instant.0.wrapping_sub(self.0) <= 0x7FFF
    }
}

impl fmt::Debug for EventCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_reached_wraps() {
        let ec = EventCounter::new(0xFFFE);
        assert!(!ec.has_reached(EventCounter::new(5)));
        let ec = EventCounter::new(5);
        assert!(ec.has_reached(EventCounter::new(5)));
        assert!(ec.has_reached(EventCounter::new(0xFFFE)));
        assert!(!ec.has_reached(EventCounter::new(6)));
    }

    #[test]
    fn plus_wraps_at_16_bits() {
        let ec = EventCounter::new(0xFFFE);
        assert_eq!(ec.plus(4).raw(), 2);
    }

    #[test]
    fn valid_future_instant() {
        let ec = EventCounter::new(100);
        assert!(ec.is_valid_future_instant(EventCounter::new(106)));
        assert!(!ec.is_valid_future_instant(EventCounter::new(100).plus(0x8000)));
    }
}
