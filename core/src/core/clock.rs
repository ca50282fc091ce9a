//! Master clock and per-component clock-domain crossing.
//!
//! Every component in a console runs in its own clock domain. The console
//! advances one shared [`MasterClock`]; each component converts elapsed master
//! cycles into its own cycles through a [`ClockDivider`], which keeps the
//! fractional remainder so no drift accumulates across calls.

use thiserror::Error;

use super::component::Component;
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

/// Contract violations when stepping a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("cannot step clock backwards from {current} to {target}")]
    Backwards { current: u64, target: u64 },

    #[error("stepping clock at {current} by {delta} overflows")]
    Overflow { current: u64, delta: u64 },

    #[error("clock ratio divisor must be non-zero")]
    ZeroDivisor,

    #[error("component clock rate must be non-zero")]
    ZeroRate,
}

/// `multiplier / divisor` component cycles per master cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRatio {
    multiplier: u64,
    divisor: u64,
}

impl ClockRatio {
    pub const UNITY: Self = Self {
        multiplier: 1,
        divisor: 1,
    };

    pub fn new(multiplier: u64, divisor: u64) -> Result<Self, ClockError> {
        if divisor == 0 {
            return Err(ClockError::ZeroDivisor);
        }
        Ok(Self {
            multiplier,
            divisor,
        })
    }

    /// One component cycle every `n` master cycles.
    pub fn every(n: u64) -> Result<Self, ClockError> {
        Self::new(1, n)
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    pub fn divisor(&self) -> u64 {
        self.divisor
    }
}

/// Converts elapsed master cycles into component cycles with an exact remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    ratio: ClockRatio,
    remainder: u64,
}

impl ClockDivider {
    pub fn new(ratio: ClockRatio) -> Self {
        Self {
            ratio,
            remainder: 0,
        }
    }

    pub fn ratio(&self) -> ClockRatio {
        self.ratio
    }

    /// Change the ratio (e.g. overclock setting). The pending remainder is
    /// dropped since it was expressed in the old divisor.
    pub fn set_ratio(&mut self, ratio: ClockRatio) {
        self.ratio = ratio;
        self.remainder = 0;
    }

    pub fn remainder(&self) -> u64 {
        self.remainder
    }

    /// Component cycles produced by `elapsed` master cycles.
    pub fn step(&mut self, elapsed: u64) -> u64 {
        let divisor = self.ratio.divisor as u128;
        let total = elapsed as u128 * self.ratio.multiplier as u128 + self.remainder as u128;
        self.remainder = (total % divisor) as u64;
        // Saturate rather than wrap; a u64 worth of component cycles is not
        // reachable from a u64 master count at sane ratios.
        u64::try_from(total / divisor).unwrap_or(u64::MAX)
    }

    pub fn reset(&mut self) {
        self.remainder = 0;
    }
}

impl Snapshot for ClockDivider {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.value("remainder", &mut self.remainder)?;
        if self.remainder >= self.ratio.divisor {
            return Err(s.invalid("remainder"));
        }
        Ok(())
    }
}

/// The one shared cycle counter a console advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterClock {
    cycles: u64,
}

impl MasterClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Advance by `delta` cycles, returning the new position.
    pub fn advance(&mut self, delta: u64) -> Result<u64, ClockError> {
        self.cycles = self
            .cycles
            .checked_add(delta)
            .ok_or(ClockError::Overflow {
                current: self.cycles,
                delta,
            })?;
        Ok(self.cycles)
    }

    /// Advance to `target`, returning the cycles elapsed.
    pub fn advance_to(&mut self, target: u64) -> Result<u64, ClockError> {
        if target < self.cycles {
            return Err(ClockError::Backwards {
                current: self.cycles,
                target,
            });
        }
        let elapsed = target - self.cycles;
        self.cycles = target;
        Ok(elapsed)
    }

    pub fn reset(&mut self) {
        self.cycles = 0;
    }
}

impl Snapshot for MasterClock {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.value("cycles", &mut self.cycles)
    }
}

/// Tick `component` for the cycles `divider` yields from `elapsed` master
/// cycles. Returns true if any tick reported an event.
pub fn drive<C: Component + ?Sized>(component: &mut C, divider: &mut ClockDivider, elapsed: u64) -> bool {
    let mut event = false;
    for _ in 0..divider.step(elapsed) {
        event |= component.tick();
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_carries_across_steps() {
        // 44100 Hz from a 21.477 MHz master clock
        let mut div = ClockDivider::new(ClockRatio::new(44_100, 21_477_272).unwrap());
        let mut fresh = div;
        let whole = fresh.step(21_477_272 * 3);
        let mut split = 0;
        for chunk in [1, 7, 1364, 357_366, 21_477_272 * 3 - 358_738] {
            split += div.step(chunk);
        }
        assert_eq!(whole, 132_300);
        assert_eq!(split, whole);
        assert_eq!(div.remainder(), 0);
    }

    #[test]
    fn every_n_counts_whole_periods() {
        let mut div = ClockDivider::new(ClockRatio::every(6).unwrap());
        assert_eq!(div.step(5), 0);
        assert_eq!(div.step(1), 1);
        assert_eq!(div.step(13), 2);
        assert_eq!(div.remainder(), 1);
    }

    #[test]
    fn zero_divisor_rejected() {
        assert_eq!(ClockRatio::new(1, 0), Err(ClockError::ZeroDivisor));
    }

    #[test]
    fn master_clock_rejects_backwards_and_overflow() {
        let mut clock = MasterClock::new();
        assert_eq!(clock.advance_to(100), Ok(100));
        assert_eq!(
            clock.advance_to(99),
            Err(ClockError::Backwards {
                current: 100,
                target: 99
            })
        );
        assert!(matches!(
            clock.advance(u64::MAX),
            Err(ClockError::Overflow { .. })
        ));
        assert_eq!(clock.cycles(), 100);
    }

    #[test]
    fn drive_ticks_component() {
        struct Counter(u32);
        impl Component for Counter {
            fn tick(&mut self) -> bool {
                self.0 += 1;
                self.0 % 4 == 0
            }
        }
        let mut c = Counter(0);
        assert_eq!(c.clock_ratio(), Ok(ClockRatio::UNITY));
        let mut div = ClockDivider::new(ClockRatio::every(2).unwrap());
        assert!(!drive(&mut c, &mut div, 7));
        assert_eq!(c.0, 3);
        assert!(drive(&mut c, &mut div, 1));
        assert_eq!(c.0, 4);
    }
}
