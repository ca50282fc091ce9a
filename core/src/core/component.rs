use super::bus::{Bus, BusMaster};
use super::clock::{ClockError, ClockRatio};

/// A device clocked off the master clock through [`drive`](super::clock::drive):
/// the beam timer, the MSU-1 sample clock.
pub trait Component {
    /// One cycle of the device's own clock. True when something the console
    /// must react to happened (a frame wrapped, a track ended).
    fn tick(&mut self) -> bool;

    /// Device cycles per master cycle, used to build its [`ClockDivider`](super::clock::ClockDivider).
    fn clock_ratio(&self) -> Result<ClockRatio, ClockError> {
        Ok(ClockRatio::UNITY)
    }
}

/// A processor that owns the bus while it runs, stepped one bus cycle at a
/// time by the console.
pub trait BusMasterComponent {
    type Bus: Bus + ?Sized;

    /// One bus cycle. True when the processor is back at an instruction
    /// boundary.
    fn tick_with_bus(&mut self, bus: &mut Self::Bus, master: BusMaster) -> bool;
}
