use crate::core::component::BusMasterComponent;

/// Generic primary-CPU interface
pub trait Cpu: BusMasterComponent + CpuStateTrait {
    /// Start the reset sequence
    fn reset(&mut self);

    /// Signal a specific interrupt line (implementation-defined)
    fn signal_interrupt(&mut self, int: crate::core::bus::InterruptState);
}

// Re-export state types
pub mod state;
pub use state::{CpuStateTrait, GsuState, M6502State};

// Primary CPU
pub mod m6502;
pub use m6502::M6502;

// Super FX coprocessor core
pub mod gsu;
pub use gsu::Gsu;
