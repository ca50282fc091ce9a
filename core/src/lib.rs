// The derive macro emits `::quartz_core::...` paths; this lets it work inside
// the crate as well.
extern crate self as quartz_core;

pub mod coprocessor;
pub mod core;
pub mod cpu;
pub mod device;
pub mod snapshot;

pub mod prelude {
    pub use crate::coprocessor::Coprocessor;
    pub use crate::core::machine::{Machine, MemoryType};
    pub use crate::core::{
        Bus, BusMaster, BusMasterComponent, Component, MemoryHandler, bus::InterruptState,
    };
    pub use crate::cpu::Cpu;
    pub use crate::snapshot::{Serializer, Snapshot, SnapshotError};
}
