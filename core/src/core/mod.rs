pub mod arbiter;
pub mod bus;
pub mod clock;
pub mod component;
pub mod machine;
pub mod memory_map;

pub use arbiter::{Arbiter, BusContender, BusOwnership, CartMemory, Grant, NoContender, Owner, Segment};
pub use bus::{AccessKind, AccessWidth, Bus, BusAccess, BusMaster, InterruptState};
pub use clock::{ClockDivider, ClockError, ClockRatio, MasterClock};
pub use component::{BusMasterComponent, Component};
pub use machine::{Machine, MemoryType};
pub use memory_map::{
    AbsoluteAddress, AddressLookup, MapError, MemoryHandler, MemoryMap, MemoryMapBuilder, SegmentKind,
};
