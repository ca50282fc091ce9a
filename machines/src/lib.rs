pub mod boards;
pub mod console;
pub mod registry;

pub use boards::Board;
pub use console::{BoardError, Console, Region, SystemBus};
pub use registry::{BoardConfig, MachineEntry};
