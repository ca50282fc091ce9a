use super::clock::ClockError;
use super::memory_map::AddressLookup;
use crate::snapshot::SnapshotError;

/// Address spaces a debugger or frontend can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// The primary CPU's view, including registers and bus conflicts.
    CpuBus,
    Wram,
    CartRom,
    CartRam,
    CoprocessorCache,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::CpuBus,
        MemoryType::Wram,
        MemoryType::CartRom,
        MemoryType::CartRam,
        MemoryType::CoprocessorCache,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MemoryType::CpuBus => "cpu",
            MemoryType::Wram => "wram",
            MemoryType::CartRom => "rom",
            MemoryType::CartRam => "sram",
            MemoryType::CoprocessorCache => "cache",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// Machine-agnostic interface for emulated consoles.
///
/// The frontend, debugger tooling and rewind buffers drive a console only
/// through this trait. Coprocessor control needs no extra surface: GO, cache
/// setup and status polling are ordinary register accesses via `write_memory`
/// and `read_memory` on [`MemoryType::CpuBus`].
pub trait Machine {
    /// Board name (e.g., "superfx").
    fn name(&self) -> &'static str;

    /// Run until the end of the current video frame.
    fn run_frame(&mut self);

    /// Advance the master clock by `master_cycles`.
    fn step_cycles(&mut self, master_cycles: u64) -> Result<(), ClockError>;

    /// Reset the machine to its power-on state. Battery RAM is kept.
    fn reset(&mut self);

    fn master_clock(&self) -> u64;
    fn frame_count(&self) -> u64;

    /// Read with hardware side effects, exactly as the primary CPU would.
    fn read_memory(&mut self, kind: MemoryType, address: u32) -> u8;

    /// Side-effect-free read for debuggers and UI.
    fn peek_memory(&self, kind: MemoryType, address: u32) -> u8;

    fn write_memory(&mut self, kind: MemoryType, address: u32, value: u8);

    /// Size in bytes of a memory type (0 if absent on this board).
    fn memory_size(&self, kind: MemoryType) -> usize;

    /// Backing location of a primary-CPU bus address.
    fn absolute_address(&self, address: u32) -> AddressLookup;

    fn save_state(&mut self) -> Result<Vec<u8>, SnapshotError> {
        self.save_state_into(Vec::new())
    }

    /// Save into `buffer`, reusing its allocation.
    fn save_state_into(&mut self, buffer: Vec<u8>) -> Result<Vec<u8>, SnapshotError>;

    /// Restore a save state. On error the machine is left exactly as before.
    fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError>;

    /// Battery-backed RAM contents, if the board has any.
    fn save_nvram(&self) -> Option<Vec<u8>> {
        None
    }

    fn load_nvram(&mut self, _data: &[u8]) {}
}
