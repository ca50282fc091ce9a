//! Board registry for front-end discovery.
//!
//! Each board self-registers via [`inventory::submit!`] with a
//! [`MachineEntry`] holding its CLI name, a one-line description and a
//! factory. The front-end lists and builds boards at runtime without a
//! central table.

use quartz_core::coprocessor::MsuMedia;
use quartz_core::core::machine::Machine;

use crate::console::BoardError;

/// Everything a board factory needs besides the board itself.
pub struct BoardConfig {
    pub rom: Vec<u8>,
    /// Super FX clock as a percentage of nominal.
    pub clock_percent: u32,
    /// MSU-1 data and audio tracks; ignored by other boards.
    pub media: Option<Box<dyn MsuMedia>>,
}

impl BoardConfig {
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            clock_percent: 100,
            media: None,
        }
    }
}

/// Describes a front-end-capable board.
pub struct MachineEntry {
    /// CLI name used to select this board (e.g., "superfx").
    pub name: &'static str,
    pub description: &'static str,
    /// Factory: construct a Machine from a ROM image and options.
    pub create: fn(BoardConfig) -> Result<Box<dyn Machine>, BoardError>,
}

impl MachineEntry {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        create: fn(BoardConfig) -> Result<Box<dyn Machine>, BoardError>,
    ) -> Self {
        Self {
            name,
            description,
            create,
        }
    }
}

inventory::collect!(MachineEntry);

/// Return all registered boards, sorted by name.
pub fn all() -> Vec<&'static MachineEntry> {
    let mut entries: Vec<_> = inventory::iter::<MachineEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up a board by its CLI name.
pub fn find(name: &str) -> Option<&'static MachineEntry> {
    inventory::iter::<MachineEntry>
        .into_iter()
        .find(|e| e.name == name)
}
