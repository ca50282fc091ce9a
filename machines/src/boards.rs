//! Cartridge board layouts.
//!
//! A board fixes which coprocessor sits on the cartridge, how much battery RAM
//! it carries and where each device appears on the primary CPU's 16-bit bus.
//! Every page of the bus is listed; unused windows are explicit open bus.

use quartz_core::coprocessor::{self, CoprocessorKind, CoprocessorOptions};
use quartz_core::core::machine::Machine;
use quartz_core::core::{MapError, MemoryMap, MemoryMapBuilder};

use crate::console::{BoardError, Console, Region};
use crate::registry::{BoardConfig, MachineEntry};

/// Bus address width and page granularity of the console's memory map.
const ADDRESS_BITS: u32 = 16;
const PAGE_BITS: u32 = 8;

pub struct Board {
    /// Tag written into save states; a state only loads on the same board.
    pub id: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub coprocessor: Option<CoprocessorKind>,
    /// Battery-backed cartridge RAM shared with the coprocessor.
    pub cart_ram_size: usize,
    /// Inclusive `(start, end, region)` ranges covering the whole bus.
    pub layout: &'static [(u32, u32, Region)],
}

impl Board {
    pub fn memory_map(&self) -> Result<MemoryMap<Region>, MapError> {
        self.layout
            .iter()
            .fold(MemoryMapBuilder::new(ADDRESS_BITS, PAGE_BITS), |builder, &(start, end, region)| {
                builder.map(start, end, region)
            })
            .build()
    }
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

pub static PLAIN: Board = Board {
    id: 0,
    name: "plain",
    description: "ROM and battery RAM, no coprocessor",
    coprocessor: None,
    cart_ram_size: 0x2000,
    layout: &[
        (0x0000, 0x1FFF, Region::Wram),
        (0x2000, 0x41FF, Region::OpenBus),
        (0x4200, 0x42FF, Region::Timer),
        (0x4300, 0x5FFF, Region::OpenBus),
        (0x6000, 0x7FFF, Region::CartRam),
        (0x8000, 0xFFFF, Region::CartRom),
    ],
};

pub static SUPERFX: Board = Board {
    id: 1,
    name: "superfx",
    description: "Super FX (GSU) with shared ROM and RAM",
    coprocessor: Some(CoprocessorKind::SuperFx),
    cart_ram_size: 0x2000,
    layout: &[
        (0x0000, 0x1FFF, Region::Wram),
        (0x2000, 0x2FFF, Region::OpenBus),
        (0x3000, 0x34FF, Region::Coprocessor),
        (0x3500, 0x41FF, Region::OpenBus),
        (0x4200, 0x42FF, Region::Timer),
        (0x4300, 0x5FFF, Region::OpenBus),
        (0x6000, 0x7FFF, Region::CartRam),
        (0x8000, 0xFFFF, Region::CartRom),
    ],
};

pub static OBC1: Board = Board {
    id: 2,
    name: "obc1",
    description: "OBC1 sprite helper with its own battery RAM",
    coprocessor: Some(CoprocessorKind::Obc1),
    cart_ram_size: 0,
    layout: &[
        (0x0000, 0x1FFF, Region::Wram),
        (0x2000, 0x41FF, Region::OpenBus),
        (0x4200, 0x42FF, Region::Timer),
        (0x4300, 0x5FFF, Region::OpenBus),
        (0x6000, 0x7FFF, Region::Coprocessor),
        (0x8000, 0xFFFF, Region::CartRom),
    ],
};

pub static MSU1: Board = Board {
    id: 3,
    name: "msu1",
    description: "MSU-1 data and audio streaming",
    coprocessor: Some(CoprocessorKind::Msu1),
    cart_ram_size: 0x2000,
    layout: &[
        (0x0000, 0x1FFF, Region::Wram),
        (0x2000, 0x20FF, Region::Coprocessor),
        (0x2100, 0x41FF, Region::OpenBus),
        (0x4200, 0x42FF, Region::Timer),
        (0x4300, 0x5FFF, Region::OpenBus),
        (0x6000, 0x7FFF, Region::CartRam),
        (0x8000, 0xFFFF, Region::CartRom),
    ],
};

pub static BOARDS: [&Board; 4] = [&PLAIN, &SUPERFX, &OBC1, &MSU1];

pub fn by_id(id: u8) -> Option<&'static Board> {
    BOARDS.iter().copied().find(|b| b.id == id)
}

// ---------------------------------------------------------------------------
// Machine registry
// ---------------------------------------------------------------------------

fn build(board: &'static Board, config: BoardConfig) -> Result<Box<dyn Machine>, BoardError> {
    let options = CoprocessorOptions {
        clock_percent: config.clock_percent,
        media: config.media,
    };
    Ok(Box::new(Console::new(board, config.rom, options)?))
}

fn create_plain(config: BoardConfig) -> Result<Box<dyn Machine>, BoardError> {
    build(&PLAIN, config)
}

fn create_superfx(config: BoardConfig) -> Result<Box<dyn Machine>, BoardError> {
    build(&SUPERFX, config)
}

fn create_obc1(config: BoardConfig) -> Result<Box<dyn Machine>, BoardError> {
    build(&OBC1, config)
}

fn create_msu1(config: BoardConfig) -> Result<Box<dyn Machine>, BoardError> {
    build(&MSU1, config)
}

inventory::submit! {
    MachineEntry::new(PLAIN.name, PLAIN.description, create_plain)
}

inventory::submit! {
    MachineEntry::new(SUPERFX.name, SUPERFX.description, create_superfx)
}

inventory::submit! {
    MachineEntry::new(OBC1.name, OBC1.description, create_obc1)
}

inventory::submit! {
    MachineEntry::new(MSU1.name, MSU1.description, create_msu1)
}
