//! CPU state snapshot types and traits

/// Trait for CPU types that can provide state snapshots
pub trait CpuStateTrait {
    type Snapshot;
    fn snapshot(&self) -> Self::Snapshot;
}

/// M6502 CPU state snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M6502State {
    pub a: u8,       // Accumulator
    pub x: u8,       // X index register
    pub y: u8,       // Y index register
    pub pc: u16,     // Program counter
    pub sp: u8,      // Stack pointer (0x0100 based)
    pub p: u8,       // Status register (flags)
    pub cycles: u64, // CPU cycles since power-on
}

/// GSU (Super FX) core state snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsuState {
    pub r: [u16; 16], // R0-R15; R15 is the program counter
    pub sfr: u16,     // Status/flag register as the bus sees it
    pub pbr: u8,      // Program bank
    pub rombr: u8,    // ROM bank for GETB/GETC
    pub rambr: u8,    // RAM bank for LM/SM/LDW/STW
    pub cbr: u16,     // Cache base
    pub sreg: u8,     // Source register selected by FROM/WITH
    pub dreg: u8,     // Destination register selected by TO/WITH
    pub cycle_count: u64,
}
