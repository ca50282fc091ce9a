/// Identifies who is accessing the bus (for primary/coprocessor arbitration)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMaster {
    Cpu(usize), // primary CPU 0, 1, etc.
    Coprocessor, // the cartridge coprocessor's own core
}

/// Width of a single bus access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Word,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    /// Instruction fetch; arbitrated like a read.
    Fetch,
}

/// One bus access as seen by the arbiter. Built per access, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusAccess {
    pub master: BusMaster,
    pub address: u32,
    pub width: AccessWidth,
    pub kind: AccessKind,
}

impl BusAccess {
    pub fn read(master: BusMaster, address: u32) -> Self {
        Self {
            master,
            address,
            width: AccessWidth::Byte,
            kind: AccessKind::Read,
        }
    }

    pub fn write(master: BusMaster, address: u32) -> Self {
        Self {
            master,
            address,
            width: AccessWidth::Byte,
            kind: AccessKind::Write,
        }
    }

    pub fn fetch(master: BusMaster, address: u32) -> Self {
        Self {
            master,
            address,
            width: AccessWidth::Byte,
            kind: AccessKind::Fetch,
        }
    }

    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }
}

/// Generic bus interface supporting halt/arbitration (RDY, coprocessor wait states)
pub trait Bus {
    type Address: Copy + Into<u64>; // u16 for 8-bit, u32 for 24-bit
    type Data; // u8 or u16

    fn read(&mut self, master: BusMaster, addr: Self::Address) -> Self::Data;
    fn write(&mut self, master: BusMaster, addr: Self::Address, data: Self::Data);

    /// Check if the bus is halted for this master (RDY).
    /// Returns true if the master must pause before the next bus cycle.
    fn is_halted_for(&self, master: BusMaster) -> bool;

    /// Generic interrupt query. CPUs pick what they need.
    fn check_interrupts(&self, target: BusMaster) -> InterruptState;
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptState {
    pub nmi: bool,
    pub irq: bool,
}
