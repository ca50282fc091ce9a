//! Per-access arbitration of the cartridge buses between the primary CPU and a
//! coprocessor.
//!
//! Ownership of each shared segment is a flag pair evaluated on every access.
//! A master that does not own the segment it addresses sees the contender's
//! conflict pattern on reads, has its writes dropped, and gets
//! [`AddressLookup::Unavailable`] from debugger lookups.

use log::trace;

use super::bus::{BusAccess, BusMaster};
use super::memory_map::AddressLookup;
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

/// Which master currently holds a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Owner {
    #[default]
    Primary,
    Coprocessor,
}

/// Shared bus segments subject to arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Rom,
    Ram,
    /// Not shared; always granted.
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusOwnership {
    pub rom: Owner,
    pub ram: Owner,
}

impl BusOwnership {
    pub const PRIMARY: Self = Self {
        rom: Owner::Primary,
        ram: Owner::Primary,
    };

    pub fn owner(&self, segment: Segment) -> Option<Owner> {
        match segment {
            Segment::Rom => Some(self.rom),
            Segment::Ram => Some(self.ram),
            Segment::Private => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Granted,
    Denied,
}

/// Pure arbitration decision for one access.
pub struct Arbiter;

impl Arbiter {
    pub fn arbitrate(access: &BusAccess, segment: Segment, ownership: BusOwnership) -> Grant {
        let Some(owner) = ownership.owner(segment) else {
            return Grant::Granted;
        };
        let requester = match access.master {
            BusMaster::Cpu(_) => Owner::Primary,
            BusMaster::Coprocessor => Owner::Coprocessor,
        };
        if owner == requester {
            Grant::Granted
        } else {
            Grant::Denied
        }
    }
}

/// A device that can take shared segments away from the primary CPU.
pub trait BusContender {
    /// Current owner of each shared segment.
    fn ownership(&self) -> BusOwnership;

    /// What a denied primary-CPU read of `address` in `segment` returns.
    /// `open_bus` is the last value driven on the primary data bus.
    fn conflict_read(&self, segment: Segment, address: u32, open_bus: u8) -> u8;
}

/// Contender for boards without a bus-mastering coprocessor.
pub struct NoContender;

impl BusContender for NoContender {
    fn ownership(&self) -> BusOwnership {
        BusOwnership::PRIMARY
    }

    fn conflict_read(&self, _segment: Segment, _address: u32, open_bus: u8) -> u8 {
        open_bus
    }
}

/// Read a shared segment on behalf of `access`, substituting the conflict
/// pattern when the requester does not own it.
pub fn read_shared<C, F>(contender: &C, access: &BusAccess, segment: Segment, open_bus: u8, real: F) -> u8
where
    C: BusContender + ?Sized,
    F: FnOnce() -> u8,
{
    match Arbiter::arbitrate(access, segment, contender.ownership()) {
        Grant::Granted => real(),
        Grant::Denied => {
            let value = contender.conflict_read(segment, access.address, open_bus);
            trace!(
                "{:?} denied {:?} read ${:06X}, conflict value ${value:02X}",
                access.master, segment, access.address
            );
            value
        }
    }
}

/// Write a shared segment on behalf of `access`. Returns false if the write
/// was dropped.
pub fn write_shared<C, F>(contender: &C, access: &BusAccess, segment: Segment, write: F) -> bool
where
    C: BusContender + ?Sized,
    F: FnOnce(),
{
    match Arbiter::arbitrate(access, segment, contender.ownership()) {
        Grant::Granted => {
            write();
            true
        }
        Grant::Denied => {
            trace!(
                "{:?} denied {:?} write ${:06X}, dropped",
                access.master, segment, access.address
            );
            false
        }
    }
}

/// Debugger lookup of a shared segment; `Unavailable` while another master owns it.
pub fn locate_shared<C>(contender: &C, master: BusMaster, segment: Segment, lookup: AddressLookup) -> AddressLookup
where
    C: BusContender + ?Sized,
{
    let access = BusAccess::read(master, 0);
    match Arbiter::arbitrate(&access, segment, contender.ownership()) {
        Grant::Granted => lookup,
        Grant::Denied => AddressLookup::Unavailable,
    }
}

/// Cartridge ROM and RAM shared by the primary CPU and the coprocessor.
///
/// ROM is never part of a save state. RAM is, with a length fixed at
/// construction.
#[derive(Debug, Clone, Default)]
pub struct CartMemory {
    rom: Vec<u8>,
    ram: Vec<u8>,
}

impl CartMemory {
    pub fn new(rom: Vec<u8>, ram_size: usize) -> Self {
        Self {
            rom,
            ram: vec![0; ram_size],
        }
    }

    /// ROM byte at `offset`, mirrored over the image size. Empty ROM reads 0xFF.
    #[inline]
    pub fn rom_byte(&self, offset: u32) -> u8 {
        if self.rom.is_empty() {
            return 0xFF;
        }
        self.rom[offset as usize % self.rom.len()]
    }

    /// RAM byte at `offset`, mirrored over the RAM size. No RAM reads 0xFF.
    #[inline]
    pub fn ram_byte(&self, offset: u32) -> u8 {
        if self.ram.is_empty() {
            return 0xFF;
        }
        self.ram[offset as usize % self.ram.len()]
    }

    #[inline]
    pub fn set_ram_byte(&mut self, offset: u32, value: u8) {
        if !self.ram.is_empty() {
            let len = self.ram.len();
            self.ram[offset as usize % len] = value;
        }
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn rom_mut(&mut self) -> &mut [u8] {
        &mut self.rom
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn clear_ram(&mut self) {
        self.ram.fill(0);
    }
}

impl Snapshot for CartMemory {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.bytes("ram", &mut self.ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GSU_OWNS_ROM: BusOwnership = BusOwnership {
        rom: Owner::Coprocessor,
        ram: Owner::Primary,
    };

    struct Pattern;

    impl BusContender for Pattern {
        fn ownership(&self) -> BusOwnership {
            GSU_OWNS_ROM
        }

        fn conflict_read(&self, _segment: Segment, address: u32, _open_bus: u8) -> u8 {
            (address & 0x0F) as u8 | 0x80
        }
    }

    #[test]
    fn owner_is_granted_other_master_denied() {
        let cpu = BusAccess::read(BusMaster::Cpu(0), 0x8000);
        let gsu = BusAccess::read(BusMaster::Coprocessor, 0x8000);
        assert_eq!(Arbiter::arbitrate(&cpu, Segment::Rom, GSU_OWNS_ROM), Grant::Denied);
        assert_eq!(Arbiter::arbitrate(&gsu, Segment::Rom, GSU_OWNS_ROM), Grant::Granted);
        assert_eq!(Arbiter::arbitrate(&cpu, Segment::Ram, GSU_OWNS_ROM), Grant::Granted);
        assert_eq!(Arbiter::arbitrate(&gsu, Segment::Ram, GSU_OWNS_ROM), Grant::Denied);
        assert_eq!(Arbiter::arbitrate(&cpu, Segment::Private, GSU_OWNS_ROM), Grant::Granted);
    }

    #[test]
    fn denied_read_returns_conflict_pattern() {
        let access = BusAccess::read(BusMaster::Cpu(0), 0x8003);
        let value = read_shared(&Pattern, &access, Segment::Rom, 0x55, || 0xEA);
        assert_eq!(value, 0x83);
    }

    #[test]
    fn denied_write_is_dropped() {
        let mut store = 0u8;
        let access = BusAccess::write(BusMaster::Cpu(0), 0x8000);
        assert!(!write_shared(&Pattern, &access, Segment::Rom, || store = 1));
        assert_eq!(store, 0);
        let access = BusAccess::write(BusMaster::Cpu(0), 0x6000);
        assert!(write_shared(&Pattern, &access, Segment::Ram, || store = 2));
        assert_eq!(store, 2);
    }

    #[test]
    fn lookup_unavailable_while_owned_elsewhere() {
        let real = AddressLookup::mapped(0x10, crate::core::SegmentKind::CartRom);
        assert_eq!(
            locate_shared(&Pattern, BusMaster::Cpu(0), Segment::Rom, real),
            AddressLookup::Unavailable
        );
        assert_eq!(
            locate_shared(&NoContender, BusMaster::Cpu(0), Segment::Rom, real),
            real
        );
    }

    #[test]
    fn cart_memory_mirrors() {
        let mut cart = CartMemory::new(vec![1, 2, 3, 4], 2);
        assert_eq!(cart.rom_byte(5), 2);
        cart.set_ram_byte(3, 9);
        assert_eq!(cart.ram_byte(1), 9);
        assert_eq!(CartMemory::default().rom_byte(0), 0xFF);
    }
}
