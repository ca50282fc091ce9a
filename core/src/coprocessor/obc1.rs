//! OBC1 sprite-attribute helper.
//!
//! No processor of its own: 8 KiB of battery-backed RAM at `$6000-$7FFF`
//! with a register window at `$7FF0-$7FF7` that addresses one entry of a
//! sprite table:
//! - `$7FF0-$7FF3` the four bytes of entry INDEX in the low table
//! - `$7FF4` the entry's 2-bit field in the packed high table
//! - `$7FF5` bit 0 selects the table base (`$1800` or `$1C00`)
//! - `$7FF6` INDEX (bits 6:0); bits 1:0 also pick the 2-bit field
//!
//! The control registers live in the RAM itself, so a save state is just
//! the RAM contents.
use std::any::Any;

use super::Coprocessor;
use crate::core::{
    AddressLookup, BusContender, BusOwnership, CartMemory, MemoryHandler, Segment, SegmentKind,
};
use crate::device::Ram;
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

pub const RAM_SIZE: usize = 0x2000;

const BASE_SELECT: u32 = 0x1FF5;
const INDEX: u32 = 0x1FF6;

pub struct Obc1 {
    ram: Ram,
}

impl Default for Obc1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Obc1 {
    pub fn new() -> Self {
        Self {
            ram: Ram::new(RAM_SIZE, SegmentKind::CartRam),
        }
    }

    fn byte(&self, offset: u32) -> u8 {
        self.ram.peek(offset, &()).unwrap_or(0xFF)
    }

    fn base(&self) -> u32 {
        if self.byte(BASE_SELECT) & 1 != 0 { 0x1800 } else { 0x1C00 }
    }

    fn index(&self) -> u32 {
        (self.byte(INDEX) & 0x7F) as u32
    }

    fn shift(&self) -> u32 {
        ((self.byte(INDEX) & 0x03) as u32) << 1
    }

    /// RAM offset a window register resolves to.
    fn target(&self, offset: u32) -> u32 {
        match offset {
            0x1FF0..=0x1FF3 => self.base() + (self.index() << 2) + (offset - 0x1FF0),
            0x1FF4 => self.base() + (self.index() >> 2) + 0x200,
            _ => offset,
        }
    }
}

impl BusContender for Obc1 {
    fn ownership(&self) -> BusOwnership {
        BusOwnership::PRIMARY
    }

    fn conflict_read(&self, _segment: Segment, _address: u32, open_bus: u8) -> u8 {
        open_bus
    }
}

impl MemoryHandler for Obc1 {
    type Context = CartMemory;

    fn read(&mut self, address: u32, cart: &mut CartMemory) -> Option<u8> {
        self.peek(address, cart)
    }

    fn peek(&self, address: u32, _cart: &CartMemory) -> Option<u8> {
        self.ram.peek(self.target(address & 0x1FFF), &())
    }

    fn write(&mut self, address: u32, value: u8, _cart: &mut CartMemory) {
        let offset = address & 0x1FFF;
        let target = self.target(offset);
        if offset == 0x1FF4 {
            let shift = self.shift();
            let packed = self.byte(target);
            let packed = (packed & !(0x03 << shift)) | ((value & 0x03) << shift);
            self.ram.write(target, packed, &mut ());
        } else {
            self.ram.write(target, value, &mut ());
        }
    }

    fn absolute_address(&self, address: u32) -> AddressLookup {
        self.ram.absolute_address(self.target(address & 0x1FFF))
    }
}

impl Coprocessor for Obc1 {
    fn name(&self) -> &'static str {
        "obc1"
    }

    fn reset(&mut self) {}

    fn run(&mut self, _master_clock: u64, _cart: &mut CartMemory) {}

    fn internal_memory(&self) -> &[u8] {
        self.ram.as_slice()
    }

    fn internal_memory_mut(&mut self) -> &mut [u8] {
        self.ram.as_mut_slice()
    }

    fn nvram(&self) -> Option<&[u8]> {
        Some(self.ram.as_slice())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Snapshot for Obc1 {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.nested("ram", &mut self.ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_table_window_follows_index_and_base() {
        let mut cart = CartMemory::default();
        let mut obc1 = Obc1::new();
        obc1.write(0x7FF5, 0x01, &mut cart);
        obc1.write(0x7FF6, 0x05, &mut cart);
        obc1.write(0x7FF2, 0xAB, &mut cart);
        assert_eq!(obc1.internal_memory()[0x1800 + 5 * 4 + 2], 0xAB);

        obc1.write(0x7FF5, 0x00, &mut cart);
        obc1.write(0x7FF2, 0xCD, &mut cart);
        assert_eq!(obc1.internal_memory()[0x1C00 + 5 * 4 + 2], 0xCD);
        assert_eq!(obc1.read(0x7FF2, &mut cart), Some(0xCD));
    }

    #[test]
    fn high_table_packs_two_bits() {
        let mut cart = CartMemory::default();
        let mut obc1 = Obc1::new();
        obc1.write(0x7FF5, 0x01, &mut cart);
        obc1.write(0x7FF6, 0x06, &mut cart); // entry 6: byte 1, shift 4
        obc1.write(0x7FF4, 0xFF, &mut cart);
        let addr = 0x1800 + (6 >> 2) + 0x200;
        assert_eq!(obc1.internal_memory()[addr], 0x30);
        obc1.write(0x7FF6, 0x04, &mut cart); // entry 4: same byte, shift 0
        obc1.write(0x7FF4, 0x02, &mut cart);
        assert_eq!(obc1.internal_memory()[addr], 0x32);
        assert_eq!(obc1.peek(0x7FF4, &cart), Some(0x32));
    }

    #[test]
    fn plain_ram_elsewhere() {
        let mut cart = CartMemory::default();
        let mut obc1 = Obc1::new();
        obc1.write(0x6010, 0x77, &mut cart);
        assert_eq!(obc1.peek(0x6010, &cart), Some(0x77));
        assert_eq!(
            obc1.absolute_address(0x6010),
            AddressLookup::mapped(0x10, SegmentKind::CartRam)
        );
    }
}
