//! Page-granular memory map from bus address to register/memory handler.
//!
//! A board declares its address ranges once through [`MemoryMapBuilder`]. The
//! builder refuses to produce a map with holes or overlaps, so a missing handler
//! is a construction-time error and never a runtime surprise. Gaps that really
//! are open bus on the hardware must be mapped to an explicit open-bus handler.

use thiserror::Error;

/// Kind of backing store an absolute address refers to (for debugger tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Wram,
    CartRom,
    CartRam,
    CoprocessorCache,
    Register,
}

/// A location in a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteAddress {
    pub offset: u32,
    pub kind: SegmentKind,
}

/// Result of resolving a bus address for debugger tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressLookup {
    Mapped(AbsoluteAddress),
    /// Nothing backs this address.
    OpenBus,
    /// A backing store exists but another bus master owns it right now.
    Unavailable,
}

impl AddressLookup {
    pub fn mapped(offset: u32, kind: SegmentKind) -> Self {
        AddressLookup::Mapped(AbsoluteAddress { offset, kind })
    }
}

/// A device register block or memory segment reachable through the map.
///
/// Memories and timers are handed the offset into their mapped range;
/// coprocessor windows get the full bus address. `Context` is whatever else
/// the handler needs to reach (the shared cartridge for coprocessors).
/// A read returning `None` leaves the open bus value on the data bus.
///
/// `read` may have side effects (status flags clearing, FIFOs advancing);
/// `peek` must not.
pub trait MemoryHandler {
    type Context: ?Sized;

    fn read(&mut self, address: u32, ctx: &mut Self::Context) -> Option<u8>;
    fn peek(&self, address: u32, ctx: &Self::Context) -> Option<u8>;
    fn write(&mut self, address: u32, value: u8, ctx: &mut Self::Context);

    fn absolute_address(&self, _address: u32) -> AddressLookup {
        AddressLookup::OpenBus
    }
}

/// Board construction errors from an inconsistent address map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("address ${0:06X} has no handler")]
    Unmapped(u32),

    #[error("range ${start:06X}-${end:06X} overlaps an existing range at ${at:06X}")]
    Overlap { start: u32, end: u32, at: u32 },

    #[error("range ${start:06X}-${end:06X} is not aligned to {page_size}-byte pages")]
    Misaligned { start: u32, end: u32, page_size: u32 },

    #[error("range ${start:06X}-${end:06X} is outside the address space")]
    OutOfRange { start: u32, end: u32 },
}

#[derive(Debug, Clone, Copy)]
struct PageEntry<H> {
    handler: H,
    base: u32,
}

/// Immutable page table resolving a bus address to `(handler, offset)`.
#[derive(Debug, Clone)]
pub struct MemoryMap<H> {
    pages: Vec<PageEntry<H>>,
    page_bits: u32,
    address_mask: u32,
}

impl<H: Copy> MemoryMap<H> {
    /// Handler id and offset within its range.
    #[inline]
    pub fn resolve(&self, address: u32) -> (H, u32) {
        let address = address & self.address_mask;
        let entry = self.pages[(address >> self.page_bits) as usize];
        (entry.handler, address - entry.base)
    }

    #[inline]
    pub fn handler(&self, address: u32) -> H {
        self.resolve(address).0
    }

    pub fn page_size(&self) -> u32 {
        1 << self.page_bits
    }
}

/// Collects ranges and validates them into a [`MemoryMap`].
pub struct MemoryMapBuilder<H> {
    address_bits: u32,
    page_bits: u32,
    ranges: Vec<(u32, u32, H)>,
}

impl<H: Copy> MemoryMapBuilder<H> {
    pub fn new(address_bits: u32, page_bits: u32) -> Self {
        debug_assert!(page_bits <= address_bits && address_bits <= 24);
        Self {
            address_bits,
            page_bits,
            ranges: Vec::new(),
        }
    }

    /// Map the inclusive range `start..=end` to `handler`. Offsets passed to
    /// the handler are relative to `start`.
    pub fn map(mut self, start: u32, end: u32, handler: H) -> Self {
        self.ranges.push((start, end, handler));
        self
    }

    pub fn build(self) -> Result<MemoryMap<H>, MapError> {
        let page_size = 1u32 << self.page_bits;
        let page_count = 1usize << (self.address_bits - self.page_bits);
        let limit = (1u32 << self.address_bits) - 1;
        let mut pages: Vec<Option<PageEntry<H>>> = vec![None; page_count];

        for &(start, end, handler) in &self.ranges {
            if end < start || end > limit {
                return Err(MapError::OutOfRange { start, end });
            }
            if start % page_size != 0 || (end + 1) % page_size != 0 {
                return Err(MapError::Misaligned {
                    start,
                    end,
                    page_size,
                });
            }
            for page in (start >> self.page_bits)..=(end >> self.page_bits) {
                let slot = &mut pages[page as usize];
                if slot.is_some() {
                    return Err(MapError::Overlap {
                        start,
                        end,
                        at: page << self.page_bits,
                    });
                }
                *slot = Some(PageEntry {
                    handler,
                    base: start,
                });
            }
        }

        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(page, entry)| entry.ok_or(MapError::Unmapped((page as u32) << self.page_bits)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MemoryMap {
            pages,
            page_bits: self.page_bits,
            address_mask: limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Region {
        Ram,
        Io,
        Rom,
    }

    fn builder() -> MemoryMapBuilder<Region> {
        MemoryMapBuilder::new(16, 8)
            .map(0x0000, 0x1FFF, Region::Ram)
            .map(0x2000, 0x7FFF, Region::Io)
            .map(0x8000, 0xFFFF, Region::Rom)
    }

    #[test]
    fn resolves_offsets_relative_to_range_start() {
        let map = builder().build().unwrap();
        assert_eq!(map.resolve(0x0042), (Region::Ram, 0x42));
        assert_eq!(map.resolve(0x2105), (Region::Io, 0x105));
        assert_eq!(map.resolve(0xFFFC), (Region::Rom, 0x7FFC));
    }

    #[test]
    fn hole_is_rejected() {
        let err = MemoryMapBuilder::new(16, 8)
            .map(0x0000, 0x7FFF, Region::Ram)
            .map(0x8100, 0xFFFF, Region::Rom)
            .build()
            .unwrap_err();
        assert_eq!(err, MapError::Unmapped(0x8000));
    }

    #[test]
    fn overlap_is_rejected() {
        let err = builder().map(0x1F00, 0x20FF, Region::Io).build().unwrap_err();
        assert!(matches!(err, MapError::Overlap { at: 0x1F00, .. }));
    }

    #[test]
    fn misaligned_range_is_rejected() {
        let err = MemoryMapBuilder::new(16, 8)
            .map(0x0000, 0x00FE, Region::Ram)
            .build()
            .unwrap_err();
        assert!(matches!(err, MapError::Misaligned { .. }));
    }

    #[test]
    fn range_past_address_space_is_rejected() {
        let err = MemoryMapBuilder::new(16, 8)
            .map(0x0000, 0x1FFFF, Region::Ram)
            .build()
            .unwrap_err();
        assert!(matches!(err, MapError::OutOfRange { .. }));
    }
}
