//! GSU side of the cartridge buses: address decoding, the ROM/RAM buffers,
//! opcode fetch through the cache and the pipeline.

use log::trace;

use super::Gsu;
use crate::coprocessor::run_state::CACHE_SIZE;
use crate::core::{Arbiter, BusAccess, BusMaster, CartMemory, Grant, Segment};

/// Base of the GSU's view of cartridge RAM.
const RAM_BASE: u32 = 0x70_0000;

/// Decode a 24-bit GSU address to a cartridge segment and offset.
///
/// `$00-3F` is LoROM-style (32 KiB per bank), `$40-5F` linear ROM and
/// `$60-7F` RAM. Everything else is unmapped.
pub fn decode(address: u32) -> Option<(Segment, u32)> {
    let address = address & 0xFF_FFFF;
    match address & 0xE0_0000 {
        0x00_0000 | 0x20_0000 => Some((Segment::Rom, (address & 0x3F_0000) >> 1 | (address & 0x7FFF))),
        0x40_0000 => Some((Segment::Rom, address & 0x1F_FFFF)),
        0x60_0000 => Some((Segment::Ram, address & 0x1F_FFFF)),
        _ => None,
    }
}

impl Gsu {
    /// Read a byte from the GSU's address space. Ownership is settled before
    /// an instruction starts, so every read here is one the GSU may make.
    pub(crate) fn bus_read(&self, address: u32, cart: &CartMemory) -> u8 {
        match decode(address) {
            Some((Segment::Ram, offset)) => cart.ram_byte(offset),
            Some((_, offset)) => cart.rom_byte(offset),
            None => 0xFF,
        }
    }

    fn owns(&self, segment: Segment, access: &BusAccess) -> bool {
        Arbiter::arbitrate(access, segment, self.ownership()) == Grant::Granted
    }

    /// Let `cycles` master cycles pass, retiring buffered accesses whose
    /// latency has run out. A ROM buffer fill that comes due without ROM
    /// ownership stays pending until the bus is handed back.
    pub(crate) fn step(&mut self, cycles: u64, cart: &mut CartMemory) {
        self.cycle_count += cycles;
        if self.rom_fetch.advance(cycles) {
            let access = BusAccess::read(BusMaster::Coprocessor, self.rom_fetch.address());
            if self.owns(Segment::Rom, &access) {
                let (address, _) = self.rom_fetch.complete();
                self.sfr.rom_pending = false;
                self.rom_data = self.bus_read(address, cart);
            }
        }
        if self.ram_write.advance(cycles) {
            self.commit_ram_write(cart);
        }
    }

    /// Store to cartridge RAM, logging the old byte so an instruction that
    /// does not finish in time can be rolled back.
    fn store_ram(&mut self, address: u32, data: u8, cart: &mut CartMemory) {
        if let Some((Segment::Ram, offset)) = decode(address) {
            self.ram_undo.push((offset, cart.ram_byte(offset)));
            cart.set_ram_byte(offset, data);
        }
    }

    /// Land a RAM buffer write whose latency has elapsed. Without RAM
    /// ownership it stays deferred and is retried on every step.
    fn commit_ram_write(&mut self, cart: &mut CartMemory) {
        let address = self.ram_write.address();
        let access = BusAccess::write(BusMaster::Coprocessor, address);
        match Arbiter::arbitrate(&access, Segment::Ram, self.ownership()) {
            Grant::Granted => {
                let (address, data) = self.ram_write.complete();
                self.store_ram(address, data, cart);
            }
            Grant::Denied => {
                if !self.wait_ram {
                    trace!("GSU write ${address:06X} deferred until RAM is granted");
                }
                self.wait_ram = true;
            }
        }
    }

    /// Resolve an in-flight RAM write before the GSU loses the bus.
    pub(crate) fn settle_ram_write(&mut self, cart: &mut CartMemory) {
        if !self.ram_write.is_pending() {
            return;
        }
        let access = BusAccess::write(BusMaster::Coprocessor, self.ram_write.address());
        if self.owns(Segment::Ram, &access) {
            let (address, data) = self.ram_write.complete();
            self.store_ram(address, data, cart);
        } else {
            let (address, data) = (self.ram_write.address(), self.ram_write.data());
            trace!("GSU stopped with write ${data:02X} -> ${address:06X} deferred, discarded");
            self.ram_write.cancel();
        }
    }

    /// Wait out any ROM buffer fill in flight.
    pub(crate) fn sync_rom(&mut self, cart: &mut CartMemory) {
        if self.rom_fetch.is_pending() {
            let remaining = self.rom_fetch.remaining() as u64;
            self.step(remaining, cart);
        }
    }

    /// Wait out any RAM buffer write in flight.
    pub(crate) fn sync_ram(&mut self, cart: &mut CartMemory) {
        if self.ram_write.is_pending() {
            let remaining = self.ram_write.remaining() as u64;
            self.step(remaining, cart);
        }
    }

    /// Start a ROM buffer fill from `ROMBR:R14`.
    pub fn update_rom_buffer(&mut self) {
        self.sfr.rom_pending = true;
        let address = (self.rombr as u32) << 16 | self.r[14] as u32;
        self.rom_fetch.schedule(self.memory_cycles(), address, 0);
    }

    pub(crate) fn read_rom_buffer(&mut self, cart: &mut CartMemory) -> u8 {
        self.sync_rom(cart);
        self.rom_data
    }

    pub(crate) fn ram_buffer_address(&self, address: u16) -> u32 {
        RAM_BASE + ((self.rambr as u32) << 16) + address as u32
    }

    pub(crate) fn read_ram_buffer(&mut self, address: u16, cart: &mut CartMemory) -> u8 {
        self.sync_ram(cart);
        let address = self.ram_buffer_address(address);
        self.bus_read(address, cart)
    }

    pub(crate) fn write_ram_buffer(&mut self, address: u16, data: u8, cart: &mut CartMemory) {
        self.sync_ram(cart);
        if self.ram_write.is_pending() {
            trace!(
                "GSU write ${:06X} still deferred, replaced",
                self.ram_write.address()
            );
        }
        let address = self.ram_buffer_address(address);
        self.ram_write.schedule(self.memory_cycles(), address, data);
    }

    /// Invalidate the cache. Flushes issued by the GSU's own instructions
    /// take one memory cycle.
    pub(crate) fn flush_cache(&mut self, cart: &mut CartMemory) {
        self.cache.flush();
        let cycles = self.memory_cycles() as u64;
        self.step(cycles, cart);
    }

    /// Fetch an opcode byte at `PBR:address`, through the cache when the
    /// address falls in the 512-byte window at `CBR`.
    pub(crate) fn read_opcode(&mut self, address: u16, cart: &mut CartMemory) -> u8 {
        let offset = address.wrapping_sub(self.cbr) as usize;
        if offset < 512 {
            let line = offset >> 4;
            if !self.cache.is_valid(line) {
                let start = offset & 0xFFF0;
                let source = (self.pbr as u32) << 16 | (self.cbr.wrapping_add(start as u16) & 0xFFF0) as u32;
                for i in 0..16 {
                    let cycles = self.memory_cycles() as u64;
                    self.step(cycles, cart);
                    let byte = self.bus_read(source + i as u32, cart);
                    self.cache.set_byte(start + i, byte);
                }
                self.cache.set_valid(line);
            } else {
                let cycles = self.cache_cycles() as u64;
                self.step(cycles, cart);
            }
            return self.cache.byte(offset);
        }

        if self.pbr <= 0x5F {
            self.sync_rom(cart);
        } else {
            self.sync_ram(cart);
        }
        let cycles = self.memory_cycles() as u64;
        self.step(cycles, cart);
        self.bus_read((self.pbr as u32) << 16 | address as u32, cart)
    }

    /// Whether fetching the next opcode and `operands` immediate bytes from
    /// R15 goes out to ROM rather than hitting the cache.
    pub(crate) fn fetch_needs_rom(&self, operands: u16) -> bool {
        if self.pbr > 0x5F {
            return false;
        }
        (0..=operands).any(|i| {
            let offset = self.r[15].wrapping_add(i).wrapping_sub(self.cbr) as usize;
            offset >= CACHE_SIZE || !self.cache.is_valid(offset >> 4)
        })
    }

    /// Return the pipelined byte and refill the pipeline from R15.
    pub(crate) fn peek_pipe(&mut self, cart: &mut CartMemory) -> u8 {
        let result = self.pipeline;
        self.pipeline = self.read_opcode(self.r[15], cart);
        self.r15_modified = false;
        result
    }

    /// Advance R15, then as `peek_pipe`. Used for immediate operands.
    pub(crate) fn pipe(&mut self, cart: &mut CartMemory) -> u8 {
        self.r[15] = self.r[15].wrapping_add(1);
        self.peek_pipe(cart)
    }
}
