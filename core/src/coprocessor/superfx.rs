//! Super FX (GSU-2) cartridge coprocessor.
//!
//! Wraps the [`Gsu`] core with the primary CPU's register window:
//! - `$3000-$301F` R0-R15. The low byte is latched and the high byte write
//!   commits both; committing R14 starts a ROM buffer fill, committing R15
//!   starts the GSU (GO).
//! - `$3030-$303F` SFR, BRAMR, PBR, ROMBR, CFGR, SCBR, CLSR, SCMR, VCR,
//!   RAMBR, CBR.
//! - `$3100-$32FF` the instruction cache, offset by CBR.
//!
//! While the GSU runs it owns cartridge ROM (with `SCMR.RON`) and RAM (with
//! `SCMR.RAN`). Primary-CPU ROM reads then see a fixed pattern that steers
//! the interrupt vectors into WRAM; RAM reads see open bus.
use std::any::Any;

use log::trace;

use super::Coprocessor;
use crate::core::{
    AddressLookup, BusContender, BusOwnership, CartMemory, ClockDivider, ClockError, ClockRatio,
    MemoryHandler, Segment, SegmentKind,
};
use crate::cpu::gsu::{Gsu, Sfr, VERSION};
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

/// ROM pattern seen by the primary CPU while the GSU owns ROM.
const ROM_CONFLICT: [u8; 16] = [
    0x00, 0x01, 0x00, 0x01, 0x04, 0x01, 0x00, 0x01, 0x00, 0x01, 0x08, 0x01, 0x00, 0x01, 0x0C, 0x01,
];

pub const REGISTER_START: u32 = 0x3000;
pub const CACHE_START: u32 = 0x3100;
pub const CACHE_END: u32 = 0x32FF;

pub struct SuperFx {
    gsu: Gsu,
    divider: ClockDivider, // GSU cycles per master cycle (overclock)
    last_master: u64,      // master clock at the last catch-up
    target: u64,           // GSU cycle count the core is owed
    latch: u8,             // pending low byte of an R0-R15 write
}

impl SuperFx {
    pub fn new(clock_percent: u32) -> Result<Self, ClockError> {
        if clock_percent == 0 {
            return Err(ClockError::ZeroRate);
        }
        Ok(Self {
            gsu: Gsu::new(),
            divider: ClockDivider::new(ClockRatio::new(clock_percent as u64, 100)?),
            last_master: 0,
            target: 0,
            latch: 0,
        })
    }

    pub fn gsu(&self) -> &Gsu {
        &self.gsu
    }

    pub fn gsu_mut(&mut self) -> &mut Gsu {
        &mut self.gsu
    }

    pub fn set_clock_percent(&mut self, clock_percent: u32) -> Result<(), ClockError> {
        if clock_percent == 0 {
            return Err(ClockError::ZeroRate);
        }
        self.divider.set_ratio(ClockRatio::new(clock_percent as u64, 100)?);
        Ok(())
    }

    fn cache_offset(&self, address: u32) -> usize {
        (address.wrapping_sub(CACHE_START) as usize + self.gsu.cbr as usize) & 0x1FF
    }

    fn read_register(&mut self, address: u32) -> u8 {
        let value = self.peek_register(address);
        if address == 0x3031 && self.gsu.sfr.irq {
            trace!("SuperFX: IRQ acknowledged");
            self.gsu.sfr.irq = false;
        }
        value
    }

    fn peek_register(&self, address: u32) -> u8 {
        let gsu = &self.gsu;
        match address {
            0x3000..=0x301F => {
                let reg = gsu.r[((address >> 1) & 0x0F) as usize];
                if address & 1 == 0 { reg as u8 } else { (reg >> 8) as u8 }
            }
            0x3030 => gsu.sfr.bits() as u8,
            0x3031 => (gsu.sfr.bits() >> 8) as u8,
            0x3034 => gsu.pbr,
            0x3036 => gsu.rombr,
            0x303B => VERSION,
            0x303C => gsu.rambr,
            0x303E => gsu.cbr as u8,
            0x303F => (gsu.cbr >> 8) as u8,
            _ => 0x00,
        }
    }

    fn write_register(&mut self, address: u32, value: u8, cart: &mut CartMemory) {
        let gsu = &mut self.gsu;
        match address {
            0x3000..=0x301F => {
                if address & 1 == 0 {
                    self.latch = value;
                    return;
                }
                let n = ((address >> 1) & 0x0F) as usize;
                gsu.r[n] = (value as u16) << 8 | self.latch as u16;
                if n == 14 {
                    gsu.update_rom_buffer();
                }
                if n == 15 {
                    gsu.go();
                }
            }
            0x3030 => {
                let bits = (gsu.sfr.bits() & 0xFF00) | value as u16;
                let was_running = gsu.sfr.running;
                gsu.sfr.write_from_cpu(bits);
                match (was_running, bits & Sfr::G != 0) {
                    (true, false) => gsu.halt_from_cpu(cart),
                    (_, true) => gsu.go(),
                    (false, false) => {}
                }
            }
            0x3031 => {
                let bits = (value as u16) << 8 | (gsu.sfr.bits() & 0x00FF);
                gsu.sfr.write_from_cpu(bits);
            }
            0x3033 => gsu.bramr = value & 0x01 != 0,
            0x3034 => {
                gsu.pbr = value & 0x7F;
                gsu.cache.flush();
            }
            0x3037 => gsu.cfgr = value,
            0x3038 => gsu.scbr = value,
            0x3039 => gsu.clsr = value & 0x01 != 0,
            0x303A => gsu.scmr = value,
            _ => trace!("SuperFX: write ${value:02X} to read-only ${address:04X} ignored"),
        }
    }
}

impl BusContender for SuperFx {
    fn ownership(&self) -> BusOwnership {
        self.gsu.ownership()
    }

    fn conflict_read(&self, segment: Segment, address: u32, open_bus: u8) -> u8 {
        match segment {
            Segment::Rom => ROM_CONFLICT[(address & 0x0F) as usize],
            _ => open_bus,
        }
    }
}

impl MemoryHandler for SuperFx {
    type Context = CartMemory;

    fn read(&mut self, address: u32, _cart: &mut CartMemory) -> Option<u8> {
        match address {
            CACHE_START..=CACHE_END => Some(self.gsu.cache.byte(self.cache_offset(address))),
            0x3000..=0x303F => Some(self.read_register(address)),
            _ => None,
        }
    }

    fn peek(&self, address: u32, _cart: &CartMemory) -> Option<u8> {
        match address {
            CACHE_START..=CACHE_END => Some(self.gsu.cache.byte(self.cache_offset(address))),
            0x3000..=0x303F => Some(self.peek_register(address)),
            _ => None,
        }
    }

    fn write(&mut self, address: u32, value: u8, cart: &mut CartMemory) {
        match address {
            CACHE_START..=CACHE_END => {
                let offset = self.cache_offset(address);
                self.gsu.cache.write_external(offset, value);
            }
            0x3000..=0x303F => self.write_register(address, value, cart),
            _ => trace!("SuperFX: write ${value:02X} to unmapped ${address:04X}"),
        }
    }

    fn absolute_address(&self, address: u32) -> AddressLookup {
        match address {
            CACHE_START..=CACHE_END => {
                AddressLookup::mapped(self.cache_offset(address) as u32, SegmentKind::CoprocessorCache)
            }
            0x3000..=0x303F => AddressLookup::mapped(address - REGISTER_START, SegmentKind::Register),
            _ => AddressLookup::OpenBus,
        }
    }
}

impl Coprocessor for SuperFx {
    fn name(&self) -> &'static str {
        "superfx"
    }

    fn reset(&mut self) {
        self.gsu.power();
        self.latch = 0;
    }

    fn run(&mut self, master_clock: u64, cart: &mut CartMemory) {
        let elapsed = master_clock.saturating_sub(self.last_master);
        if elapsed == 0 {
            return;
        }
        self.last_master = master_clock;
        self.target += self.divider.step(elapsed);
        self.gsu.run_until(self.target, cart);
    }

    fn irq_pending(&self) -> bool {
        self.gsu.irq_pending()
    }

    fn internal_memory(&self) -> &[u8] {
        self.gsu.cache.as_slice()
    }

    fn internal_memory_mut(&mut self) -> &mut [u8] {
        self.gsu.cache.as_mut_slice()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Snapshot for SuperFx {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.nested("gsu", &mut self.gsu)?;
        s.nested("divider", &mut self.divider)?;
        s.value("lastMaster", &mut self.last_master)?;
        s.value("target", &mut self.target)?;
        s.value("latch", &mut self.latch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::gsu::{SCMR_RAN, SCMR_RON};
    use crate::snapshot;

    fn write_word(fx: &mut SuperFx, reg: u32, value: u16, cart: &mut CartMemory) {
        fx.write(0x3000 + reg * 2, value as u8, cart);
        fx.write(0x3001 + reg * 2, (value >> 8) as u8, cart);
    }

    #[test]
    fn register_write_commits_on_high_byte() {
        let mut cart = CartMemory::default();
        let mut fx = SuperFx::new(100).unwrap();
        fx.write(0x3000, 0x34, &mut cart);
        assert_eq!(fx.gsu().r[0], 0);
        fx.write(0x3001, 0x12, &mut cart);
        assert_eq!(fx.gsu().r[0], 0x1234);
        assert_eq!(fx.peek(0x3001, &cart), Some(0x12));
        assert!(!fx.gsu().is_running());
    }

    #[test]
    fn r15_high_write_starts_gsu() {
        let mut cart = CartMemory::default();
        let mut fx = SuperFx::new(100).unwrap();
        fx.write(0x303A, SCMR_RON | SCMR_RAN, &mut cart);
        write_word(&mut fx, 15, 0x8000, &mut cart);
        assert!(fx.gsu().is_running());
        assert_eq!(fx.ownership().rom, crate::core::Owner::Coprocessor);
        assert_eq!(fx.peek(0x3030, &cart), Some(Sfr::G as u8));
    }

    #[test]
    fn conflict_pattern_by_address() {
        let fx = SuperFx::new(100).unwrap();
        assert_eq!(fx.conflict_read(Segment::Rom, 0xFFEA, 0x55), 0x08);
        assert_eq!(fx.conflict_read(Segment::Rom, 0x8004, 0x55), 0x04);
        assert_eq!(fx.conflict_read(Segment::Rom, 0x8005, 0x55), 0x01);
        assert_eq!(fx.conflict_read(Segment::Ram, 0x6000, 0x55), 0x55);
    }

    #[test]
    fn clearing_g_stops_and_flushes() {
        let mut cart = CartMemory::default();
        let mut fx = SuperFx::new(100).unwrap();
        for i in 0..16 {
            fx.write(CACHE_START + i, i as u8, &mut cart);
        }
        assert!(fx.gsu().cache.is_valid(0));
        fx.write(0x3030, Sfr::G as u8, &mut cart);
        assert!(fx.gsu().is_running());
        fx.write(0x3030, 0, &mut cart);
        assert!(!fx.gsu().is_running());
        assert_eq!(fx.gsu().cache.valid_mask(), 0);
        assert_eq!(fx.gsu().cbr, 0);
    }

    #[test]
    fn sfr_high_read_acknowledges_irq() {
        let mut cart = CartMemory::default();
        let mut fx = SuperFx::new(100).unwrap();
        fx.gsu_mut().sfr.irq = true;
        assert!(fx.irq_pending());
        assert_eq!(fx.peek(0x3031, &cart), Some(0x80));
        assert!(fx.irq_pending());
        assert_eq!(fx.read(0x3031, &mut cart), Some(0x80));
        assert!(!fx.irq_pending());
    }

    #[test]
    fn overclock_scales_gsu_time() {
        let mut cart = CartMemory::default();
        let mut fx = SuperFx::new(150).unwrap();
        fx.run(100, &mut cart);
        assert_eq!(fx.gsu().cycle_count, 150);
        fx.run(101, &mut cart);
        fx.run(102, &mut cart);
        assert_eq!(fx.gsu().cycle_count, 153);
    }

    #[test]
    fn cpu_sfr_write_cannot_set_rom_flag() {
        let mut cart = CartMemory::new(vec![0; 0x8000], 0);
        let mut fx = SuperFx::new(100).unwrap();
        fx.write(0x3030, Sfr::R as u8, &mut cart);
        fx.run(1000, &mut cart);
        assert!(!fx.gsu().sfr.rom_pending);
        assert_eq!(fx.peek(0x3030, &cart), Some(0));
    }

    #[test]
    fn cpu_sfr_write_keeps_pending_rom_flag() {
        let mut cart = CartMemory::new(vec![0; 0x8000], 0);
        let mut fx = SuperFx::new(100).unwrap();
        write_word(&mut fx, 14, 0x8000, &mut cart);
        assert!(fx.gsu().sfr.rom_pending);
        fx.write(0x3030, 0, &mut cart);
        fx.write(0x3031, 0, &mut cart);
        assert!(fx.gsu().sfr.rom_pending);
        assert_eq!(fx.peek(0x3030, &cart), Some(Sfr::R as u8));
        assert!(snapshot::save(&mut fx).is_ok());
    }

    /// A stopped GSU with a ROM fill and a RAM write in flight and two valid
    /// cache lines holding NOP NOP NOP STOP.
    fn busy_superfx(cart: &mut CartMemory) -> SuperFx {
        let mut fx = SuperFx::new(150).unwrap();
        fx.write(0x303A, SCMR_RON | SCMR_RAN, cart);
        for line in [0x20, 0x30] {
            for i in 0..16 {
                let opcode = if line == 0x20 && i == 3 { 0x00 } else { 0x01 };
                fx.write(CACHE_START + line + i, opcode, cart);
            }
        }
        let gsu = fx.gsu_mut();
        gsu.r[14] = 0x8010;
        gsu.update_rom_buffer();
        gsu.write_ram_buffer(0x0040, 0x5A, cart);
        fx
    }

    #[test]
    fn save_state_restores_in_flight_work() {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0010] = 0x99;
        let mut cart = CartMemory::new(rom, 0x2000);
        let mut fx = busy_superfx(&mut cart);
        assert!(fx.gsu().sfr.rom_pending);
        assert!(fx.gsu().ram_write.is_pending());
        assert_eq!(fx.gsu().cache.valid_mask(), 0b1100);

        let bytes = snapshot::save(&mut fx).unwrap();
        let mut restored = SuperFx::new(150).unwrap();
        snapshot::load(&mut restored, &bytes).unwrap();
        assert_eq!(snapshot::save(&mut restored).unwrap(), bytes);
        assert_eq!(restored.gsu().cache.valid_mask(), 0b1100);
        assert_eq!(restored.internal_memory(), fx.internal_memory());

        let mut restored_cart = cart.clone();
        for (unit, cart) in [(&mut fx, &mut cart), (&mut restored, &mut restored_cart)] {
            write_word(unit, 15, 0x0020, cart);
            unit.run(400, cart);
            assert!(!unit.gsu().is_running());
            assert!(unit.irq_pending());
            assert!(!unit.gsu().sfr.rom_pending);
            assert_eq!(unit.gsu().rom_data, 0x99);
        }
        assert_eq!(restored.gsu().cycle_count, fx.gsu().cycle_count);
        assert_eq!(restored_cart.ram(), cart.ram());
        assert_eq!(snapshot::save(&mut restored).unwrap(), snapshot::save(&mut fx).unwrap());
    }

    #[test]
    fn version_register() {
        let cart = CartMemory::default();
        let fx = SuperFx::new(100).unwrap();
        assert_eq!(fx.peek(0x303B, &cart), Some(VERSION));
        assert_eq!(fx.peek(0x3040, &cart), None);
    }
}
