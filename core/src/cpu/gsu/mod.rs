//! Super FX (GSU) coprocessor core.
//!
//! The GSU runs its own instruction stream out of cartridge ROM/RAM through a
//! one-byte pipeline and a 512-byte instruction cache. It shares the
//! cartridge buses with the primary CPU; which master owns them is decided by
//! `SFR.G` together with `SCMR.RON`/`SCMR.RAN`.
//!
//! Time is counted in master cycles. Every opcode fetch, ROM buffer fill and
//! RAM buffer write costs a fixed number of cycles (halved with `CLSR`), and
//! buffered accesses complete asynchronously through [`PendingAccess`].
//!
//! Plot, pixel and colour opcodes belong to the graphics pipeline, which is
//! not modelled; they execute as NOPs.

mod alu;
mod branch;
mod load_store;
mod memory;

use log::debug;

use crate::coprocessor::run_state::{InstructionCache, PendingAccess};
use crate::core::{BusOwnership, CartMemory, Owner};
use crate::cpu::state::{CpuStateTrait, GsuState};
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

/// Version code reported by the VCR register (GSU-2).
pub const VERSION: u8 = 0x04;

/// Status/flag register, decomposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Snapshot)]
pub struct Sfr {
    pub zero: bool,
    pub carry: bool,
    pub sign: bool,
    pub overflow: bool,
    /// G: the core is executing.
    pub running: bool,
    /// R: a ROM buffer fill is in flight.
    pub rom_pending: bool,
    pub alt1: bool,
    pub alt2: bool,
    /// IL/IH: the low or high byte of an immediate operand is pending.
    pub imm_low: bool,
    pub imm_high: bool,
    /// B: a WITH prefix is active.
    pub prefix: bool,
    pub irq: bool,
}

impl Sfr {
    pub const Z: u16 = 1 << 1;
    pub const CY: u16 = 1 << 2;
    pub const S: u16 = 1 << 3;
    pub const OV: u16 = 1 << 4;
    pub const G: u16 = 1 << 5;
    pub const R: u16 = 1 << 6;
    pub const ALT1: u16 = 1 << 8;
    pub const ALT2: u16 = 1 << 9;
    pub const IL: u16 = 1 << 10;
    pub const IH: u16 = 1 << 11;
    pub const B: u16 = 1 << 12;
    pub const IRQ: u16 = 1 << 15;

    pub fn bits(&self) -> u16 {
        let mut v = 0;
        for (set, bit) in [
            (self.zero, Self::Z),
            (self.carry, Self::CY),
            (self.sign, Self::S),
            (self.overflow, Self::OV),
            (self.running, Self::G),
            (self.rom_pending, Self::R),
            (self.alt1, Self::ALT1),
            (self.alt2, Self::ALT2),
            (self.imm_low, Self::IL),
            (self.imm_high, Self::IH),
            (self.prefix, Self::B),
            (self.irq, Self::IRQ),
        ] {
            if set {
                v |= bit;
            }
        }
        v
    }

    pub fn set_bits(&mut self, v: u16) {
        self.zero = v & Self::Z != 0;
        self.carry = v & Self::CY != 0;
        self.sign = v & Self::S != 0;
        self.overflow = v & Self::OV != 0;
        self.running = v & Self::G != 0;
        self.rom_pending = v & Self::R != 0;
        self.alt1 = v & Self::ALT1 != 0;
        self.alt2 = v & Self::ALT2 != 0;
        self.imm_low = v & Self::IL != 0;
        self.imm_high = v & Self::IH != 0;
        self.prefix = v & Self::B != 0;
        self.irq = v & Self::IRQ != 0;
    }

    /// Bits the primary CPU can change through `$3030/$3031`. G is handled
    /// by the caller as GO/STOP and R follows the ROM buffer.
    pub const CPU_WRITABLE: u16 = !(Self::G | Self::R);

    pub fn write_from_cpu(&mut self, v: u16) {
        let kept = self.bits() & !Self::CPU_WRITABLE;
        self.set_bits(v & Self::CPU_WRITABLE | kept);
    }
}

/// SCMR bits that hand the cartridge buses to the GSU.
pub const SCMR_RON: u8 = 0x10;
pub const SCMR_RAN: u8 = 0x08;
/// CFGR bits.
pub const CFGR_IRQ_MASK: u8 = 0x80;
pub const CFGR_MS0: u8 = 0x20;

#[derive(Clone)]
pub struct Gsu {
    pub r: [u16; 16],
    pub sfr: Sfr,
    pub pbr: u8,
    pub rombr: u8,
    pub rambr: u8,
    pub cbr: u16,
    pub scbr: u8,
    pub scmr: u8,
    pub cfgr: u8,
    pub clsr: bool,
    pub bramr: bool,
    pub sreg: u8,
    pub dreg: u8,

    pub(crate) pipeline: u8,
    pub(crate) ramaddr: u16,
    pub(crate) rom_data: u8,
    pub(crate) rom_fetch: PendingAccess,
    pub(crate) ram_write: PendingAccess,
    pub cache: InstructionCache,

    /// Master cycles consumed since power-on.
    pub cycle_count: u64,

    pub(crate) r14_modified: bool,
    pub(crate) r15_modified: bool,
    /// Stalled until the named bus is handed back.
    pub(crate) wait_rom: bool,
    pub(crate) wait_ram: bool,
    /// Cartridge RAM bytes overwritten by the instruction in progress, as
    /// `(offset, previous value)`.
    pub(crate) ram_undo: Vec<(u32, u8)>,
}

impl Default for Gsu {
    fn default() -> Self {
        Self::new()
    }
}

impl Gsu {
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            sfr: Sfr::default(),
            pbr: 0,
            rombr: 0,
            rambr: 0,
            cbr: 0,
            scbr: 0,
            scmr: 0,
            cfgr: 0,
            clsr: false,
            bramr: false,
            sreg: 0,
            dreg: 0,
            pipeline: 0x01,
            ramaddr: 0,
            rom_data: 0,
            rom_fetch: PendingAccess::default(),
            ram_write: PendingAccess::default(),
            cache: InstructionCache::new(),
            cycle_count: 0,
            r14_modified: false,
            r15_modified: false,
            wait_rom: false,
            wait_ram: false,
            ram_undo: Vec::new(),
        }
    }

    /// Power-on state. The cycle position is kept so the core stays aligned
    /// with the master clock.
    pub fn power(&mut self) {
        let cycle_count = self.cycle_count;
        *self = Self::new();
        self.cycle_count = cycle_count;
    }

    pub fn is_running(&self) -> bool {
        self.sfr.running
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_rom || self.wait_ram
    }

    pub fn irq_pending(&self) -> bool {
        self.sfr.irq
    }

    /// Current owner of each cartridge bus.
    pub fn ownership(&self) -> BusOwnership {
        let running = self.sfr.running;
        let owner = |granted: bool| {
            if running && granted {
                Owner::Coprocessor
            } else {
                Owner::Primary
            }
        };
        BusOwnership {
            rom: owner(self.scmr & SCMR_RON != 0),
            ram: owner(self.scmr & SCMR_RAN != 0),
        }
    }

    /// Start execution (GO). A GO while running changes nothing.
    pub fn go(&mut self) {
        if self.sfr.running {
            debug!("GSU: GO while running at R15=${:04X}, ignored", self.r[15]);
            return;
        }
        debug!(
            "GSU: GO at ${:02X}:{:04X}, cycle {}",
            self.pbr, self.r[15], self.cycle_count
        );
        self.sfr.running = true;
    }

    /// The primary CPU cleared G. A RAM write still in flight lands at once
    /// if the GSU held RAM up to now, otherwise it is dropped.
    pub fn halt_from_cpu(&mut self, cart: &mut CartMemory) {
        debug!("GSU: stopped by CPU at R15=${:04X}", self.r[15]);
        self.settle_ram_write(cart);
        self.sfr.running = false;
        self.cbr = 0;
        self.cache.flush();
        self.wait_rom = false;
        self.wait_ram = false;
    }

    /// Clear the prefix state after an instruction.
    #[inline]
    pub(crate) fn reset_prefix(&mut self) {
        self.sfr.prefix = false;
        self.sfr.alt1 = false;
        self.sfr.alt2 = false;
        self.sreg = 0;
        self.dreg = 0;
    }

    #[inline]
    pub(crate) fn sr(&self) -> u16 {
        self.r[self.sreg as usize]
    }

    /// Write a register, tracking the side effects of R14 and R15.
    #[inline]
    pub(crate) fn set_reg(&mut self, n: u8, value: u16) {
        let n = (n & 0x0F) as usize;
        self.r[n] = value;
        match n {
            14 => self.r14_modified = true,
            15 => self.r15_modified = true,
            _ => {}
        }
    }

    /// Write the destination register selected by TO/WITH.
    #[inline]
    pub(crate) fn set_dr(&mut self, value: u16) {
        self.set_reg(self.dreg, value);
    }

    #[inline]
    pub(crate) fn set_sz(&mut self, value: u16) {
        self.sfr.sign = value & 0x8000 != 0;
        self.sfr.zero = value == 0;
    }

    /// Master cycles for a cache hit.
    #[inline]
    pub(crate) fn cache_cycles(&self) -> u32 {
        if self.clsr { 1 } else { 2 }
    }

    /// Master cycles for a ROM/RAM access.
    #[inline]
    pub(crate) fn memory_cycles(&self) -> u32 {
        if self.clsr { 5 } else { 6 }
    }

    /// Run until `target` master cycles, or until the core halts or stalls.
    /// While halted or stalled, time still passes so pending accesses finish.
    ///
    /// Instructions are atomic: one that would complete after `target` is
    /// rolled back and retried on a later call, so nothing it does is visible
    /// before its completion cycle. The core may therefore stop short of
    /// `target` but never passes it.
    pub fn run_until(&mut self, target: u64, cart: &mut CartMemory) {
        while self.cycle_count < target {
            self.release_waits();
            if !self.sfr.running || !self.can_start_instruction() {
                let idle = target - self.cycle_count;
                self.step(idle, cart);
                // Ownership may only change from outside, so nothing more can
                // happen before the target.
                break;
            }
            let checkpoint = self.clone();
            self.execute_instruction(cart);
            if self.cycle_count > target {
                self.rewind(checkpoint, cart);
                break;
            }
        }
    }

    /// Undo a partly executed instruction, cartridge RAM included.
    fn rewind(&mut self, checkpoint: Gsu, cart: &mut CartMemory) {
        for &(offset, previous) in self.ram_undo.iter().rev() {
            cart.set_ram_byte(offset, previous);
        }
        *self = checkpoint;
    }

    /// Execute one instruction (including its opcode fetch).
    pub fn execute_instruction(&mut self, cart: &mut CartMemory) {
        self.ram_undo.clear();
        let opcode = self.peek_pipe(cart);
        self.dispatch(opcode, cart);

        if self.r14_modified {
            self.r14_modified = false;
            self.update_rom_buffer();
        }
        if self.r15_modified {
            self.r15_modified = false;
        } else {
            self.r[15] = self.r[15].wrapping_add(1);
        }
    }

    fn release_waits(&mut self) {
        let owns = self.ownership();
        if self.wait_rom && owns.rom == Owner::Coprocessor {
            self.wait_rom = false;
        }
        if self.wait_ram && owns.ram == Owner::Coprocessor {
            self.wait_ram = false;
        }
    }

    /// An instruction starts only if it holds every bus it will touch. RAM
    /// buffer writes could otherwise land while the primary CPU owns RAM, and
    /// ROM reads would see data the GSU has no right to yet.
    fn can_start_instruction(&mut self) -> bool {
        if self.is_waiting() {
            return false;
        }
        let owns = self.ownership();
        let (opcode, alt1, alt2) = (self.pipeline, self.sfr.alt1, self.sfr.alt2);
        if owns.ram != Owner::Coprocessor && (self.pbr >= 0x60 || touches_ram(opcode, alt1, alt2)) {
            self.wait_ram = true;
        }
        let rom_buffer = self.rom_fetch.is_pending() && reads_rom_buffer(opcode, alt1, alt2);
        if owns.rom != Owner::Coprocessor && (rom_buffer || self.fetch_needs_rom(operand_bytes(opcode))) {
            self.wait_rom = true;
        }
        !self.is_waiting()
    }

    fn dispatch(&mut self, opcode: u8, cart: &mut CartMemory) {
        let n = opcode & 0x0F;
        match opcode {
            0x00 => self.op_stop(cart),
            0x01 => self.reset_prefix(),
            0x02 => self.op_cache(cart),
            0x03 => self.op_lsr(),
            0x04 => self.op_rol(),
            0x05..=0x0F => self.op_branch(opcode, cart),
            0x10..=0x1F => self.op_to(n),
            0x20..=0x2F => self.op_with(n),
            0x30..=0x3B => self.op_store(n, cart),
            0x3C => self.op_loop(),
            0x3D => {
                self.sfr.prefix = false;
                self.sfr.alt1 = true;
            }
            0x3E => {
                self.sfr.prefix = false;
                self.sfr.alt2 = true;
            }
            0x3F => {
                self.sfr.prefix = false;
                self.sfr.alt1 = true;
                self.sfr.alt2 = true;
            }
            0x40..=0x4B => self.op_load(n, cart),
            0x4D => self.op_swap(),
            0x4F => self.op_not(),
            0x50..=0x5F => self.op_add(n),
            0x60..=0x6F => self.op_sub(n),
            0x70 => self.op_merge(),
            0x71..=0x7F => self.op_and(n),
            0x80..=0x8F => self.op_mult(n, cart),
            0x90 => self.op_sbk(cart),
            0x91..=0x94 => self.op_link(n),
            0x95 => self.op_sex(),
            0x96 => self.op_asr(),
            0x97 => self.op_ror(),
            0x98..=0x9D => self.op_jmp(n, cart),
            0x9E => self.op_lob(),
            0x9F => self.op_fmult(cart),
            0xA0..=0xAF => self.op_ibt(n, cart),
            0xB0..=0xBF => self.op_from(n),
            0xC0 => self.op_hib(),
            0xC1..=0xCF => self.op_or(n),
            0xD0..=0xDE => self.op_inc(n),
            0xDF => self.op_bank(cart),
            0xE0..=0xEE => self.op_dec(n),
            0xEF => self.op_getb(cart),
            0xF0..=0xFF => self.op_iwt(n, cart),
            // PLOT/RPIX, COLOR/CMODE: graphics pipeline
            0x4C | 0x4E => self.reset_prefix(),
        }
    }
}

/// Whether an opcode (with the ALT state it will run under) accesses RAM
/// through the RAM buffer.
fn touches_ram(opcode: u8, alt1: bool, alt2: bool) -> bool {
    match opcode {
        0x30..=0x3B | 0x40..=0x4B | 0x90 => true,
        0xA0..=0xAF | 0xF0..=0xFF => alt1 || alt2,
        0xDF => alt2 && !alt1,
        _ => false,
    }
}

/// Whether an opcode waits for the ROM buffer (GETB, GETC, ROMB).
fn reads_rom_buffer(opcode: u8, alt1: bool, alt2: bool) -> bool {
    match opcode {
        0xEF => true,
        0xDF => alt1 || !alt2,
        _ => false,
    }
}

/// Immediate operand bytes following an opcode in the instruction stream.
fn operand_bytes(opcode: u8) -> u16 {
    match opcode {
        0x05..=0x0F | 0xA0..=0xAF => 1,
        0xF0..=0xFF => 2,
        _ => 0,
    }
}

impl CpuStateTrait for Gsu {
    type Snapshot = GsuState;

    fn snapshot(&self) -> GsuState {
        GsuState {
            r: self.r,
            sfr: self.sfr.bits(),
            pbr: self.pbr,
            rombr: self.rombr,
            rambr: self.rambr,
            cbr: self.cbr,
            sreg: self.sreg,
            dreg: self.dreg,
            cycle_count: self.cycle_count,
        }
    }
}

impl Snapshot for Gsu {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.array("r", &mut self.r)?;
        s.nested("sfr", &mut self.sfr)?;
        s.value("pbr", &mut self.pbr)?;
        s.value("rombr", &mut self.rombr)?;
        s.value("rambr", &mut self.rambr)?;
        s.value("cbr", &mut self.cbr)?;
        s.value("scbr", &mut self.scbr)?;
        s.value("scmr", &mut self.scmr)?;
        s.value("cfgr", &mut self.cfgr)?;
        s.value("clsr", &mut self.clsr)?;
        s.value("bramr", &mut self.bramr)?;
        s.value("sreg", &mut self.sreg)?;
        s.value("dreg", &mut self.dreg)?;
        s.value("pipeline", &mut self.pipeline)?;
        s.value("ramaddr", &mut self.ramaddr)?;
        s.value("romData", &mut self.rom_data)?;
        s.nested("romFetch", &mut self.rom_fetch)?;
        s.nested("ramWrite", &mut self.ram_write)?;
        s.nested("cache", &mut self.cache)?;
        s.value("cycleCount", &mut self.cycle_count)?;
        s.value("r14Modified", &mut self.r14_modified)?;
        s.value("r15Modified", &mut self.r15_modified)?;
        s.value("waitRom", &mut self.wait_rom)?;
        s.value("waitRam", &mut self.wait_ram)?;
        if self.sreg > 15 || self.dreg > 15 {
            return Err(s.invalid("sreg"));
        }
        if self.sfr.rom_pending != self.rom_fetch.is_pending() {
            return Err(s.invalid("sfr"));
        }
        Ok(())
    }
}
