//! The console: one primary CPU, work RAM, the H/V timer and at most one
//! cartridge coprocessor sharing the cartridge ROM and RAM.
//!
//! Everything advances from one master clock. Each primary CPU cycle is
//! [`CPU_CLOCK_DIVIDER`] master cycles; the timer ticks once per dot; the
//! coprocessor catches up to the master clock after every CPU cycle and
//! before every CPU access that could observe it.

use log::{debug, trace, warn};
use thiserror::Error;

use quartz_core::coprocessor::{self, Coprocessor, CoprocessorOptions};
use quartz_core::core::arbiter::{locate_shared, read_shared, write_shared};
use quartz_core::core::bus::InterruptState;
use quartz_core::core::clock::drive;
use quartz_core::core::machine::{Machine, MemoryType};
use quartz_core::core::{
    AddressLookup, Bus, BusAccess, BusMaster, CartMemory, ClockDivider, ClockError, Component,
    MapError, MasterClock, MemoryHandler, MemoryMap, Segment, SegmentKind,
};
use quartz_core::cpu::{Cpu, M6502};
use quartz_core::device::hv_timer::HvTimer;
use quartz_core::device::Ram;
use quartz_core::snapshot::{self, Serializer, Snapshot, SnapshotError};

use crate::boards::Board;

/// Master cycles per primary CPU cycle.
pub const CPU_CLOCK_DIVIDER: u64 = 6;
pub const WRAM_SIZE: usize = 0x2000;
/// Largest ROM image the coprocessor address decoder can reach.
pub const MAX_ROM_SIZE: usize = 0x20_0000;

const CPU: BusMaster = BusMaster::Cpu(0);

/// Handler ids in a board's memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Wram,
    Timer,
    Coprocessor,
    CartRam,
    CartRom,
    OpenBus,
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid memory map: {0}")]
    Map(#[from] MapError),

    #[error("invalid clock setting: {0}")]
    Clock(#[from] ClockError),

    #[error("ROM image is empty")]
    EmptyRom,

    #[error("ROM image of {0} bytes exceeds the {MAX_ROM_SIZE}-byte address space")]
    RomTooLarge(usize),
}

// ---------------------------------------------------------------------------
// System bus
// ---------------------------------------------------------------------------

/// Everything the primary CPU can reach, plus the master clock.
pub struct SystemBus {
    map: MemoryMap<Region>,
    wram: Ram,
    cart: CartMemory,
    timer: HvTimer,
    timer_divider: ClockDivider,
    coprocessor: Option<Box<dyn Coprocessor>>,
    master: MasterClock,
    /// Last value driven on the CPU data bus.
    open_bus: u8,
}

impl SystemBus {
    fn new(
        map: MemoryMap<Region>,
        cart: CartMemory,
        coprocessor: Option<Box<dyn Coprocessor>>,
    ) -> Result<Self, ClockError> {
        let timer = HvTimer::new();
        let timer_divider = ClockDivider::new(timer.clock_ratio()?);
        Ok(Self {
            map,
            wram: Ram::new(WRAM_SIZE, SegmentKind::Wram),
            cart,
            timer,
            timer_divider,
            coprocessor,
            master: MasterClock::new(),
            open_bus: 0,
        })
    }

    pub fn master_cycles(&self) -> u64 {
        self.master.cycles()
    }

    pub fn timer(&self) -> &HvTimer {
        &self.timer
    }

    pub fn cart(&self) -> &CartMemory {
        &self.cart
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    pub fn coprocessor(&self) -> Option<&dyn Coprocessor> {
        self.coprocessor.as_deref()
    }

    /// Bring the coprocessor up to the current master cycle.
    fn sync_coprocessor(&mut self) {
        if let Some(coprocessor) = self.coprocessor.as_mut() {
            coprocessor.run(self.master.cycles(), &mut self.cart);
        }
    }

    /// Advance the master clock by `delta`, stepping the timer and catching
    /// the coprocessor up. Returns true when a frame ended.
    fn advance(&mut self, delta: u64) -> Result<bool, ClockError> {
        self.master.advance(delta)?;
        let frame_ended = drive(&mut self.timer, &mut self.timer_divider, delta);
        self.sync_coprocessor();
        if frame_ended {
            if let Some(coprocessor) = self.coprocessor.as_mut() {
                coprocessor.process_end_of_frame();
            }
        }
        Ok(frame_ended)
    }

    fn read_rom(&mut self, address: u32, offset: u32) -> u8 {
        self.sync_coprocessor();
        self.peek_rom(address, offset)
    }

    fn read_ram(&mut self, address: u32, offset: u32) -> Option<u8> {
        self.sync_coprocessor();
        self.peek_ram(address, offset)
    }

    fn peek_ram(&self, address: u32, offset: u32) -> Option<u8> {
        if self.cart.ram().is_empty() {
            return None;
        }
        let access = BusAccess::read(CPU, address);
        let cart = &self.cart;
        Some(match self.coprocessor.as_deref() {
            Some(c) => read_shared(c, &access, Segment::Ram, self.open_bus, || cart.ram_byte(offset)),
            None => cart.ram_byte(offset),
        })
    }

    fn peek_rom(&self, address: u32, offset: u32) -> u8 {
        let access = BusAccess::read(CPU, address);
        let cart = &self.cart;
        match self.coprocessor.as_deref() {
            Some(c) => read_shared(c, &access, Segment::Rom, self.open_bus, || cart.rom_byte(offset)),
            None => cart.rom_byte(offset),
        }
    }

    fn write_ram(&mut self, address: u32, offset: u32, value: u8) {
        self.sync_coprocessor();
        let access = BusAccess::write(CPU, address);
        let cart = &mut self.cart;
        match self.coprocessor.as_deref() {
            Some(c) => {
                write_shared(c, &access, Segment::Ram, || cart.set_ram_byte(offset, value));
            }
            None => cart.set_ram_byte(offset, value),
        }
    }

    /// Side-effect-free read of a CPU bus address.
    pub fn peek(&self, address: u16) -> u8 {
        let address = address as u32;
        let (region, offset) = self.map.resolve(address);
        let value = match region {
            Region::Wram => self.wram.peek(offset, &()),
            Region::Timer => self.timer.peek(offset, &()),
            Region::Coprocessor => self.coprocessor.as_deref().and_then(|c| c.peek(address, &self.cart)),
            Region::CartRam => self.peek_ram(address, offset),
            Region::CartRom => Some(self.peek_rom(address, offset)),
            Region::OpenBus => None,
        };
        value.unwrap_or(self.open_bus)
    }

    /// Backing location of a CPU bus address; `Unavailable` while the
    /// coprocessor owns the segment.
    pub fn locate(&self, address: u16) -> AddressLookup {
        let address = address as u32;
        let (region, offset) = self.map.resolve(address);
        let shared = |segment, lookup| match self.coprocessor.as_deref() {
            Some(c) => locate_shared(c, CPU, segment, lookup),
            None => lookup,
        };
        match region {
            Region::Wram => self.wram.absolute_address(offset),
            Region::Timer => self.timer.absolute_address(offset),
            Region::Coprocessor => self
                .coprocessor
                .as_deref()
                .map_or(AddressLookup::OpenBus, |c| c.absolute_address(address)),
            Region::CartRam if self.cart.ram().is_empty() => AddressLookup::OpenBus,
            Region::CartRam => {
                let index = offset as usize % self.cart.ram().len();
                shared(Segment::Ram, AddressLookup::mapped(index as u32, SegmentKind::CartRam))
            }
            Region::CartRom => {
                let index = offset as usize % self.cart.rom().len().max(1);
                shared(Segment::Rom, AddressLookup::mapped(index as u32, SegmentKind::CartRom))
            }
            Region::OpenBus => AddressLookup::OpenBus,
        }
    }
}

impl Bus for SystemBus {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, _master: BusMaster, addr: u16) -> u8 {
        let address = addr as u32;
        let (region, offset) = self.map.resolve(address);
        let value = match region {
            Region::Wram => self.wram.read(offset, &mut ()),
            Region::Timer => self.timer.read(offset, &mut ()),
            Region::Coprocessor => {
                self.sync_coprocessor();
                match self.coprocessor.as_mut() {
                    Some(c) => c.read(address, &mut self.cart),
                    None => None,
                }
            }
            Region::CartRam => self.read_ram(address, offset),
            Region::CartRom => Some(self.read_rom(address, offset)),
            Region::OpenBus => None,
        };
        let value = value.unwrap_or(self.open_bus);
        self.open_bus = value;
        value
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        let address = addr as u32;
        self.open_bus = data;
        let (region, offset) = self.map.resolve(address);
        match region {
            Region::Wram => self.wram.write(offset, data, &mut ()),
            Region::Timer => self.timer.write(offset, data, &mut ()),
            Region::Coprocessor => {
                self.sync_coprocessor();
                if let Some(c) = self.coprocessor.as_mut() {
                    c.write(address, data, &mut self.cart);
                }
            }
            Region::CartRam => self.write_ram(address, offset, data),
            Region::CartRom => trace!("write ${data:02X} to ROM ${address:04X} ignored"),
            Region::OpenBus => {}
        }
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        false
    }

    fn check_interrupts(&self, _target: BusMaster) -> InterruptState {
        let mut lines = self.timer.interrupts();
        if let Some(c) = self.coprocessor.as_deref() {
            lines.irq |= c.irq_pending();
        }
        lines
    }
}

impl Snapshot for SystemBus {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.nested("master", &mut self.master)?;
        s.nested("timer", &mut self.timer)?;
        s.nested("timerDivider", &mut self.timer_divider)?;
        s.nested("wram", &mut self.wram)?;
        s.nested("cart", &mut self.cart)?;
        s.value("openBus", &mut self.open_bus)?;
        if let Some(c) = self.coprocessor.as_mut() {
            s.nested("coprocessor", c.as_mut())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

pub struct Console {
    board: &'static Board,
    cpu: M6502,
    bus: SystemBus,
}

impl Console {
    pub fn new(board: &'static Board, rom: Vec<u8>, options: CoprocessorOptions) -> Result<Self, BoardError> {
        if rom.is_empty() {
            return Err(BoardError::EmptyRom);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(BoardError::RomTooLarge(rom.len()));
        }
        let map = board.memory_map()?;
        let coprocessor = board
            .coprocessor
            .map(|kind| coprocessor::create(kind, options))
            .transpose()?;
        debug!(
            "{} board: {} KiB ROM, {} KiB cart RAM",
            board.name,
            rom.len() / 1024,
            board.cart_ram_size / 1024
        );
        let cart = CartMemory::new(rom, board.cart_ram_size);
        let mut cpu = M6502::new();
        cpu.reset();
        Ok(Self {
            board,
            cpu,
            bus: SystemBus::new(map, cart, coprocessor)?,
        })
    }

    pub fn board(&self) -> &'static Board {
        self.board
    }

    pub fn cpu(&self) -> &M6502 {
        &self.cpu
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn coprocessor(&self) -> Option<&dyn Coprocessor> {
        self.bus.coprocessor()
    }

    /// One primary CPU cycle and the master cycles it spans.
    fn step_cpu_cycle(&mut self) -> Result<bool, ClockError> {
        self.cpu.execute_cycle(&mut self.bus, CPU);
        self.bus.advance(CPU_CLOCK_DIVIDER)
    }

    /// Run whole CPU cycles until the master clock reaches `target`. The
    /// clock may end up to one CPU cycle past it.
    pub fn run_until(&mut self, target: u64) -> Result<(), ClockError> {
        while self.bus.master.cycles() < target {
            self.step_cpu_cycle()?;
        }
        Ok(())
    }

    fn nvram_slot(&mut self) -> Option<&mut [u8]> {
        if !self.bus.cart.ram().is_empty() {
            return Some(self.bus.cart.ram_mut());
        }
        let c = self.bus.coprocessor.as_mut()?;
        c.nvram()?;
        Some(c.internal_memory_mut())
    }
}

impl Snapshot for Console {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        let mut board = self.board.id;
        s.value("board", &mut board)?;
        if board != self.board.id {
            return Err(s.invalid("board"));
        }
        s.nested("cpu", &mut self.cpu)?;
        s.nested("bus", &mut self.bus)
    }
}

impl Machine for Console {
    fn name(&self) -> &'static str {
        self.board.name
    }

    fn run_frame(&mut self) {
        let frame = self.bus.timer.frame();
        while self.bus.timer.frame() == frame {
            if let Err(err) = self.step_cpu_cycle() {
                warn!("frame aborted: {err}");
                return;
            }
        }
    }

    fn step_cycles(&mut self, master_cycles: u64) -> Result<(), ClockError> {
        let current = self.bus.master.cycles();
        let target = current.checked_add(master_cycles).ok_or(ClockError::Overflow {
            current,
            delta: master_cycles,
        })?;
        self.run_until(target)
    }

    /// Power-on state for every component. The master clock and frame
    /// counter keep counting; battery RAM is kept.
    fn reset(&mut self) {
        debug!("{} reset", self.board.name);
        self.cpu = M6502::new();
        self.cpu.reset();
        self.bus.wram.clear();
        self.bus.timer.reset();
        self.bus.open_bus = 0;
        if let Some(c) = self.bus.coprocessor.as_mut() {
            c.reset();
        }
    }

    fn master_clock(&self) -> u64 {
        self.bus.master.cycles()
    }

    fn frame_count(&self) -> u64 {
        self.bus.timer.frame()
    }

    fn read_memory(&mut self, kind: MemoryType, address: u32) -> u8 {
        match kind {
            MemoryType::CpuBus => self.bus.read(CPU, address as u16),
            _ => self.peek_memory(kind, address),
        }
    }

    fn peek_memory(&self, kind: MemoryType, address: u32) -> u8 {
        let index = address as usize;
        let bytes: &[u8] = match kind {
            MemoryType::CpuBus => return self.bus.peek(address as u16),
            MemoryType::Wram => self.bus.wram.as_slice(),
            MemoryType::CartRom => self.bus.cart.rom(),
            MemoryType::CartRam => self.bus.cart.ram(),
            MemoryType::CoprocessorCache => {
                self.bus.coprocessor().map(|c| c.internal_memory()).unwrap_or(&[])
            }
        };
        bytes.get(index).copied().unwrap_or(0)
    }

    fn write_memory(&mut self, kind: MemoryType, address: u32, value: u8) {
        let index = address as usize;
        let bytes: &mut [u8] = match kind {
            MemoryType::CpuBus => return self.bus.write(CPU, address as u16, value),
            MemoryType::Wram => self.bus.wram.as_mut_slice(),
            MemoryType::CartRom => self.bus.cart.rom_mut(),
            MemoryType::CartRam => self.bus.cart.ram_mut(),
            MemoryType::CoprocessorCache => match self.bus.coprocessor.as_mut() {
                Some(c) => c.internal_memory_mut(),
                None => return,
            },
        };
        if let Some(slot) = bytes.get_mut(index) {
            *slot = value;
        }
    }

    fn memory_size(&self, kind: MemoryType) -> usize {
        match kind {
            MemoryType::CpuBus => 0x1_0000,
            MemoryType::Wram => self.bus.wram.len(),
            MemoryType::CartRom => self.bus.cart.rom().len(),
            MemoryType::CartRam => self.bus.cart.ram().len(),
            MemoryType::CoprocessorCache => self.bus.coprocessor().map_or(0, |c| c.internal_memory().len()),
        }
    }

    fn absolute_address(&self, address: u32) -> AddressLookup {
        self.bus.locate(address as u16)
    }

    fn save_state_into(&mut self, buffer: Vec<u8>) -> Result<Vec<u8>, SnapshotError> {
        snapshot::save_into(self, buffer)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let backup = snapshot::save(self)?;
        if let Err(err) = snapshot::load(self, data) {
            warn!("incompatible save state: {err}");
            snapshot::load(self, &backup)?;
            return Err(err);
        }
        Ok(())
    }

    fn save_nvram(&self) -> Option<Vec<u8>> {
        if !self.bus.cart.ram().is_empty() {
            return Some(self.bus.cart.ram().to_vec());
        }
        self.bus.coprocessor()?.nvram().map(<[u8]>::to_vec)
    }

    fn load_nvram(&mut self, data: &[u8]) {
        if let Some(slot) = self.nvram_slot() {
            let len = data.len().min(slot.len());
            slot[..len].copy_from_slice(&data[..len]);
        }
    }
}
