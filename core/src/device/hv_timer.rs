use crate::core::bus::InterruptState;
use crate::core::component::Component;
use crate::core::{AddressLookup, ClockError, ClockRatio, MemoryHandler, SegmentKind};
use crate::snapshot::Snapshot;

pub const DOTS_PER_LINE: u16 = 341;
pub const LINES_PER_FRAME: u16 = 262;
pub const VBLANK_START_LINE: u16 = 225;
pub const HBLANK_START_DOT: u16 = 274;
/// Master cycles per dot.
pub const MASTER_CYCLES_PER_DOT: u64 = 4;
/// Master cycles per frame (1364 x 262).
pub const MASTER_CYCLES_PER_FRAME: u64 =
    DOTS_PER_LINE as u64 * MASTER_CYCLES_PER_DOT * LINES_PER_FRAME as u64;

const CPU_VERSION: u8 = 0x02;

/// H/V beam timer and interrupt controller.
///
/// Tracks the beam position in dots and lines and raises the two primary-CPU
/// interrupt lines: NMI at the start of vertical blank, IRQ when the beam
/// crosses the programmed H and/or V position.
///
/// Registers (offsets from `$4200`):
/// - `$00` NMITIMEN: bit 7 NMI enable, bits 5:4 IRQ mode (H, V, H+V)
/// - `$07-$0A` HTIME/VTIME, 9 bits each
/// - `$10` RDNMI: bit 7 vblank NMI flag (cleared on read), CPU version
/// - `$11` TIMEUP: bit 7 IRQ flag (cleared on read)
/// - `$12` HVBJOY: bit 7 vblank, bit 6 hblank
/// - `$13-$16` current dot and line, little endian
#[derive(Debug, Clone, Default, Snapshot)]
pub struct HvTimer {
    dot: u16,
    line: u16,
    frame: u64,
    nmitimen: u8,
    htime: u16,
    vtime: u16,
    nmi_flag: bool, // latched at vblank start, cleared by RDNMI
    irq_flag: bool, // latched on H/V match, cleared by TIMEUP
}

impl HvTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn line(&self) -> u16 {
        self.line
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn in_vblank(&self) -> bool {
        self.line >= VBLANK_START_LINE
    }

    pub fn in_hblank(&self) -> bool {
        self.dot >= HBLANK_START_DOT
    }

    /// Levels the primary CPU samples.
    pub fn interrupts(&self) -> InterruptState {
        InterruptState {
            nmi: self.nmi_flag && self.nmitimen & 0x80 != 0,
            irq: self.irq_flag,
        }
    }

    pub fn reset(&mut self) {
        let frame = self.frame;
        *self = Self::new();
        self.frame = frame;
    }

    fn irq_matches(&self) -> bool {
        match (self.nmitimen >> 4) & 0x03 {
            1 => self.dot == self.htime,
            2 => self.line == self.vtime && self.dot == 0,
            3 => self.line == self.vtime && self.dot == self.htime,
            _ => false,
        }
    }
}

impl MemoryHandler for HvTimer {
    type Context = ();

    /// `None` for write-only or unmapped offsets.
    fn read(&mut self, offset: u32, ctx: &mut ()) -> Option<u8> {
        let value = self.peek(offset, ctx);
        match offset {
            0x10 => self.nmi_flag = false,
            0x11 => self.irq_flag = false,
            _ => {}
        }
        value
    }

    fn peek(&self, offset: u32, _ctx: &()) -> Option<u8> {
        Some(match offset {
            0x10 => (self.nmi_flag as u8) << 7 | CPU_VERSION,
            0x11 => (self.irq_flag as u8) << 7,
            0x12 => (self.in_vblank() as u8) << 7 | (self.in_hblank() as u8) << 6,
            0x13 => self.dot as u8,
            0x14 => (self.dot >> 8) as u8,
            0x15 => self.line as u8,
            0x16 => (self.line >> 8) as u8,
            _ => return None,
        })
    }

    fn write(&mut self, offset: u32, value: u8, _ctx: &mut ()) {
        match offset {
            0x00 => {
                self.nmitimen = value;
                // Disabling the timer IRQ drops a pending one
                if value & 0x30 == 0 {
                    self.irq_flag = false;
                }
            }
            0x07 => self.htime = (self.htime & 0x100) | value as u16,
            0x08 => self.htime = (self.htime & 0xFF) | ((value as u16 & 1) << 8),
            0x09 => self.vtime = (self.vtime & 0x100) | value as u16,
            0x0A => self.vtime = (self.vtime & 0xFF) | ((value as u16 & 1) << 8),
            _ => {}
        }
    }

    fn absolute_address(&self, offset: u32) -> AddressLookup {
        match offset {
            0x00 | 0x07..=0x0A | 0x10..=0x16 => AddressLookup::mapped(offset, SegmentKind::Register),
            _ => AddressLookup::OpenBus,
        }
    }
}

impl Component for HvTimer {
    /// One dot. Returns true when a frame wraps.
    fn tick(&mut self) -> bool {
        let mut wrapped = false;
        self.dot += 1;
        if self.dot == DOTS_PER_LINE {
            self.dot = 0;
            self.line += 1;
            if self.line == VBLANK_START_LINE {
                self.nmi_flag = true;
            } else if self.line == LINES_PER_FRAME {
                self.line = 0;
                self.frame += 1;
                self.nmi_flag = false;
                wrapped = true;
            }
        }
        if self.irq_matches() {
            self.irq_flag = true;
        }
        wrapped
    }

    fn clock_ratio(&self) -> Result<ClockRatio, ClockError> {
        ClockRatio::every(MASTER_CYCLES_PER_DOT)
    }
}
