//! Cycle-stepped 6502-family primary CPU.
//!
//! Every call to [`M6502::execute_cycle`] performs exactly one bus cycle. The
//! in-flight instruction lives in [`ExecState`] together with the partially
//! built effective address, so a save state taken between any two cycles
//! resumes the instruction where it stopped.
//!
//! The core decodes the documented NMOS instruction set. Undocumented opcodes
//! execute as two-cycle NOPs.

mod addressing;
mod alu;
mod branch;
mod stack;

use crate::core::{
    Bus, BusMaster,
    bus::InterruptState,
    component::BusMasterComponent,
};
use crate::cpu::{
    Cpu,
    state::{CpuStateTrait, M6502State},
};
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

pub(crate) use addressing::Mode;
use alu::{ReadOp, RmwOp};

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusFlag {
    C = 0x01, // Carry
    Z = 0x02, // Zero
    I = 0x04, // Interrupt Disable
    D = 0x08, // Decimal
    B = 0x10, // Break
    U = 0x20, // Unused (always 1)
    V = 0x40, // Overflow
    N = 0x80, // Negative
}

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Hardware interrupt sequences share the BRK microcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Irq,
    Nmi,
    /// Stack pushes become reads; no state is written.
    Reset,
}

impl Interrupt {
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::Irq => IRQ_VECTOR,
            Interrupt::Nmi => NMI_VECTOR,
            Interrupt::Reset => RESET_VECTOR,
        }
    }

    fn code(self) -> u8 {
        match self {
            Interrupt::Irq => 0,
            Interrupt::Nmi => 1,
            Interrupt::Reset => 2,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Interrupt::Irq),
            1 => Some(Interrupt::Nmi),
            2 => Some(Interrupt::Reset),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    Fetch,
    Execute(u8, u8), // (opcode, cycle)
    Interrupt(Interrupt, u8),
}

impl Snapshot for ExecState {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        let (mut kind, mut code, mut step) = match *self {
            ExecState::Fetch => (0u8, 0u8, 0u8),
            ExecState::Execute(op, cycle) => (1, op, cycle),
            ExecState::Interrupt(int, step) => (2, int.code(), step),
        };
        s.value("kind", &mut kind)?;
        s.value("code", &mut code)?;
        s.value("step", &mut step)?;
        if s.is_loading() {
            *self = match kind {
                0 => ExecState::Fetch,
                1 => ExecState::Execute(code, step),
                2 => ExecState::Interrupt(
                    Interrupt::from_code(code).ok_or_else(|| s.invalid("code"))?,
                    step,
                ),
                _ => return Err(s.invalid("kind")),
            };
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg {
    A,
    X,
    Y,
}

/// Decoded instruction class; the opcode's cycle behaviour follows from it.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Instr {
    Read(ReadOp, Mode),
    Store(Reg, Mode),
    Rmw(RmwOp, Mode),
    Accumulator(RmwOp),
    Implied,
    Branch(StatusFlag, bool),
    JmpAbs,
    JmpInd,
    Jsr,
    Rts,
    Rti,
    Brk,
    Push,
    Pull,
}

#[derive(Clone, Debug)]
pub struct M6502 {
    // Registers
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub pc: u16,
    pub sp: u8,
    pub p: u8,

    /// CPU cycles executed since power-on.
    pub cycles: u64,

    // Internal state
    pub(crate) state: ExecState,
    pub(crate) addr: u16, // effective address / branch target under construction
    pub(crate) ptr: u8,   // zero-page pointer for indirect modes
    pub(crate) data: u8,  // latched operand (RMW, JSR low byte)

    nmi_previous: bool,
    nmi_pending: bool,
    irq_asserted: bool,
}

impl Default for M6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl M6502 {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFD,
            p: 0x24, // I=1, U=1
            cycles: 0,
            state: ExecState::Fetch,
            addr: 0,
            ptr: 0,
            data: 0,
            nmi_previous: false,
            nmi_pending: false,
            irq_asserted: false,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// True between instructions (the next cycle fetches an opcode).
    pub fn at_instruction_boundary(&self) -> bool {
        matches!(self.state, ExecState::Fetch)
    }

    #[inline]
    pub(crate) fn set_flag(&mut self, flag: StatusFlag, set: bool) {
        if set {
            self.p |= flag as u8;
        } else {
            self.p &= !(flag as u8);
        }
    }

    #[inline]
    pub(crate) fn flag(&self, flag: StatusFlag) -> bool {
        self.p & flag as u8 != 0
    }

    /// Move to micro-step `step` of the current instruction or interrupt.
    #[inline]
    pub(crate) fn goto(&mut self, step: u8) {
        self.state = match self.state {
            ExecState::Execute(op, _) => ExecState::Execute(op, step),
            ExecState::Interrupt(int, _) => ExecState::Interrupt(int, step),
            ExecState::Fetch => ExecState::Fetch,
        };
    }

    #[inline]
    pub(crate) fn fetch_operand<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) -> u8 {
        let value = bus.read(master, self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn sample_interrupts(&mut self, lines: InterruptState) {
        if lines.nmi && !self.nmi_previous {
            self.nmi_pending = true;
        }
        self.nmi_previous = lines.nmi;
    }

    pub fn execute_cycle<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) {
        if bus.is_halted_for(master) {
            return;
        }
        self.cycles += 1;
        let lines = bus.check_interrupts(master);
        self.sample_interrupts(lines);

        match self.state {
            ExecState::Fetch => {
                let irq = (lines.irq || self.irq_asserted) && !self.flag(StatusFlag::I);
                if self.nmi_pending || irq {
                    let int = if self.nmi_pending {
                        self.nmi_pending = false;
                        Interrupt::Nmi
                    } else {
                        Interrupt::Irq
                    };
                    // The opcode fetch happens but its result is discarded.
                    bus.read(master, self.pc);
                    self.state = ExecState::Interrupt(int, 0);
                } else {
                    let opcode = self.fetch_operand(bus, master);
                    self.state = ExecState::Execute(opcode, 0);
                }
            }
            ExecState::Execute(op, cyc) => {
                self.execute_instruction(op, cyc, bus, master);
            }
            ExecState::Interrupt(int, step) => {
                self.interrupt_sequence(int, step, bus, master);
            }
        }
    }

    fn execute_instruction<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        opcode: u8,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match decode(opcode) {
            Instr::Read(op, mode) => self.op_read(op, mode, cycle, bus, master),
            Instr::Store(reg, mode) => self.op_store(reg, mode, cycle, bus, master),
            Instr::Rmw(op, mode) => self.op_rmw(op, mode, cycle, bus, master),
            Instr::Accumulator(op) => {
                bus.read(master, self.pc);
                self.a = self.perform_rmw(op, self.a);
                self.state = ExecState::Fetch;
            }
            Instr::Implied => {
                bus.read(master, self.pc);
                self.perform_implied(opcode);
                self.state = ExecState::Fetch;
            }
            Instr::Branch(flag, want) => self.op_branch(flag, want, cycle, bus, master),
            Instr::JmpAbs => self.op_jmp_abs(cycle, bus, master),
            Instr::JmpInd => self.op_jmp_ind(cycle, bus, master),
            Instr::Jsr => self.op_jsr(cycle, bus, master),
            Instr::Rts => self.op_rts(cycle, bus, master),
            Instr::Rti => self.op_rti(cycle, bus, master),
            Instr::Brk => self.op_brk(cycle, bus, master),
            Instr::Push => self.op_push(opcode, cycle, bus, master),
            Instr::Pull => self.op_pull(opcode, cycle, bus, master),
        }
    }

    /// Two-cycle register/flag instructions (and undocumented opcodes as NOP).
    fn perform_implied(&mut self, opcode: u8) {
        match opcode {
            0xAA => {
                self.x = self.a;
                self.set_nz(self.x);
            }
            0x8A => {
                self.a = self.x;
                self.set_nz(self.a);
            }
            0xA8 => {
                self.y = self.a;
                self.set_nz(self.y);
            }
            0x98 => {
                self.a = self.y;
                self.set_nz(self.a);
            }
            0xBA => {
                self.x = self.sp;
                self.set_nz(self.x);
            }
            0x9A => self.sp = self.x,
            0xE8 => {
                self.x = self.x.wrapping_add(1);
                self.set_nz(self.x);
            }
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                self.set_nz(self.y);
            }
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                self.set_nz(self.x);
            }
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                self.set_nz(self.y);
            }
            0x18 => self.set_flag(StatusFlag::C, false),
            0x38 => self.set_flag(StatusFlag::C, true),
            0x58 => self.set_flag(StatusFlag::I, false),
            0x78 => self.set_flag(StatusFlag::I, true),
            0xB8 => self.set_flag(StatusFlag::V, false),
            0xD8 => self.set_flag(StatusFlag::D, false),
            0xF8 => self.set_flag(StatusFlag::D, true),
            _ => {} // NOP
        }
    }
}

/// Opcode decoder. The ALU group (`aaabbb01`) is regular enough to decode
/// from its bit fields; the rest is listed.
pub(crate) fn decode(opcode: u8) -> Instr {
    if opcode & 0x03 == 0x01 {
        let mode = match (opcode >> 2) & 0x07 {
            0 => Mode::IndX,
            1 => Mode::Zp,
            2 => Mode::Imm,
            3 => Mode::Abs,
            4 => Mode::IndY,
            5 => Mode::ZpX,
            6 => Mode::AbsY,
            _ => Mode::AbsX,
        };
        return match opcode >> 5 {
            0 => Instr::Read(ReadOp::Ora, mode),
            1 => Instr::Read(ReadOp::And, mode),
            2 => Instr::Read(ReadOp::Eor, mode),
            3 => Instr::Read(ReadOp::Adc, mode),
            4 if mode == Mode::Imm => Instr::Implied,
            4 => Instr::Store(Reg::A, mode),
            5 => Instr::Read(ReadOp::Lda, mode),
            6 => Instr::Read(ReadOp::Cmp, mode),
            _ => Instr::Read(ReadOp::Sbc, mode),
        };
    }

    match opcode {
        0xA2 => Instr::Read(ReadOp::Ldx, Mode::Imm),
        0xA6 => Instr::Read(ReadOp::Ldx, Mode::Zp),
        0xB6 => Instr::Read(ReadOp::Ldx, Mode::ZpY),
        0xAE => Instr::Read(ReadOp::Ldx, Mode::Abs),
        0xBE => Instr::Read(ReadOp::Ldx, Mode::AbsY),
        0xA0 => Instr::Read(ReadOp::Ldy, Mode::Imm),
        0xA4 => Instr::Read(ReadOp::Ldy, Mode::Zp),
        0xB4 => Instr::Read(ReadOp::Ldy, Mode::ZpX),
        0xAC => Instr::Read(ReadOp::Ldy, Mode::Abs),
        0xBC => Instr::Read(ReadOp::Ldy, Mode::AbsX),
        0xE0 => Instr::Read(ReadOp::Cpx, Mode::Imm),
        0xE4 => Instr::Read(ReadOp::Cpx, Mode::Zp),
        0xEC => Instr::Read(ReadOp::Cpx, Mode::Abs),
        0xC0 => Instr::Read(ReadOp::Cpy, Mode::Imm),
        0xC4 => Instr::Read(ReadOp::Cpy, Mode::Zp),
        0xCC => Instr::Read(ReadOp::Cpy, Mode::Abs),
        0x24 => Instr::Read(ReadOp::Bit, Mode::Zp),
        0x2C => Instr::Read(ReadOp::Bit, Mode::Abs),

        0x86 => Instr::Store(Reg::X, Mode::Zp),
        0x96 => Instr::Store(Reg::X, Mode::ZpY),
        0x8E => Instr::Store(Reg::X, Mode::Abs),
        0x84 => Instr::Store(Reg::Y, Mode::Zp),
        0x94 => Instr::Store(Reg::Y, Mode::ZpX),
        0x8C => Instr::Store(Reg::Y, Mode::Abs),

        0x0A => Instr::Accumulator(RmwOp::Asl),
        0x4A => Instr::Accumulator(RmwOp::Lsr),
        0x2A => Instr::Accumulator(RmwOp::Rol),
        0x6A => Instr::Accumulator(RmwOp::Ror),

        // Shifts and INC/DEC share the `aaabbb10` layout.
        0x06 | 0x16 | 0x0E | 0x1E | 0x46 | 0x56 | 0x4E | 0x5E | 0x26 | 0x36 | 0x2E | 0x3E
        | 0x66 | 0x76 | 0x6E | 0x7E | 0xE6 | 0xF6 | 0xEE | 0xFE | 0xC6 | 0xD6 | 0xCE
        | 0xDE => {
            let op = match opcode >> 5 {
                0 => RmwOp::Asl,
                1 => RmwOp::Rol,
                2 => RmwOp::Lsr,
                3 => RmwOp::Ror,
                6 => RmwOp::Dec,
                _ => RmwOp::Inc,
            };
            let mode = match (opcode >> 2) & 0x07 {
                1 => Mode::Zp,
                3 => Mode::Abs,
                5 => Mode::ZpX,
                _ => Mode::AbsX,
            };
            Instr::Rmw(op, mode)
        }

        0x10 => Instr::Branch(StatusFlag::N, false), // BPL
        0x30 => Instr::Branch(StatusFlag::N, true),  // BMI
        0x50 => Instr::Branch(StatusFlag::V, false), // BVC
        0x70 => Instr::Branch(StatusFlag::V, true),  // BVS
        0x90 => Instr::Branch(StatusFlag::C, false), // BCC
        0xB0 => Instr::Branch(StatusFlag::C, true),  // BCS
        0xD0 => Instr::Branch(StatusFlag::Z, false), // BNE
        0xF0 => Instr::Branch(StatusFlag::Z, true),  // BEQ

        0x4C => Instr::JmpAbs,
        0x6C => Instr::JmpInd,
        0x20 => Instr::Jsr,
        0x60 => Instr::Rts,
        0x40 => Instr::Rti,
        0x00 => Instr::Brk,
        0x48 | 0x08 => Instr::Push,
        0x68 | 0x28 => Instr::Pull,

        _ => Instr::Implied,
    }
}

impl BusMasterComponent for M6502 {
    type Bus = dyn Bus<Address = u16, Data = u8>;

    fn tick_with_bus(&mut self, bus: &mut Self::Bus, master: BusMaster) -> bool {
        self.execute_cycle(bus, master);
        matches!(self.state, ExecState::Fetch)
    }
}

impl Cpu for M6502 {
    /// Start the 6-cycle reset sequence; the vector is read from the bus.
    fn reset(&mut self) {
        self.set_flag(StatusFlag::I, true);
        self.set_flag(StatusFlag::U, true);
        self.nmi_pending = false;
        self.nmi_previous = false;
        self.irq_asserted = false;
        self.state = ExecState::Interrupt(Interrupt::Reset, 0);
    }

    /// Assert interrupt lines from outside the bus (tests, debugger).
    fn signal_interrupt(&mut self, int: InterruptState) {
        if int.nmi {
            self.nmi_pending = true;
        }
        self.irq_asserted = int.irq;
    }
}

impl CpuStateTrait for M6502 {
    type Snapshot = M6502State;

    fn snapshot(&self) -> M6502State {
        M6502State {
            a: self.a,
            x: self.x,
            y: self.y,
            pc: self.pc,
            sp: self.sp,
            p: self.p,
            cycles: self.cycles,
        }
    }
}

impl Snapshot for M6502 {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.value("a", &mut self.a)?;
        s.value("x", &mut self.x)?;
        s.value("y", &mut self.y)?;
        s.value("pc", &mut self.pc)?;
        s.value("sp", &mut self.sp)?;
        s.value("p", &mut self.p)?;
        s.value("cycles", &mut self.cycles)?;
        s.nested("exec", &mut self.state)?;
        s.value("addr", &mut self.addr)?;
        s.value("ptr", &mut self.ptr)?;
        s.value("data", &mut self.data)?;
        s.value("nmiPrevious", &mut self.nmi_previous)?;
        s.value("nmiPending", &mut self.nmi_pending)?;
        s.value("irqAsserted", &mut self.irq_asserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alu_group_decodes_from_bit_fields() {
        assert!(matches!(decode(0xA9), Instr::Read(ReadOp::Lda, Mode::Imm)));
        assert!(matches!(decode(0xB1), Instr::Read(ReadOp::Lda, Mode::IndY)));
        assert!(matches!(decode(0x9D), Instr::Store(Reg::A, Mode::AbsX)));
        assert!(matches!(decode(0x89), Instr::Implied));
        assert!(matches!(decode(0xFE), Instr::Rmw(RmwOp::Inc, Mode::AbsX)));
        assert!(matches!(decode(0x46), Instr::Rmw(RmwOp::Lsr, Mode::Zp)));
    }

    #[test]
    fn exec_state_round_trips_mid_instruction() {
        let mut state = ExecState::Execute(0xBD, 2);
        let bytes = crate::snapshot::save(&mut state).unwrap();
        let mut restored = ExecState::Fetch;
        crate::snapshot::load(&mut restored, &bytes).unwrap();
        assert_eq!(restored, ExecState::Execute(0xBD, 2));
    }
}
