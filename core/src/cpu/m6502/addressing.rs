use super::{ExecState, M6502};
use crate::core::{Bus, BusMaster};

/// Operand addressing modes of the memory-access instruction groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Imm,
    Zp,
    ZpX,
    ZpY,
    Abs,
    AbsX,
    AbsY,
    IndX,
    IndY,
}

impl Mode {
    /// Micro-step at which the effective address is complete and the data
    /// access can happen.
    pub(crate) fn ready_step(self) -> u8 {
        match self {
            Mode::Imm => 0,
            Mode::Zp => 1,
            Mode::ZpX | Mode::ZpY | Mode::Abs => 2,
            Mode::AbsX | Mode::AbsY => 3,
            Mode::IndX | Mode::IndY => 4,
        }
    }
}

impl M6502 {
    fn index_for(&self, mode: Mode) -> u8 {
        match mode {
            Mode::ZpX | Mode::AbsX | Mode::IndX => self.x,
            _ => self.y,
        }
    }

    /// Run one addressing micro-step. Returns true once `self.addr` holds the
    /// effective address, leaving the current cycle free for the data access.
    ///
    /// Indexed reads skip the fix-up cycle when no page is crossed; stores and
    /// read-modify-write instructions always take it (`always_fix`).
    pub(crate) fn address_step<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        mode: Mode,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
        always_fix: bool,
    ) -> bool {
        match (mode, cycle) {
            (Mode::Imm, _) => {
                self.addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                true
            }

            (Mode::Zp | Mode::ZpX | Mode::ZpY | Mode::Abs | Mode::AbsX | Mode::AbsY, 0) => {
                self.addr = self.fetch_operand(bus, master) as u16;
                self.goto(1);
                false
            }
            (Mode::IndX | Mode::IndY, 0) => {
                self.ptr = self.fetch_operand(bus, master);
                self.goto(1);
                false
            }

            (Mode::ZpX | Mode::ZpY, 1) => {
                // Dummy read of the unindexed address while the index is added.
                bus.read(master, self.addr);
                self.addr = (self.addr + self.index_for(mode) as u16) & 0x00FF;
                self.goto(2);
                false
            }

            (Mode::Abs, 1) => {
                self.addr |= (self.fetch_operand(bus, master) as u16) << 8;
                self.goto(2);
                false
            }

            (Mode::AbsX | Mode::AbsY, 1) => {
                let base = (self.fetch_operand(bus, master) as u16) << 8 | self.addr;
                self.addr = base.wrapping_add(self.index_for(mode) as u16);
                let crossed = (base ^ self.addr) & 0xFF00 != 0;
                self.goto(if crossed || always_fix { 2 } else { 3 });
                false
            }

            (Mode::IndX, 1) => {
                bus.read(master, self.ptr as u16);
                self.ptr = self.ptr.wrapping_add(self.x);
                self.goto(2);
                false
            }
            (Mode::IndX, 2) => {
                self.addr = bus.read(master, self.ptr as u16) as u16;
                self.goto(3);
                false
            }
            (Mode::IndX, 3) => {
                self.addr |= (bus.read(master, self.ptr.wrapping_add(1) as u16) as u16) << 8;
                self.goto(4);
                false
            }

            (Mode::IndY, 1) => {
                self.addr = bus.read(master, self.ptr as u16) as u16;
                self.goto(2);
                false
            }
            (Mode::IndY, 2) => {
                let base = (bus.read(master, self.ptr.wrapping_add(1) as u16) as u16) << 8 | self.addr;
                self.addr = base.wrapping_add(self.y as u16);
                let crossed = (base ^ self.addr) & 0xFF00 != 0;
                self.goto(if crossed || always_fix { 3 } else { 4 });
                false
            }

            // Fix-up cycle: the bus sees the address before the carry into
            // the high byte.
            (Mode::AbsX, 2) | (Mode::AbsY, 2) | (Mode::IndY, 3) => {
                let index = self.index_for(mode) as u16;
                let carried = (self.addr & 0x00FF) < index;
                let unfixed = if carried {
                    self.addr.wrapping_sub(0x0100)
                } else {
                    self.addr
                };
                bus.read(master, unfixed);
                self.goto(cycle + 1);
                false
            }

            _ => true,
        }
    }

    /// Load/ALU instructions: the data read completes the instruction.
    pub(crate) fn op_read<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        op: super::alu::ReadOp,
        mode: Mode,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        if self.address_step(mode, cycle, bus, master, false) {
            let operand = bus.read(master, self.addr);
            self.perform_read(op, operand);
            self.state = ExecState::Fetch;
        }
    }

    pub(crate) fn op_store<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        reg: super::Reg,
        mode: Mode,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        if self.address_step(mode, cycle, bus, master, true) {
            let value = match reg {
                super::Reg::A => self.a,
                super::Reg::X => self.x,
                super::Reg::Y => self.y,
            };
            bus.write(master, self.addr, value);
            self.state = ExecState::Fetch;
        }
    }

    /// Read-modify-write: read, write the old value back, write the result.
    pub(crate) fn op_rmw<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        op: super::alu::RmwOp,
        mode: Mode,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        if !self.address_step(mode, cycle, bus, master, true) {
            return;
        }
        match cycle - mode.ready_step() {
            0 => {
                self.data = bus.read(master, self.addr);
                self.goto(cycle + 1);
            }
            1 => {
                bus.write(master, self.addr, self.data);
                self.data = self.perform_rmw(op, self.data);
                self.goto(cycle + 1);
            }
            _ => {
                bus.write(master, self.addr, self.data);
                self.state = ExecState::Fetch;
            }
        }
    }
}
