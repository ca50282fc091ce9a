use super::{ExecState, M6502, StatusFlag};
use crate::core::{Bus, BusMaster};

impl M6502 {
    /// Relative branch: 2 cycles not taken, 3 taken, 4 taken across a page.
    pub(crate) fn op_branch<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        flag: StatusFlag,
        want: bool,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                let offset = self.fetch_operand(bus, master) as i8;
                if self.flag(flag) == want {
                    self.addr = self.pc.wrapping_add(offset as u16);
                    self.goto(1);
                } else {
                    self.state = ExecState::Fetch;
                }
            }
            1 => {
                bus.read(master, self.pc);
                if (self.pc ^ self.addr) & 0xFF00 == 0 {
                    self.pc = self.addr;
                    self.state = ExecState::Fetch;
                } else {
                    self.goto(2);
                }
            }
            _ => {
                // PC low byte is already updated, high byte not yet.
                bus.read(master, (self.pc & 0xFF00) | (self.addr & 0x00FF));
                self.pc = self.addr;
                self.state = ExecState::Fetch;
            }
        }
    }

    pub(crate) fn op_jmp_abs<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                self.addr = self.fetch_operand(bus, master) as u16;
                self.goto(1);
            }
            _ => {
                let hi = bus.read(master, self.pc) as u16;
                self.pc = hi << 8 | self.addr;
                self.state = ExecState::Fetch;
            }
        }
    }

    /// JMP (ind). The pointer's high byte is fetched without carrying into the
    /// page, so `JMP ($12FF)` reads $12FF and $1200.
    pub(crate) fn op_jmp_ind<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                self.addr = self.fetch_operand(bus, master) as u16;
                self.goto(1);
            }
            1 => {
                self.addr |= (self.fetch_operand(bus, master) as u16) << 8;
                self.goto(2);
            }
            2 => {
                self.data = bus.read(master, self.addr);
                self.goto(3);
            }
            _ => {
                let hi_addr = (self.addr & 0xFF00) | (self.addr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(master, hi_addr) as u16;
                self.pc = hi << 8 | self.data as u16;
                self.state = ExecState::Fetch;
            }
        }
    }

    pub(crate) fn op_jsr<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                self.data = self.fetch_operand(bus, master);
                self.goto(1);
            }
            1 => {
                bus.read(master, 0x0100 | self.sp as u16);
                self.goto(2);
            }
            2 => {
                self.push(bus, master, (self.pc >> 8) as u8);
                self.goto(3);
            }
            3 => {
                self.push(bus, master, self.pc as u8);
                self.goto(4);
            }
            _ => {
                let hi = bus.read(master, self.pc) as u16;
                self.pc = hi << 8 | self.data as u16;
                self.state = ExecState::Fetch;
            }
        }
    }

    pub(crate) fn op_rts<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                bus.read(master, self.pc);
                self.goto(1);
            }
            1 => {
                bus.read(master, 0x0100 | self.sp as u16);
                self.goto(2);
            }
            2 => {
                self.pc = (self.pc & 0xFF00) | self.pull(bus, master) as u16;
                self.goto(3);
            }
            3 => {
                self.pc = (self.pc & 0x00FF) | (self.pull(bus, master) as u16) << 8;
                self.goto(4);
            }
            _ => {
                bus.read(master, self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.state = ExecState::Fetch;
            }
        }
    }

    pub(crate) fn op_rti<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                bus.read(master, self.pc);
                self.goto(1);
            }
            1 => {
                bus.read(master, 0x0100 | self.sp as u16);
                self.goto(2);
            }
            2 => {
                let p = self.pull(bus, master);
                self.p = (p & !(StatusFlag::B as u8)) | StatusFlag::U as u8;
                self.goto(3);
            }
            3 => {
                self.pc = (self.pc & 0xFF00) | self.pull(bus, master) as u16;
                self.goto(4);
            }
            _ => {
                self.pc = (self.pc & 0x00FF) | (self.pull(bus, master) as u16) << 8;
                self.state = ExecState::Fetch;
            }
        }
    }
}
