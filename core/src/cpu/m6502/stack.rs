use super::{ExecState, Interrupt, M6502, StatusFlag};
use crate::core::{Bus, BusMaster};

impl M6502 {
    #[inline]
    pub(crate) fn push<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
        value: u8,
    ) {
        bus.write(master, 0x0100 | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    pub(crate) fn pull<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        bus: &mut B,
        master: BusMaster,
    ) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(master, 0x0100 | self.sp as u16)
    }

    /// PHA (0x48) / PHP (0x08): 3 cycles.
    pub(crate) fn op_push<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        opcode: u8,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                bus.read(master, self.pc);
                self.goto(1);
            }
            _ => {
                let value = if opcode == 0x48 {
                    self.a
                } else {
                    self.p | StatusFlag::B as u8 | StatusFlag::U as u8
                };
                self.push(bus, master, value);
                self.state = ExecState::Fetch;
            }
        }
    }

    /// PLA (0x68) / PLP (0x28): 4 cycles.
    pub(crate) fn op_pull<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        opcode: u8,
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
            _ => {
                let value = self.pull(bus, master);
                if opcode == 0x68 {
                    self.a = value;
                    self.set_nz(value);
                } else {
                    self.p = (value & !(StatusFlag::B as u8)) | StatusFlag::U as u8;
                }
                self.state = ExecState::Fetch;
            }
        }
    }

    /// BRK: 7 cycles. Skips a padding byte and pushes P with B set.
    pub(crate) fn op_brk<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        cycle: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        match cycle {
            0 => {
                self.fetch_operand(bus, master);
                self.goto(1);
            }
            1 => {
                self.push(bus, master, (self.pc >> 8) as u8);
                self.goto(2);
            }
            2 => {
                self.push(bus, master, self.pc as u8);
                self.goto(3);
            }
            3 => {
                let p = self.p | StatusFlag::B as u8 | StatusFlag::U as u8;
                self.push(bus, master, p);
                self.set_flag(StatusFlag::I, true);
                self.goto(4);
            }
            4 => {
                self.addr = bus.read(master, super::IRQ_VECTOR) as u16;
                self.goto(5);
            }
            _ => {
                let hi = bus.read(master, super::IRQ_VECTOR + 1) as u16;
                self.pc = hi << 8 | self.addr;
                self.state = ExecState::Fetch;
            }
        }
    }

    /// IRQ/NMI/reset: the dummy opcode fetch plus six steps here, 7 cycles.
    pub(crate) fn interrupt_sequence<B: Bus<Address = u16, Data = u8> + ?Sized>(
        &mut self,
        int: Interrupt,
        step: u8,
        bus: &mut B,
        master: BusMaster,
    ) {
        let stack = 0x0100 | self.sp as u16;
        match step {
            0 => {
                bus.read(master, self.pc);
                self.goto(1);
            }
            1 | 2 | 3 => {
                if int == Interrupt::Reset {
                    // Pushes are suppressed; the stack pointer still moves.
                    bus.read(master, stack);
                    self.sp = self.sp.wrapping_sub(1);
                } else {
                    let value = match step {
                        1 => (self.pc >> 8) as u8,
                        2 => self.pc as u8,
                        _ => (self.p & !(StatusFlag::B as u8)) | StatusFlag::U as u8,
                    };
                    self.push(bus, master, value);
                }
                if step == 3 {
                    self.set_flag(StatusFlag::I, true);
                }
                self.goto(step + 1);
            }
            4 => {
                self.addr = bus.read(master, int.vector()) as u16;
                self.goto(5);
            }
            _ => {
                let hi = bus.read(master, int.vector() + 1) as u16;
                self.pc = hi << 8 | self.addr;
                self.state = ExecState::Fetch;
            }
        }
    }
}
