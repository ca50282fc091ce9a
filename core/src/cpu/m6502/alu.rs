use super::{M6502, StatusFlag};

/// Instructions that read one operand and update registers/flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadOp {
    Lda,
    Ldx,
    Ldy,
    Adc,
    Sbc,
    And,
    Ora,
    Eor,
    Cmp,
    Cpx,
    Cpy,
    Bit,
}

/// Shift/rotate and increment/decrement, on memory or the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RmwOp {
    Asl,
    Lsr,
    Rol,
    Ror,
    Inc,
    Dec,
}

impl M6502 {
    /// Set N, Z flags from result (for loads, transfers, logical ops).
    #[inline]
    pub(crate) fn set_nz(&mut self, result: u8) {
        self.set_flag(StatusFlag::N, result & 0x80 != 0);
        self.set_flag(StatusFlag::Z, result == 0);
    }

    pub(crate) fn perform_read(&mut self, op: ReadOp, operand: u8) {
        match op {
            ReadOp::Lda => {
                self.a = operand;
                self.set_nz(operand);
            }
            ReadOp::Ldx => {
                self.x = operand;
                self.set_nz(operand);
            }
            ReadOp::Ldy => {
                self.y = operand;
                self.set_nz(operand);
            }
            ReadOp::Adc => self.perform_adc(operand),
            ReadOp::Sbc => self.perform_sbc(operand),
            ReadOp::And => {
                self.a &= operand;
                self.set_nz(self.a);
            }
            ReadOp::Ora => {
                self.a |= operand;
                self.set_nz(self.a);
            }
            ReadOp::Eor => {
                self.a ^= operand;
                self.set_nz(self.a);
            }
            ReadOp::Cmp => self.compare(self.a, operand),
            ReadOp::Cpx => self.compare(self.x, operand),
            ReadOp::Cpy => self.compare(self.y, operand),
            ReadOp::Bit => {
                self.set_flag(StatusFlag::N, operand & 0x80 != 0);
                self.set_flag(StatusFlag::V, operand & 0x40 != 0);
                self.set_flag(StatusFlag::Z, self.a & operand == 0);
            }
        }
    }

    /// Returns the modified value; sets N, Z (and C for shifts).
    pub(crate) fn perform_rmw(&mut self, op: RmwOp, value: u8) -> u8 {
        let carry_in = self.flag(StatusFlag::C) as u8;
        let (result, carry) = match op {
            RmwOp::Asl => (value << 1, Some(value & 0x80 != 0)),
            RmwOp::Lsr => (value >> 1, Some(value & 0x01 != 0)),
            RmwOp::Rol => (value << 1 | carry_in, Some(value & 0x80 != 0)),
            RmwOp::Ror => (value >> 1 | carry_in << 7, Some(value & 0x01 != 0)),
            RmwOp::Inc => (value.wrapping_add(1), None),
            RmwOp::Dec => (value.wrapping_sub(1), None),
        };
        if let Some(carry) = carry {
            self.set_flag(StatusFlag::C, carry);
        }
        self.set_nz(result);
        result
    }

    fn compare(&mut self, register: u8, operand: u8) {
        self.set_flag(StatusFlag::C, register >= operand);
        self.set_nz(register.wrapping_sub(operand));
    }

    /// ADC. In decimal mode N and V come from the intermediate sum and Z from
    /// the binary sum (NMOS behaviour).
    fn perform_adc(&mut self, operand: u8) {
        let a = self.a as u16;
        let m = operand as u16;
        let c = self.flag(StatusFlag::C) as u16;
        let binary = a + m + c;

        if !self.flag(StatusFlag::D) {
            let result = binary as u8;
            self.set_flag(StatusFlag::C, binary > 0xFF);
            self.set_flag(StatusFlag::V, (a ^ binary) & (m ^ binary) & 0x80 != 0);
            self.a = result;
            self.set_nz(result);
            return;
        }

        let mut low = (a & 0x0F) + (m & 0x0F) + c;
        if low > 0x09 {
            low = ((low + 0x06) & 0x0F) + 0x10;
        }
        let mut sum = (a & 0xF0) + (m & 0xF0) + low;
        self.set_flag(StatusFlag::N, sum & 0x80 != 0);
        self.set_flag(StatusFlag::V, (a ^ sum) & (m ^ sum) & 0x80 != 0);
        self.set_flag(StatusFlag::Z, binary & 0xFF == 0);
        if sum > 0x9F {
            sum += 0x60;
        }
        self.set_flag(StatusFlag::C, sum > 0xFF);
        self.a = sum as u8;
    }

    /// SBC. Flags always come from the binary difference; decimal mode only
    /// corrects the accumulator.
    fn perform_sbc(&mut self, operand: u8) {
        let a = self.a;
        let borrow = !self.flag(StatusFlag::C) as i16;
        let diff = a as u16 + (!operand) as u16 + (1 - borrow) as u16;
        let result = diff as u8;
        self.set_flag(StatusFlag::C, diff > 0xFF);
        self.set_flag(StatusFlag::V, (a ^ operand) & (a ^ result) & 0x80 != 0);
        self.set_nz(result);

        if !self.flag(StatusFlag::D) {
            self.a = result;
            return;
        }

        let mut low = (a & 0x0F) as i16 - (operand & 0x0F) as i16 - borrow;
        let mut high = (a >> 4) as i16 - (operand >> 4) as i16;
        if low < 0 {
            low -= 6;
            high -= 1;
        }
        if high < 0 {
            high -= 6;
        }
        self.a = ((high as u8 & 0x0F) << 4) | (low as u8 & 0x0F);
    }
}
