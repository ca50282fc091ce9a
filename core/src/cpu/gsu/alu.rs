use super::{CFGR_MS0, Gsu};
use crate::core::CartMemory;

impl Gsu {
    /// Operand selected by the ALT2 immediate form: `#n` or `Rn`.
    #[inline]
    fn operand(&self, n: u8) -> u16 {
        if self.sfr.alt2 { n as u16 } else { self.r[n as usize] }
    }

    /// Write DREG, set S/Z from the result and clear the prefix state.
    #[inline]
    fn finish(&mut self, result: u16) {
        self.set_dr(result);
        self.set_sz(result);
        self.reset_prefix();
    }

    /// LSR (0x03)
    pub(crate) fn op_lsr(&mut self) {
        let sr = self.sr();
        self.sfr.carry = sr & 1 != 0;
        self.finish(sr >> 1);
    }

    /// ROL (0x04)
    pub(crate) fn op_rol(&mut self) {
        let sr = self.sr();
        let result = sr << 1 | self.sfr.carry as u16;
        self.sfr.carry = sr & 0x8000 != 0;
        self.finish(result);
    }

    /// SWAP (0x4D)
    pub(crate) fn op_swap(&mut self) {
        let sr = self.sr();
        self.finish(sr.rotate_left(8));
    }

    /// NOT (0x4F)
    pub(crate) fn op_not(&mut self) {
        let sr = self.sr();
        self.finish(!sr);
    }

    /// ADD/ADC Rn, ADD/ADC #n (0x5n)
    pub(crate) fn op_add(&mut self, n: u8) {
        let sr = self.sr() as u32;
        let operand = self.operand(n) as u32;
        let carry = (self.sfr.alt1 && self.sfr.carry) as u32;
        let result = sr + operand + carry;
        self.sfr.overflow = !(sr ^ operand) & (operand ^ result) & 0x8000 != 0;
        self.sfr.carry = result >= 0x10000;
        self.finish(result as u16);
    }

    /// SUB Rn, SBC Rn, SUB #n, CMP Rn (0x6n)
    pub(crate) fn op_sub(&mut self, n: u8) {
        let (alt1, alt2) = (self.sfr.alt1, self.sfr.alt2);
        let sr = self.sr() as i32;
        let operand = (if !alt2 || alt1 { self.r[n as usize] } else { n as u16 }) as i32;
        let borrow = (!alt2 && alt1 && !self.sfr.carry) as i32;
        let result = sr - operand - borrow;
        self.sfr.overflow = (sr ^ operand) & (sr ^ result) & 0x8000 != 0;
        self.sfr.carry = result >= 0;
        self.set_sz(result as u16);
        // CMP only sets flags
        if !(alt1 && alt2) {
            self.set_dr(result as u16);
        }
        self.reset_prefix();
    }

    /// MERGE (0x70): high bytes of R7 and R8.
    pub(crate) fn op_merge(&mut self) {
        let result = (self.r[7] & 0xFF00) | (self.r[8] >> 8);
        self.set_dr(result);
        self.sfr.overflow = result & 0xC0C0 != 0;
        self.sfr.sign = result & 0x8080 != 0;
        self.sfr.carry = result & 0xE0E0 != 0;
        self.sfr.zero = result & 0xF0F0 != 0;
        self.reset_prefix();
    }

    /// AND/BIC Rn, AND/BIC #n (0x7n)
    pub(crate) fn op_and(&mut self, n: u8) {
        let operand = self.operand(n);
        let mask = if self.sfr.alt1 { !operand } else { operand };
        let result = self.sr() & mask;
        self.finish(result);
    }

    /// OR/XOR Rn, OR/XOR #n (0xCn)
    pub(crate) fn op_or(&mut self, n: u8) {
        let operand = self.operand(n);
        let result = if self.sfr.alt1 { self.sr() ^ operand } else { self.sr() | operand };
        self.finish(result);
    }

    /// MULT/UMULT Rn, MULT/UMULT #n (0x8n): 8x8 multiply of the low bytes.
    pub(crate) fn op_mult(&mut self, n: u8, cart: &mut CartMemory) {
        let sr = self.sr();
        let operand = self.operand(n);
        let result = if self.sfr.alt1 {
            (sr as u8 as u16).wrapping_mul(operand as u8 as u16)
        } else {
            (sr as u8 as i8 as i16).wrapping_mul(operand as u8 as i8 as i16) as u16
        };
        self.finish(result);
        if self.cfgr & CFGR_MS0 == 0 {
            let cycles = self.cache_cycles() as u64;
            self.step(cycles, cart);
        }
    }

    /// FMULT/LMULT (0x9F): signed 16x16 multiply by R6. LMULT also keeps
    /// the low word in R4.
    pub(crate) fn op_fmult(&mut self, cart: &mut CartMemory) {
        let product = (self.sr() as i16 as i32).wrapping_mul(self.r[6] as i16 as i32) as u32;
        if self.sfr.alt1 {
            self.set_reg(4, product as u16);
        }
        let result = (product >> 16) as u16;
        self.set_dr(result);
        self.set_sz(result);
        self.sfr.carry = product & 0x8000 != 0;
        self.reset_prefix();
        let speed = if self.cfgr & CFGR_MS0 != 0 { 3 } else { 7 };
        let cycles = speed * self.cache_cycles() as u64;
        self.step(cycles, cart);
    }

    /// SEX (0x95)
    pub(crate) fn op_sex(&mut self) {
        let sr = self.sr();
        self.finish(sr as u8 as i8 as i16 as u16);
    }

    /// ASR/DIV2 (0x96). DIV2 rounds -1 to 0.
    pub(crate) fn op_asr(&mut self) {
        let sr = self.sr();
        self.sfr.carry = sr & 1 != 0;
        let mut result = ((sr as i16) >> 1) as u16;
        if self.sfr.alt1 {
            result = result.wrapping_add(((sr as u32 + 1) >> 16) as u16);
        }
        self.finish(result);
    }

    /// ROR (0x97)
    pub(crate) fn op_ror(&mut self) {
        let sr = self.sr();
        let result = (self.sfr.carry as u16) << 15 | sr >> 1;
        self.sfr.carry = sr & 1 != 0;
        self.finish(result);
    }

    /// LOB (0x9E)
    pub(crate) fn op_lob(&mut self) {
        let result = self.sr() & 0xFF;
        self.set_dr(result);
        self.sfr.sign = result & 0x80 != 0;
        self.sfr.zero = result == 0;
        self.reset_prefix();
    }

    /// HIB (0xC0)
    pub(crate) fn op_hib(&mut self) {
        let result = self.sr() >> 8;
        self.set_dr(result);
        self.sfr.sign = result & 0x80 != 0;
        self.sfr.zero = result == 0;
        self.reset_prefix();
    }

    /// INC Rn (0xDn)
    pub(crate) fn op_inc(&mut self, n: u8) {
        let result = self.r[n as usize].wrapping_add(1);
        self.set_reg(n, result);
        self.set_sz(result);
        self.reset_prefix();
    }

    /// DEC Rn (0xEn)
    pub(crate) fn op_dec(&mut self, n: u8) {
        let result = self.r[n as usize].wrapping_sub(1);
        self.set_reg(n, result);
        self.set_sz(result);
        self.reset_prefix();
    }
}
