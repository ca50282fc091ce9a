use super::Gsu;
use crate::core::CartMemory;

impl Gsu {
    /// TO Rn / MOVE (0x1n). After WITH this copies SREG into Rn.
    pub(crate) fn op_to(&mut self, n: u8) {
        if self.sfr.prefix {
            self.set_reg(n, self.sr());
            self.reset_prefix();
        } else {
            self.dreg = n;
        }
    }

    /// WITH Rn (0x2n)
    pub(crate) fn op_with(&mut self, n: u8) {
        self.sreg = n;
        self.dreg = n;
        self.sfr.prefix = true;
    }

    /// FROM Rn / MOVES (0xBn). MOVES copies Rn into DREG and sets flags.
    pub(crate) fn op_from(&mut self, n: u8) {
        if self.sfr.prefix {
            let value = self.r[n as usize];
            self.set_dr(value);
            self.sfr.overflow = value & 0x80 != 0;
            self.set_sz(value);
            self.reset_prefix();
        } else {
            self.sreg = n;
        }
    }

    fn read_ram_word(&mut self, address: u16, cart: &mut CartMemory) -> u16 {
        let lo = self.read_ram_buffer(address, cart) as u16;
        let hi = self.read_ram_buffer(address ^ 1, cart) as u16;
        hi << 8 | lo
    }

    fn write_ram_word(&mut self, address: u16, value: u16, cart: &mut CartMemory) {
        self.write_ram_buffer(address, value as u8, cart);
        self.write_ram_buffer(address ^ 1, (value >> 8) as u8, cart);
    }

    /// STW/STB (Rn) (0x30-0x3B)
    pub(crate) fn op_store(&mut self, n: u8, cart: &mut CartMemory) {
        self.ramaddr = self.r[n as usize];
        let value = self.sr();
        if self.sfr.alt1 {
            self.write_ram_buffer(self.ramaddr, value as u8, cart);
        } else {
            self.write_ram_word(self.ramaddr, value, cart);
        }
        self.reset_prefix();
    }

    /// LDW/LDB (Rn) (0x40-0x4B)
    pub(crate) fn op_load(&mut self, n: u8, cart: &mut CartMemory) {
        self.ramaddr = self.r[n as usize];
        let value = if self.sfr.alt1 {
            self.read_ram_buffer(self.ramaddr, cart) as u16
        } else {
            self.read_ram_word(self.ramaddr, cart)
        };
        self.set_dr(value);
        self.reset_prefix();
    }

    /// SBK (0x90): store SREG back to the last RAM address used.
    pub(crate) fn op_sbk(&mut self, cart: &mut CartMemory) {
        let value = self.sr();
        self.write_ram_word(self.ramaddr, value, cart);
        self.reset_prefix();
    }

    /// IBT Rn,#pp / LMS Rn,(yy) / SMS (yy),Rn (0xAn)
    pub(crate) fn op_ibt(&mut self, n: u8, cart: &mut CartMemory) {
        if self.sfr.alt1 {
            self.ramaddr = (self.pipe(cart) as u16) << 1;
            let value = self.read_ram_word(self.ramaddr, cart);
            self.set_reg(n, value);
        } else if self.sfr.alt2 {
            self.ramaddr = (self.pipe(cart) as u16) << 1;
            let value = self.r[n as usize];
            self.write_ram_word(self.ramaddr, value, cart);
        } else {
            let value = self.pipe(cart) as i8 as i16 as u16;
            self.set_reg(n, value);
        }
        self.reset_prefix();
    }

    /// IWT Rn,#xx / LM Rn,(xx) / SM (xx),Rn (0xFn)
    pub(crate) fn op_iwt(&mut self, n: u8, cart: &mut CartMemory) {
        let lo = self.pipe(cart) as u16;
        let word = (self.pipe(cart) as u16) << 8 | lo;
        if self.sfr.alt1 {
            self.ramaddr = word;
            let value = self.read_ram_word(word, cart);
            self.set_reg(n, value);
        } else if self.sfr.alt2 {
            self.ramaddr = word;
            let value = self.r[n as usize];
            self.write_ram_word(word, value, cart);
        } else {
            self.set_reg(n, word);
        }
        self.reset_prefix();
    }

    /// RAMB / ROMB (0xDF with ALT2 / ALT3), GETC otherwise.
    pub(crate) fn op_bank(&mut self, cart: &mut CartMemory) {
        if self.sfr.alt2 {
            if self.sfr.alt1 {
                self.sync_rom(cart);
                self.rombr = (self.sr() & 0x7F) as u8;
            } else {
                self.sync_ram(cart);
                self.rambr = (self.sr() & 0x01) as u8;
            }
        } else {
            // The colour register is not modelled; only the buffer wait is.
            self.read_rom_buffer(cart);
        }
        self.reset_prefix();
    }

    /// GETB / GETBH / GETBL / GETBS (0xEF): read the ROM buffer.
    pub(crate) fn op_getb(&mut self, cart: &mut CartMemory) {
        let data = self.read_rom_buffer(cart) as u16;
        let sr = self.sr();
        let value = match (self.sfr.alt1, self.sfr.alt2) {
            (false, false) => data,
            (true, false) => data << 8 | (sr & 0x00FF),
            (false, true) => (sr & 0xFF00) | data,
            (true, true) => data as u8 as i8 as i16 as u16,
        };
        self.set_dr(value);
        self.reset_prefix();
    }
}
