use log::debug;

use super::{CFGR_IRQ_MASK, Gsu};
use crate::core::CartMemory;

impl Gsu {
    /// STOP (0x00): halt, hand the buses back and raise the IRQ unless
    /// CFGR masks it.
    pub(crate) fn op_stop(&mut self, cart: &mut CartMemory) {
        self.sync_ram(cart);
        if self.cfgr & CFGR_IRQ_MASK == 0 {
            self.sfr.irq = true;
        }
        self.sfr.running = false;
        self.pipeline = 0x01;
        self.reset_prefix();
        debug!(
            "GSU: STOP at R15=${:04X}, cycle {}, irq {}",
            self.r[15], self.cycle_count, self.sfr.irq
        );
    }

    /// CACHE (0x02): move the cache base to the current 16-byte line.
    pub(crate) fn op_cache(&mut self, cart: &mut CartMemory) {
        let base = self.r[15] & 0xFFF0;
        if self.cbr != base {
            self.cbr = base;
            self.flush_cache(cart);
        }
        self.reset_prefix();
    }

    /// BRA/BGE/BLT/BNE/BEQ/BPL/BMI/BCC/BCS/BVC/BVS (0x05-0x0F). The byte
    /// after the displacement is always executed. Prefix state is kept.
    pub(crate) fn op_branch(&mut self, opcode: u8, cart: &mut CartMemory) {
        let sfr = self.sfr;
        let taken = match opcode {
            0x05 => true,
            0x06 => sfr.sign == sfr.overflow,
            0x07 => sfr.sign != sfr.overflow,
            0x08 => !sfr.zero,
            0x09 => sfr.zero,
            0x0A => !sfr.sign,
            0x0B => sfr.sign,
            0x0C => !sfr.carry,
            0x0D => sfr.carry,
            0x0E => !sfr.overflow,
            _ => sfr.overflow,
        };
        let displacement = self.pipe(cart) as i8;
        if taken {
            let target = self.r[15].wrapping_add(displacement as u16);
            self.set_reg(15, target);
        }
    }

    /// LOOP (0x3C): decrement R12 and jump to R13 while non-zero.
    pub(crate) fn op_loop(&mut self) {
        let count = self.r[12].wrapping_sub(1);
        self.r[12] = count;
        self.set_sz(count);
        if count != 0 {
            self.set_reg(15, self.r[13]);
        }
        self.reset_prefix();
    }

    /// LINK #n (0x91-0x94): return address into R11.
    pub(crate) fn op_link(&mut self, n: u8) {
        self.r[11] = self.r[15].wrapping_add(n as u16);
        self.reset_prefix();
    }

    /// JMP Rn / LJMP Rn (0x98-0x9D)
    pub(crate) fn op_jmp(&mut self, n: u8, cart: &mut CartMemory) {
        if self.sfr.alt1 {
            self.pbr = (self.r[n as usize] & 0x7F) as u8;
            let target = self.sr();
            self.set_reg(15, target);
            self.cbr = target & 0xFFF0;
            self.flush_cache(cart);
        } else {
            self.set_reg(15, self.r[n as usize]);
        }
        self.reset_prefix();
    }
}
