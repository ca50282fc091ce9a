//! Run-control building blocks shared by bus-mastering coprocessors: modelled
//! access latency and the instruction cache.

use crate::snapshot::Snapshot;

/// A ROM or RAM access issued by a coprocessor that completes a fixed number
/// of master cycles later.
///
/// The countdown only moves through [`PendingAccess::advance`], so an access
/// scheduled with latency N completes after exactly N cycles no matter how
/// the caller splits them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Snapshot)]
pub struct PendingAccess {
    pending: bool,
    remaining: u32,
    address: u32,
    data: u8,
}

impl PendingAccess {
    pub fn schedule(&mut self, latency: u32, address: u32, data: u8) {
        self.pending = true;
        self.remaining = latency;
        self.address = address;
        self.data = data;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn remaining(&self) -> u32 {
        if self.pending { self.remaining } else { 0 }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    /// Count down by up to `cycles`. Returns true when the access is pending
    /// and its latency has fully elapsed.
    pub fn advance(&mut self, cycles: u64) -> bool {
        if !self.pending {
            return false;
        }
        let elapsed = cycles.min(self.remaining as u64) as u32;
        self.remaining -= elapsed;
        self.remaining == 0
    }

    /// Retire the access, returning its address and data.
    pub fn complete(&mut self) -> (u32, u8) {
        self.pending = false;
        self.remaining = 0;
        (self.address, self.data)
    }

    pub fn cancel(&mut self) {
        self.pending = false;
        self.remaining = 0;
    }
}

pub const CACHE_SIZE: usize = 512;
pub const CACHE_LINE_SIZE: usize = 16;
pub const CACHE_LINES: usize = CACHE_SIZE / CACHE_LINE_SIZE;

/// 512-byte instruction cache of 32 lines with one validity bit per line.
#[derive(Debug, Clone, PartialEq, Eq, Snapshot)]
pub struct InstructionCache {
    #[snapshot(bytes)]
    buffer: [u8; CACHE_SIZE],
    valid: u32,
}

impl Default for InstructionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionCache {
    pub fn new() -> Self {
        Self {
            buffer: [0; CACHE_SIZE],
            valid: 0,
        }
    }

    /// Invalidate every line. Contents stay until overwritten.
    pub fn flush(&mut self) {
        self.valid = 0;
    }

    #[inline]
    pub fn line_of(offset: usize) -> usize {
        (offset % CACHE_SIZE) / CACHE_LINE_SIZE
    }

    #[inline]
    pub fn is_valid(&self, line: usize) -> bool {
        self.valid & (1 << (line % CACHE_LINES)) != 0
    }

    #[inline]
    pub fn set_valid(&mut self, line: usize) {
        self.valid |= 1 << (line % CACHE_LINES);
    }

    pub fn valid_mask(&self) -> u32 {
        self.valid
    }

    #[inline]
    pub fn byte(&self, offset: usize) -> u8 {
        self.buffer[offset % CACHE_SIZE]
    }

    #[inline]
    pub fn set_byte(&mut self, offset: usize, value: u8) {
        self.buffer[offset % CACHE_SIZE] = value;
    }

    /// Write from the primary CPU's cache window. Writing the last byte of a
    /// line marks that line valid.
    pub fn write_external(&mut self, offset: usize, value: u8) {
        self.set_byte(offset, value);
        if offset % CACHE_LINE_SIZE == CACHE_LINE_SIZE - 1 {
            self.set_valid(Self::line_of(offset));
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_is_exact_regardless_of_split() {
        for splits in [vec![6], vec![1, 1, 1, 1, 1, 1], vec![2, 3, 1], vec![5, 100]] {
            let mut access = PendingAccess::default();
            access.schedule(6, 0x1234, 0xAB);
            let mut elapsed = 0u64;
            let mut done_at = None;
            for chunk in splits {
                if access.advance(chunk) && done_at.is_none() {
                    done_at = Some(elapsed + chunk.min(6 - elapsed));
                }
                elapsed += chunk;
            }
            assert_eq!(done_at, Some(6));
            assert_eq!(access.complete(), (0x1234, 0xAB));
            assert!(!access.is_pending());
        }
    }

    #[test]
    fn not_complete_one_cycle_early() {
        let mut access = PendingAccess::default();
        access.schedule(5, 0, 0);
        assert!(!access.advance(4));
        assert_eq!(access.remaining(), 1);
        assert!(access.advance(1));
    }

    #[test]
    fn idle_access_never_completes() {
        let mut access = PendingAccess::default();
        assert!(!access.advance(10));
    }

    #[test]
    fn external_write_validates_line_on_last_byte() {
        let mut cache = InstructionCache::new();
        for i in 0..15 {
            cache.write_external(0x20 + i, i as u8);
        }
        assert!(!cache.is_valid(2));
        cache.write_external(0x2F, 0xFF);
        assert!(cache.is_valid(2));
        assert_eq!(cache.valid_mask(), 1 << 2);
        cache.flush();
        assert!(!cache.is_valid(2));
        assert_eq!(cache.byte(0x2F), 0xFF);
    }
}
