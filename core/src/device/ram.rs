use crate::core::{AddressLookup, MemoryHandler, SegmentKind};
use crate::snapshot::{Serializer, Snapshot, SnapshotError};

/// Plain read/write memory (work RAM, coprocessor RAM).
///
/// The size is fixed at construction and offsets mirror over it. A save
/// state records the contents; loading a state made for a different size
/// is rejected.
pub struct Ram {
    data: Vec<u8>,
    kind: SegmentKind,
}

impl Ram {
    /// Create zeroed RAM of `size` bytes. `kind` tags absolute addresses.
    pub fn new(size: usize, kind: SegmentKind) -> Self {
        Self {
            data: vec![0; size],
            kind,
        }
    }

    #[inline]
    fn index(&self, offset: u32) -> Option<usize> {
        if self.data.is_empty() {
            None
        } else {
            Some(offset as usize % self.data.len())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Load contents from a byte slice (e.g. a battery save file).
    ///
    /// A short `src` only overwrites its own length; extra bytes are ignored.
    pub fn load_from(&mut self, src: &[u8]) {
        let len = src.len().min(self.data.len());
        self.data[..len].copy_from_slice(&src[..len]);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl MemoryHandler for Ram {
    type Context = ();

    fn read(&mut self, offset: u32, ctx: &mut ()) -> Option<u8> {
        self.peek(offset, ctx)
    }

    fn peek(&self, offset: u32, _ctx: &()) -> Option<u8> {
        self.index(offset).map(|i| self.data[i])
    }

    fn write(&mut self, offset: u32, value: u8, _ctx: &mut ()) {
        if let Some(i) = self.index(offset) {
            self.data[i] = value;
        }
    }

    fn absolute_address(&self, offset: u32) -> AddressLookup {
        match self.index(offset) {
            Some(i) => AddressLookup::mapped(i as u32, self.kind),
            None => AddressLookup::OpenBus,
        }
    }
}

impl Snapshot for Ram {
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
        s.bytes("data", &mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot;

    #[test]
    fn new_is_zeroed() {
        let ram = Ram::new(0x800, SegmentKind::Wram);
        assert!(ram.as_slice().iter().all(|&b| b == 0));
        assert_eq!(ram.len(), 0x800);
    }

    #[test]
    fn offsets_mirror() {
        let mut ram = Ram::new(0x800, SegmentKind::Wram);
        ram.write(0x001, 0x42, &mut ());
        assert_eq!(ram.read(0x801, &mut ()), Some(0x42));
        assert_eq!(
            ram.absolute_address(0x1801),
            AddressLookup::mapped(0x001, SegmentKind::Wram)
        );
    }

    #[test]
    fn empty_ram_reads_open() {
        let mut ram = Ram::new(0, SegmentKind::CartRam);
        ram.write(0, 0x12, &mut ());
        assert_eq!(ram.peek(0, &()), None);
        assert_eq!(ram.absolute_address(0), AddressLookup::OpenBus);
    }

    #[test]
    fn load_from_short_slice() {
        let mut ram = Ram::new(1024, SegmentKind::CartRam);
        ram.write(512, 0xFF, &mut ());
        ram.load_from(&[0xBB; 512]);
        assert_eq!(ram.peek(511, &()), Some(0xBB));
        assert_eq!(ram.peek(512, &()), Some(0xFF));
    }

    #[test]
    fn snapshot_rejects_size_change() {
        let mut ram = Ram::new(16, SegmentKind::Wram);
        ram.write(3, 0x33, &mut ());
        let bytes = snapshot::save(&mut ram).unwrap();

        let mut same = Ram::new(16, SegmentKind::Wram);
        snapshot::load(&mut same, &bytes).unwrap();
        assert_eq!(same.peek(3, &()), Some(0x33));

        let mut bigger = Ram::new(32, SegmentKind::Wram);
        assert!(matches!(
            snapshot::load(&mut bigger, &bytes),
            Err(SnapshotError::LengthMismatch { .. })
        ));
    }
}
