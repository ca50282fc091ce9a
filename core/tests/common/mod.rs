use quartz_core::core::{Bus, BusMaster, bus::InterruptState};

/// Flat 64KB bus with externally driven interrupt and RDY lines. Every access
/// is logged so tests can check dummy reads and cycle-exact write order.
pub struct TestBus {
    pub memory: [u8; 0x10000],
    pub irq: bool,
    pub nmi: bool,
    pub halted: bool,
    pub reads: Vec<u16>,
    pub writes: Vec<(u16, u8)>,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            memory: [0; 0x10000],
            irq: false,
            nmi: false,
            halted: false,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Point a 6502 vector (`$FFFA/$FFFC/$FFFE`) at `target`.
    #[allow(dead_code)]
    pub fn set_vector(&mut self, vector: u16, target: u16) {
        self.load(vector, &target.to_le_bytes());
    }
}

impl Bus for TestBus {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, _master: BusMaster, addr: u16) -> u8 {
        self.reads.push(addr);
        self.memory[addr as usize]
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        self.writes.push((addr, data));
        self.memory[addr as usize] = data;
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        self.halted
    }

    fn check_interrupts(&self, _target: BusMaster) -> InterruptState {
        InterruptState {
            nmi: self.nmi,
            irq: self.irq,
        }
    }
}
