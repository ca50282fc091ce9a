use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use quartz_core::core::bus::InterruptState;
use quartz_core::core::{Bus, BusMaster};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod gsu;

// --- TracingBus: flat 64KB memory that logs every access ---

/// Direction of one bus cycle, spelled `"read"`/`"write"` in vector files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusOp {
    Read,
    Write,
}

/// `(address, data, op)`, the vector files' cycle format.
pub type BusCycle = (u16, u8, BusOp);

pub struct TracingBus {
    pub memory: Box<[u8; 0x10000]>,
    pub cycles: Vec<BusCycle>,
}

impl TracingBus {
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            cycles: Vec::new(),
        }
    }

    /// Fresh bus holding the `(address, value)` pairs of a vector state.
    pub fn with_ram(ram: &[(u16, u8)]) -> Self {
        let mut bus = Self::new();
        for &(addr, value) in ram {
            bus.memory[addr as usize] = value;
        }
        bus
    }
}

impl Default for TracingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for TracingBus {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, _master: BusMaster, addr: u16) -> u8 {
        let data = self.memory[addr as usize];
        self.cycles.push((addr, data, BusOp::Read));
        data
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        self.memory[addr as usize] = data;
        self.cycles.push((addr, data, BusOp::Write));
    }

    fn is_halted_for(&self, _master: BusMaster) -> bool {
        false
    }

    fn check_interrupts(&self, _target: BusMaster) -> InterruptState {
        InterruptState::default()
    }
}

// --- 6502 vectors (SingleStepTests/65x02 layout) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M6502TestCase {
    pub name: String,
    pub initial: M6502CpuState,
    #[serde(rename = "final")]
    pub final_state: M6502CpuState,
    pub cycles: Vec<BusCycle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M6502CpuState {
    pub pc: u16,
    pub s: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub ram: Vec<(u16, u8)>,
}

// --- Vector files ---

/// Read a JSON vector file, gunzipping it when the name ends in `.gz`.
pub fn read_vectors<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = BufReader::new(File::open(path)?);
    let vectors = if path.extension().is_some_and(|ext| ext == "gz") {
        serde_json::from_reader(GzDecoder::new(file))?
    } else {
        serde_json::from_reader(file)?
    };
    Ok(vectors)
}

/// Write vectors as gzipped JSON.
pub fn write_vectors<T: Serialize>(path: &Path, vectors: &[T]) -> io::Result<()> {
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    serde_json::to_writer(&mut encoder, vectors)?;
    encoder.finish()?;
    Ok(())
}

/// Directory holding a vector set, or `None` (with a notice) when it has not
/// been generated or checked out.
pub fn vector_dir<'a>(path: &'a str, how_to_get: &str) -> Option<&'a Path> {
    let dir = Path::new(path);
    if dir.exists() {
        Some(dir)
    } else {
        eprintln!("skipping: no vectors at {path} ({how_to_get})");
        None
    }
}
