//! Headless frame pump and the commands built on it.

use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{info, warn};
use quartz_core::core::machine::{Machine, MemoryType};

use crate::config::FrontendError;

/// Run `frames` frames, logging the effective speed.
pub fn run(machine: &mut dyn Machine, frames: u64) {
    let start = Instant::now();
    let first = machine.frame_count();
    for _ in 0..frames {
        machine.run_frame();
    }
    let elapsed = start.elapsed().as_secs_f64();
    let ran = machine.frame_count() - first;
    if elapsed > 0.0 {
        info!("{ran} frames in {elapsed:.2}s ({:.1} fps)", ran as f64 / elapsed);
    }
}

pub fn load_nvram(machine: &mut dyn Machine, path: &Path) {
    if let Ok(data) = fs::read(path) {
        info!("battery RAM: {}", path.display());
        machine.load_nvram(&data);
    }
}

pub fn save_nvram(machine: &dyn Machine, path: &Path) {
    if let Some(data) = machine.save_nvram()
        && let Err(e) = fs::write(path, data)
    {
        warn!("failed to save battery RAM to {}: {e}", path.display());
    }
}

pub fn save_state(machine: &mut dyn Machine, path: &Path) -> Result<usize, FrontendError> {
    let state = machine.save_state().map_err(FrontendError::SaveState)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| FrontendError::io(dir, e))?;
    }
    fs::write(path, &state).map_err(|e| FrontendError::io(path, e))?;
    Ok(state.len())
}

/// Load a state file. On failure the machine is left as it was.
pub fn load_state(machine: &mut dyn Machine, path: &Path) -> Result<(), FrontendError> {
    let data = fs::read(path).map_err(|e| FrontendError::io(path, e))?;
    machine.load_state(&data).map_err(FrontendError::LoadState)
}

/// Side-effect-free hex dump, 16 bytes per row.
pub fn dump(machine: &dyn Machine, kind: MemoryType, address: u32, len: u32) -> String {
    let mut out = String::new();
    let end = address.saturating_add(len);
    let mut row = address & !0xF;
    while row < end {
        out.push_str(&format!("{}:{row:06X} ", kind.name()));
        for addr in row..row + 16 {
            if addr < address || addr >= end {
                out.push_str("   ");
            } else {
                out.push_str(&format!(" {:02X}", machine.peek_memory(kind, addr)));
            }
        }
        out.push('\n');
        row += 16;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_core::core::AddressLookup;
    use quartz_core::core::ClockError;
    use quartz_core::snapshot::SnapshotError;

    /// Counts frames and serves its address as memory.
    #[derive(Default)]
    struct Dummy {
        frames: u64,
    }

    impl Machine for Dummy {
        fn name(&self) -> &'static str {
            "dummy"
        }
        fn run_frame(&mut self) {
            self.frames += 1;
        }
        fn step_cycles(&mut self, _master_cycles: u64) -> Result<(), ClockError> {
            Ok(())
        }
        fn reset(&mut self) {}
        fn master_clock(&self) -> u64 {
            0
        }
        fn frame_count(&self) -> u64 {
            self.frames
        }
        fn read_memory(&mut self, kind: MemoryType, address: u32) -> u8 {
            self.peek_memory(kind, address)
        }
        fn peek_memory(&self, _kind: MemoryType, address: u32) -> u8 {
            address as u8
        }
        fn write_memory(&mut self, _kind: MemoryType, _address: u32, _value: u8) {}
        fn memory_size(&self, _kind: MemoryType) -> usize {
            0x100
        }
        fn absolute_address(&self, _address: u32) -> AddressLookup {
            AddressLookup::OpenBus
        }
        fn save_state_into(&mut self, mut buffer: Vec<u8>) -> Result<Vec<u8>, SnapshotError> {
            buffer.clear();
            buffer.extend_from_slice(&self.frames.to_le_bytes());
            Ok(buffer)
        }
        fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
            let bytes: [u8; 8] = data.try_into().map_err(|_| SnapshotError::Truncated(data.len()))?;
            self.frames = u64::from_le_bytes(bytes);
            Ok(())
        }
    }

    #[test]
    fn run_pumps_frames() {
        let mut machine = Dummy::default();
        run(&mut machine, 5);
        assert_eq!(machine.frame_count(), 5);
    }

    #[test]
    fn dump_aligns_rows() {
        let machine = Dummy::default();
        let text = dump(&machine, MemoryType::Wram, 0x1E, 4);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("wram:000010 "));
        assert!(lines[0].ends_with(" 1E 1F"));
        assert!(lines[1].starts_with("wram:000020  20 21"));
    }

    #[test]
    fn state_file_round_trip() {
        let path = std::env::temp_dir().join(format!("quartz_emulator_{}/s.qst", std::process::id()));
        let mut machine = Dummy::default();
        run(&mut machine, 3);
        assert_eq!(save_state(&mut machine, &path).unwrap(), 8);

        let mut other = Dummy::default();
        load_state(&mut other, &path).unwrap();
        assert_eq!(other.frame_count(), 3);

        fs::write(&path, b"bad").unwrap();
        let err = load_state(&mut other, &path).unwrap_err();
        assert!(err.to_string().starts_with("could not load save state"));
        assert_eq!(other.frame_count(), 3);
        if let Some(dir) = path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }
}
