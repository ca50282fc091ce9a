//! Randomized chunking and save/load points must not change where a console
//! ends up.

use quartz_core::coprocessor::CoprocessorOptions;
use quartz_core::core::machine::{Machine, MemoryType};
use quartz_machines::Console;
use quartz_machines::boards::{OBC1, SUPERFX};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Master cycles covered by every run: a little over two frames.
const END: u64 = 800_000;

/// GSU: sum a ROM table into R0 and store the running total at RAM $0010,
/// forever.
const GSU_PROGRAM: [u8; 14] = [
    0xFE, 0x40, 0x80, // IWT R14, #$8040
    0xF2, 0x10, 0x00, // IWT R2, #$0010
    0x13, 0xEF, //       TO R3; GETB
    0x53, //             ADD R3
    0xDE, //             INC R14
    0x32, //             STW (R2)
    0x05, 0xF9, //       BRA $8006
    0x01, //             NOP
];

/// CPU: poll the GSU status, copy cart RAM into WRAM, loop. RTI at $0108.
const CPU_PROGRAM: [u8; 13] = [
    0xAD, 0x31, 0x30, // LDA $3031
    0xAD, 0x10, 0x60, // LDA $6010
    0x85, 0x30, //       STA $30
    0xE6, 0x31, //       INC $31
    0x4C, 0x00, 0x02, // JMP $0200
];

fn superfx_console() -> Console {
    let mut rom = vec![0x01; 0x8000];
    rom[..GSU_PROGRAM.len()].copy_from_slice(&GSU_PROGRAM);
    for i in 0..0x40 {
        rom[0x40 + i] = (i * 7) as u8;
    }
    rom[0x7FFC] = 0x00;
    rom[0x7FFD] = 0x02;
    let mut console = Console::new(&SUPERFX, rom, CoprocessorOptions::default()).unwrap();
    for (i, &byte) in CPU_PROGRAM.iter().enumerate() {
        console.write_memory(MemoryType::Wram, 0x0200 + i as u32, byte);
    }
    console.write_memory(MemoryType::Wram, 0x0108, 0x40);
    // Timer NMI on, then GO once the reset vector has been fetched.
    console.write_memory(MemoryType::CpuBus, 0x4200, 0x80);
    console.step_cycles(60).unwrap();
    console.write_memory(MemoryType::CpuBus, 0x303A, 0x18);
    console.write_memory(MemoryType::CpuBus, 0x301E, 0x00);
    console.write_memory(MemoryType::CpuBus, 0x301F, 0x80);
    console
}

fn obc1_console() -> Console {
    // STA $7FF0,X ; INX ; JMP $8000
    let mut rom = vec![0xEA; 0x8000];
    rom[..7].copy_from_slice(&[0x9D, 0xF0, 0x7F, 0xE8, 0x4C, 0x00, 0x80]);
    rom[0x7FFC] = 0x00;
    rom[0x7FFD] = 0x80;
    Console::new(&OBC1, rom, CoprocessorOptions::default()).unwrap()
}

/// Run to `END` in random chunks, hopping to a fresh console through a save
/// state now and then.
fn fuzzed_run(make: fn() -> Console, rng: &mut StdRng) -> Vec<u8> {
    let mut console = make();
    while console.master_clock() < END {
        let target = (console.master_clock() + rng.gen_range(1..20_000)).min(END);
        console.run_until(target).unwrap();
        if rng.gen_bool(0.2) {
            let state = console.save_state().unwrap();
            let mut fresh = make();
            fresh.step_cycles(rng.gen_range(0..5_000)).unwrap();
            fresh.load_state(&state).unwrap();
            console = fresh;
        }
    }
    console.save_state().unwrap()
}

fn straight_run(make: fn() -> Console) -> Vec<u8> {
    let mut console = make();
    console.run_until(END).unwrap();
    console.save_state().unwrap()
}

// =================================================================
// Chunking and save/load
// =================================================================

#[test]
fn test_superfx_fuzzed_chunks_match_straight_run() {
    let expected = straight_run(superfx_console);
    for seed in 0..4 {
        let mut rng = StdRng::seed_from_u64(seed);
        assert_eq!(fuzzed_run(superfx_console, &mut rng), expected, "seed {seed}");
    }
}

#[test]
fn test_obc1_fuzzed_chunks_match_straight_run() {
    let expected = straight_run(obc1_console);
    let mut rng = StdRng::seed_from_u64(0x0BC1);
    assert_eq!(fuzzed_run(obc1_console, &mut rng), expected);
}

#[test]
fn test_superfx_workload_makes_progress() {
    let mut console = superfx_console();
    console.run_until(END).unwrap();
    assert!(console.frame_count() >= 2);
    assert!(console.cpu().cycles > 100_000);
    let low = console.peek_memory(MemoryType::CartRam, 0x10);
    let high = console.peek_memory(MemoryType::CartRam, 0x11);
    assert_ne!(u16::from_le_bytes([low, high]), 0);
}
