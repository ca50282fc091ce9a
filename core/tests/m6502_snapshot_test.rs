use quartz_core::core::{BusMaster, BusMasterComponent};
use quartz_core::cpu::m6502::{ExecState, M6502};
use quartz_core::snapshot::{self, SnapshotError};
mod common;
use common::TestBus;

fn tick(cpu: &mut M6502, bus: &mut TestBus, n: usize) {
    for _ in 0..n {
        cpu.tick_with_bus(bus, BusMaster::Cpu(0));
    }
}

/// A program that exercises multi-cycle addressing, RMW, the stack and a
/// subroutine call, so a cut at any cycle lands inside some instruction.
fn program_bus() -> TestBus {
    let mut bus = TestBus::new();
    bus.load(
        0x0200,
        &[
            0xA0, 0x03, // LDY #3
            0xB1, 0x40, // loop: LDA ($40),Y
            0x20, 0x00, 0x03, // JSR $0300
            0x88, // DEY
            0x10, 0xF8, // BPL loop
            0x4C, 0x0A, 0x02, // JMP *
        ],
    );
    bus.load(
        0x0300,
        &[
            0x48, // PHA
            0xFE, 0xF0, 0x30, // INC $30F0,X
            0x68, // PLA
            0x60, // RTS
        ],
    );
    bus.load(0x0040, &[0xFE, 0x30]);
    bus
}

fn fresh_cpu() -> M6502 {
    let mut cpu = M6502::new();
    cpu.pc = 0x0200;
    cpu.x = 0x20;
    cpu
}

// =============================================================================
// Mid-instruction resume
// =============================================================================

#[test]
fn test_resume_from_every_cycle_is_bit_identical() {
    const TOTAL: usize = 120;

    let mut reference_cpu = fresh_cpu();
    let mut reference_bus = program_bus();
    tick(&mut reference_cpu, &mut reference_bus, TOTAL);
    let expected = snapshot::save(&mut reference_cpu).unwrap();

    for cut in 1..TOTAL {
        let mut cpu = fresh_cpu();
        let mut bus = program_bus();
        tick(&mut cpu, &mut bus, cut);
        let state = snapshot::save(&mut cpu).unwrap();

        let mut restored = M6502::new();
        snapshot::load(&mut restored, &state).unwrap();
        tick(&mut restored, &mut bus, TOTAL - cut);

        assert_eq!(snapshot::save(&mut restored).unwrap(), expected, "cut at cycle {cut}");
        assert_eq!(bus.memory, reference_bus.memory, "cut at cycle {cut}");
    }
}

#[test]
fn test_state_records_in_flight_step() {
    let mut cpu = fresh_cpu();
    let mut bus = program_bus();
    tick(&mut cpu, &mut bus, 4); // LDY (2), LDA ($40),Y fetch + pointer
    assert_eq!(cpu.state(), ExecState::Execute(0xB1, 1));

    let state = snapshot::save(&mut cpu).unwrap();
    let mut restored = M6502::new();
    snapshot::load(&mut restored, &state).unwrap();
    assert_eq!(restored.state(), ExecState::Execute(0xB1, 1));
    assert_eq!(restored.pc, cpu.pc);
    assert_eq!(restored.cycles, 4);
}

#[test]
fn test_truncated_cpu_state_is_rejected() {
    let mut cpu = fresh_cpu();
    let state = snapshot::save(&mut cpu).unwrap();
    let mut target = M6502::new();
    let err = snapshot::load(&mut target, &state[..state.len() - 3]).unwrap_err();
    assert!(matches!(err, SnapshotError::Truncated(_)));
}
