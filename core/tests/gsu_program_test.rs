use quartz_core::core::CartMemory;
use quartz_core::cpu::gsu::{Gsu, SCMR_RAN, SCMR_RON};
use quartz_core::snapshot;

/// GSU with `program` at ROM offset 0, owning both buses, about to run from
/// `$00:start`. `$8000` is outside the cache window; `$0000` is inside it.
fn setup(program: &[u8], start: u16) -> (Gsu, CartMemory) {
    let mut rom = vec![0x01; 0x8000];
    rom[..program.len()].copy_from_slice(program);
    let cart = CartMemory::new(rom, 0x2000);
    let mut gsu = Gsu::new();
    gsu.scmr = SCMR_RON | SCMR_RAN;
    gsu.r[15] = start;
    gsu.go();
    (gsu, cart)
}

/// Execute instructions one by one until STOP. Returns the cycles taken.
fn run_to_stop(gsu: &mut Gsu, cart: &mut CartMemory) -> u64 {
    let start = gsu.cycle_count;
    for _ in 0..1000 {
        if !gsu.is_running() {
            return gsu.cycle_count - start;
        }
        gsu.execute_instruction(cart);
    }
    panic!("program never stopped");
}

const NOPS_THEN_STOP: [u8; 5] = [0x01, 0x01, 0x01, 0x00, 0x01];

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn test_loop_runs_body_r12_times() {
    let (mut gsu, mut cart) = setup(
        &[
            0xAC, 0x05, // IBT R12,#5
            0xFD, 0x07, 0x80, // IWT R13,#$8007
            0xA0, 0x00, // IBT R0,#0
            0xD0, // loop: INC R0
            0x3C, // LOOP
            0x01, // NOP (delay slot)
            0x00, // STOP
            0x01,
        ],
        0x8000,
    );
    gsu.run_until(100_000, &mut cart);
    assert_eq!(gsu.r[0], 5);
    assert_eq!(gsu.r[12], 0);
    assert!(!gsu.is_running());
    assert!(gsu.irq_pending());
    // Halted time still passes
    assert_eq!(gsu.cycle_count, 100_000);
}

#[test]
fn test_branch_executes_delay_slot() {
    let (mut gsu, mut cart) = setup(
        &[
            0x05, 0x02, // BRA +2
            0xD1, // INC R1 (delay slot)
            0xD2, // INC R2 (skipped)
            0xD3, // INC R3
            0x00, 0x01, // STOP
        ],
        0x8000,
    );
    run_to_stop(&mut gsu, &mut cart);
    assert_eq!((gsu.r[1], gsu.r[2], gsu.r[3]), (1, 0, 1));
}

// =============================================================================
// Timing
// =============================================================================

#[test]
fn test_uncached_fetch_costs_memory_cycles() {
    let (mut gsu, mut cart) = setup(&NOPS_THEN_STOP, 0x8000);
    // Five fetches: the initial pipeline NOP's, three NOPs' and STOP's.
    assert_eq!(run_to_stop(&mut gsu, &mut cart), 5 * 6);

    let (mut gsu, mut cart) = setup(&NOPS_THEN_STOP, 0x8000);
    gsu.clsr = true;
    assert_eq!(run_to_stop(&mut gsu, &mut cart), 5 * 5);
}

#[test]
fn test_cached_fetch_fills_line_then_hits() {
    let (mut gsu, mut cart) = setup(&NOPS_THEN_STOP, 0x0000);
    assert_eq!(run_to_stop(&mut gsu, &mut cart), 16 * 6 + 4 * 2);
    assert!(gsu.cache.is_valid(0));

    // The line stays valid after STOP; a second run hits throughout.
    gsu.r[15] = 0x0000;
    gsu.go();
    assert_eq!(run_to_stop(&mut gsu, &mut cart), 5 * 2);
}

#[test]
fn test_cache_instruction_moves_window() {
    // CACHE at $8000: the window now starts at $8000 and the flush costs a
    // memory cycle.
    let (mut gsu, mut cart) = setup(&[0x02, 0x01, 0x01, 0x00, 0x01], 0x8000);
    run_to_stop(&mut gsu, &mut cart);
    assert_eq!(gsu.cbr, 0x8000);
}

// =============================================================================
// RAM and ROM buffers
// =============================================================================

const STORE_THEN_LOAD: [u8; 12] = [
    0xF1, 0x34, 0x12, // IWT R1,#$1234
    0xF2, 0x10, 0x00, // IWT R2,#$0010
    0xB1, 0x32, // FROM R1; STW (R2)
    0x13, 0x42, // TO R3; LDW (R2)
    0x00, 0x01, // STOP
];

#[test]
fn test_ram_word_store_and_load() {
    let (mut gsu, mut cart) = setup(&STORE_THEN_LOAD, 0x8000);
    gsu.run_until(10_000, &mut cart);
    assert_eq!(&cart.ram()[0x10..0x12], &[0x34, 0x12]);
    assert_eq!(gsu.r[3], 0x1234);
}

#[test]
fn test_ram_instruction_waits_for_ran() {
    let (mut gsu, mut cart) = setup(&STORE_THEN_LOAD, 0x8000);
    gsu.scmr = SCMR_RON;
    gsu.run_until(1_000, &mut cart);
    assert!(gsu.is_running());
    assert!(gsu.is_waiting());
    assert_eq!(gsu.r[2], 0x0010);
    assert_eq!(cart.ram()[0x10], 0);

    gsu.scmr |= SCMR_RAN;
    gsu.run_until(2_000, &mut cart);
    assert!(!gsu.is_running());
    assert_eq!(gsu.r[3], 0x1234);
}

#[test]
fn test_getb_reads_rom_buffer() {
    let mut program = vec![
        0xFE, 0x20, 0x80, // IWT R14,#$8020
        0x14, 0xEF, // TO R4; GETB
        0x00, 0x01, // STOP
    ];
    program.resize(0x21, 0x01);
    program[0x20] = 0x5A;
    let (mut gsu, mut cart) = setup(&program, 0x8000);
    run_to_stop(&mut gsu, &mut cart);
    assert_eq!(gsu.r[4], 0x005A);
}

// =============================================================================
// Snapshots
// =============================================================================

fn counting_program() -> Vec<u8> {
    vec![
        0xAC, 0x40, // IBT R12,#$40
        0xFD, 0x0A, 0x80, // IWT R13,#$800A
        0xF2, 0x00, 0x00, // IWT R2,#0
        0xA0, 0x00, // IBT R0,#0
        0xD0, // loop: INC R0
        0xB0, 0x32, // FROM R0; STW (R2)
        0xD2, // INC R2
        0x3C, // LOOP
        0xD2, // INC R2 (delay slot)
        0x00, 0x01, // STOP
    ]
}

#[test]
fn test_resume_mid_program_is_bit_identical() {
    let (mut reference, mut reference_cart) = setup(&counting_program(), 0x8000);
    reference.run_until(1_237, &mut reference_cart);
    reference.run_until(20_000, &mut reference_cart);
    assert!(!reference.is_running());
    assert_eq!(reference.r[0], 0x40);

    let (mut gsu, mut cart) = setup(&counting_program(), 0x8000);
    gsu.run_until(1_237, &mut cart);
    let state = snapshot::save(&mut gsu).unwrap();
    let ram = snapshot::save(&mut cart).unwrap();

    let (mut restored, mut restored_cart) = setup(&counting_program(), 0x8000);
    snapshot::load(&mut restored, &state).unwrap();
    snapshot::load(&mut restored_cart, &ram).unwrap();
    restored.run_until(20_000, &mut restored_cart);

    assert_eq!(
        snapshot::save(&mut restored).unwrap(),
        snapshot::save(&mut reference).unwrap()
    );
    assert_eq!(restored_cart.ram(), reference_cart.ram());
}

#[test]
fn test_chunked_run_matches_single_run() {
    let (mut single, mut single_cart) = setup(&counting_program(), 0x8000);
    single.run_until(20_000, &mut single_cart);

    let (mut chunked, mut chunked_cart) = setup(&counting_program(), 0x8000);
    let mut target = 0;
    while target < 20_000 {
        target = (target + 7).min(20_000);
        chunked.run_until(target, &mut chunked_cart);
    }

    assert_eq!(
        snapshot::save(&mut chunked).unwrap(),
        snapshot::save(&mut single).unwrap()
    );
    assert_eq!(chunked_cart.ram(), single_cart.ram());
}

// =============================================================================
// Instruction completion
// =============================================================================

#[test]
fn test_stop_takes_effect_at_its_completion_cycle() {
    let (mut reference, mut reference_cart) = setup(&NOPS_THEN_STOP, 0x8000);
    let completion = run_to_stop(&mut reference, &mut reference_cart);
    assert_eq!(completion, 30);

    for target in 1..=40 {
        let (mut gsu, mut cart) = setup(&NOPS_THEN_STOP, 0x8000);
        gsu.run_until(target, &mut cart);
        assert!(gsu.cycle_count <= target, "target {target}");
        assert_eq!(gsu.is_running(), target < completion, "target {target}");
        assert_eq!(gsu.irq_pending(), target >= completion, "target {target}");
    }
}

#[test]
fn test_unfinished_instruction_leaves_no_trace() {
    let program = [
        0xF1, 0x10, 0x00, // IWT R1,#$0010
        0xF0, 0xEF, 0xBE, // IWT R0,#$BEEF
        0x31, //             STW (R1): low byte lands at 54, high at 60
        0xF3, 0x34, 0x12, // IWT R3,#$1234: 54 to 72
        0x00, 0x01, //       STOP
    ];
    let (mut gsu, mut cart) = setup(&program, 0x8000);
    gsu.run_until(65, &mut cart);
    assert_eq!(gsu.cycle_count, 54);
    assert_eq!(gsu.r[3], 0);
    assert_eq!(cart.ram()[0x10], 0xEF);
    // The high byte came due inside the IWT that did not finish.
    assert_eq!(cart.ram()[0x11], 0x00);

    gsu.run_until(72, &mut cart);
    assert_eq!(gsu.cycle_count, 72);
    assert_eq!(gsu.r[3], 0x1234);
    assert_eq!(cart.ram()[0x11], 0xBE);
    assert!(gsu.is_running());
}
