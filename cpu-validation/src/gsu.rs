//! Single-instruction GSU vectors.
//!
//! A vector runs one instruction (with its FROM/TO/ALT prefixes) out of a
//! 256-byte ROM image mirrored across the whole ROM space, against 256 bytes
//! of mirrored cartridge RAM. It records the register file and RAM before and
//! after, plus the master cycles the instruction took.
//!
//! The program is executed from `$00:8000` upwards, outside the cache window,
//! followed by a NOP so any buffered RAM write has landed when the final state
//! is captured.

use quartz_core::core::CartMemory;
use quartz_core::cpu::CpuStateTrait;
use quartz_core::cpu::gsu::{Gsu, SCMR_RAN, SCMR_RON, Sfr};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const ROM_SIZE: usize = 0x100;
pub const RAM_SIZE: usize = 0x100;
const NOP: u8 = 0x01;

/// Flags a vector may start with. Prefix and run-state bits are owned by the
/// vector itself.
const RANDOM_FLAGS: u16 = Sfr::Z | Sfr::CY | Sfr::S | Sfr::OV;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GsuVectorState {
    pub r: [u16; 16],
    pub sfr: u16,
    pub pbr: u8,
    pub rombr: u8,
    pub rambr: u8,
    pub cbr: u16,
    pub ram: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GsuTestCase {
    pub name: String,
    pub rom: Vec<u8>,
    /// `execute_instruction` calls: pipeline fill, prefixes, the
    /// instruction and the trailing NOP.
    pub steps: u32,
    pub clsr: bool,
    pub initial: GsuVectorState,
    #[serde(rename = "final")]
    pub final_state: GsuVectorState,
    pub cycles: u64,
}

/// One opcode under one ALT mode.
#[derive(Clone, Copy, Debug)]
pub struct InstrDef {
    pub alt: u8,
    pub opcode: u8,
    pub operands: u8,
}

impl InstrDef {
    pub fn file_stem(&self) -> String {
        format!("{}{:02x}", ["", "alt1_", "alt2_", "alt3_"][self.alt as usize], self.opcode)
    }

    pub fn label(&self) -> String {
        match self.alt {
            0 => format!("0x{:02X}", self.opcode),
            alt => format!("ALT{alt} 0x{:02X}", self.opcode),
        }
    }

    fn prefix(&self) -> Option<u8> {
        match self.alt {
            0 => None,
            alt => Some(0x3C + alt),
        }
    }
}

/// Every non-graphics opcode with each ALT mode that changes its meaning.
pub fn all_instructions() -> Vec<InstrDef> {
    let mut v = Vec::new();
    let mut add = |opcodes: std::ops::RangeInclusive<u8>, alts: &[u8], operands: u8| {
        for opcode in opcodes {
            for &alt in alts {
                v.push(InstrDef { alt, opcode, operands });
            }
        }
    };

    add(0x00..=0x04, &[0], 0); // STOP, NOP, CACHE, LSR, ROL
    add(0x05..=0x0F, &[0], 1); // branches
    add(0x30..=0x3B, &[0, 1], 0); // STW/STB
    add(0x3C..=0x3C, &[0], 0); // LOOP
    add(0x40..=0x4B, &[0, 1], 0); // LDW/LDB
    add(0x4D..=0x4D, &[0], 0); // SWAP
    add(0x4F..=0x4F, &[0], 0); // NOT
    add(0x50..=0x5F, &[0, 1, 2, 3], 0); // ADD/ADC
    add(0x60..=0x6F, &[0, 1, 2, 3], 0); // SUB/SBC/CMP
    add(0x70..=0x70, &[0], 0); // MERGE
    add(0x71..=0x7F, &[0, 1, 2, 3], 0); // AND/BIC
    add(0x80..=0x8F, &[0, 1, 2, 3], 0); // MULT/UMULT
    add(0x90..=0x95, &[0], 0); // SBK, LINK, SEX
    add(0x96..=0x96, &[0, 1], 0); // ASR/DIV2
    add(0x97..=0x97, &[0], 0); // ROR
    add(0x98..=0x9D, &[0, 1], 0); // JMP/LJMP
    add(0x9E..=0x9E, &[0], 0); // LOB
    add(0x9F..=0x9F, &[0, 1], 0); // FMULT/LMULT
    add(0xA0..=0xAF, &[0, 1, 2], 1); // IBT/LMS/SMS
    add(0xC0..=0xC0, &[0], 0); // HIB
    add(0xC1..=0xCF, &[0, 1, 2, 3], 0); // OR/XOR
    add(0xD0..=0xDE, &[0], 0); // INC
    add(0xDF..=0xDF, &[2, 3], 0); // RAMB/ROMB
    add(0xE0..=0xEE, &[0], 0); // DEC
    add(0xEF..=0xEF, &[0, 1, 2, 3], 0); // GETB variants
    add(0xF0..=0xFF, &[0, 1, 2], 2); // IWT/LM/SM

    v
}

fn capture(gsu: &Gsu, cart: &CartMemory) -> GsuVectorState {
    let state = gsu.snapshot();
    GsuVectorState {
        r: state.r,
        sfr: state.sfr,
        pbr: state.pbr,
        rombr: state.rombr,
        rambr: state.rambr,
        cbr: state.cbr,
        ram: cart.ram().to_vec(),
    }
}

/// Build the core and cartridge a vector starts from.
pub fn prepare(case: &GsuTestCase) -> (Gsu, CartMemory) {
    let mut cart = CartMemory::new(case.rom.clone(), RAM_SIZE);
    cart.ram_mut().copy_from_slice(&case.initial.ram);

    let mut gsu = Gsu::new();
    gsu.scmr = SCMR_RON | SCMR_RAN;
    gsu.clsr = case.clsr;
    gsu.r = case.initial.r;
    gsu.sfr.set_bits(case.initial.sfr);
    gsu.pbr = case.initial.pbr;
    gsu.rombr = case.initial.rombr;
    gsu.rambr = case.initial.rambr;
    gsu.cbr = case.initial.cbr;
    gsu.go();
    (gsu, cart)
}

/// Replay a vector. Returns the final state and the cycles consumed.
pub fn run(case: &GsuTestCase) -> (GsuVectorState, u64) {
    let (mut gsu, mut cart) = prepare(case);
    for _ in 0..case.steps {
        if !gsu.is_running() {
            break;
        }
        gsu.execute_instruction(&mut cart);
    }
    (capture(&gsu, &cart), gsu.cycle_count)
}

/// Generate `count` random vectors for `instr`.
pub fn generate(rng: &mut impl Rng, instr: &InstrDef, count: usize) -> Vec<GsuTestCase> {
    (0..count).map(|_| generate_one(rng, instr)).collect()
}

fn generate_one(rng: &mut impl Rng, instr: &InstrDef) -> GsuTestCase {
    let mut rom = vec![0u8; ROM_SIZE];
    rng.fill(&mut rom[..]);
    let mut ram = vec![0u8; RAM_SIZE];
    rng.fill(&mut ram[..]);

    let mut program = vec![0xB0 | rng.gen_range(0..16u8), 0x10 | rng.gen_range(0..16u8)];
    program.extend(instr.prefix());
    program.push(instr.opcode);
    for _ in 0..instr.operands {
        program.push(rng.r#gen());
    }
    program.extend([NOP, NOP]);

    let pc: u16 = 0x8000 | (rng.gen_range(0..ROM_SIZE as u16));
    for (i, &byte) in program.iter().enumerate() {
        rom[(pc as usize + i) % ROM_SIZE] = byte;
    }

    let mut r: [u16; 16] = rng.r#gen();
    r[15] = pc;
    let initial = GsuVectorState {
        r,
        sfr: rng.r#gen::<u16>() & RANDOM_FLAGS,
        pbr: 0,
        rombr: rng.gen_range(0..0x80),
        rambr: rng.gen_range(0..2),
        cbr: 0,
        ram,
    };
    let name = program[..program.len() - 2]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut case = GsuTestCase {
        name,
        rom,
        // fill + FROM + TO + [ALT] + instruction + NOP
        steps: 1 + program.len() as u32 - instr.operands as u32 - 1,
        clsr: rng.r#gen(),
        final_state: initial.clone(),
        initial,
        cycles: 0,
    };
    let (final_state, cycles) = run(&case);
    case.final_state = final_state;
    case.cycles = cycles;
    case
}
