use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::info;
use quartz_core::core::machine::{Machine, MemoryType};
use quartz_machines::{BoardConfig, registry};

mod config;
mod emulator;
mod rom_path;

use config::{Config, FrontendError};

#[derive(Parser, Debug)]
#[command(name = "quartz", about = "Headless cycle-accurate console runner")]
struct Cli {
    /// Config file to use instead of the default search.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available boards.
    List,
    /// Run a ROM for a number of frames.
    Run(GameArgs),
    /// Run a ROM, then write a save state.
    Save {
        #[command(flatten)]
        game: GameArgs,
        /// State file (defaults to `<rom>.qst` in the save directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Load a save state, then keep running.
    Load {
        #[command(flatten)]
        game: GameArgs,
        /// State file (defaults to `<rom>.qst` in the save directory).
        #[arg(short, long, value_name = "PATH")]
        input: Option<PathBuf>,
    },
    /// Dump memory without side effects.
    Peek {
        #[command(flatten)]
        game: GameArgs,
        /// One of cpu, wram, rom, sram, cache.
        memory: String,
        /// Start address (hex, `$` or `0x` prefix optional).
        #[arg(value_parser = parse_hex)]
        address: u32,
        #[arg(short, long, default_value_t = 16)]
        len: u32,
        /// Load this state before dumping.
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct GameArgs {
    /// ROM image.
    rom: PathBuf,
    /// Board name (overrides the config file).
    #[arg(short, long)]
    board: Option<String>,
    /// Frames to run (overrides the config file).
    #[arg(short, long)]
    frames: Option<u64>,
    /// Super FX clock in percent of nominal (overrides the config file).
    #[arg(long)]
    clock: Option<u32>,
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches('$').trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address {s}: {e}"))
}

/// A machine built from the command line and config, with its file paths.
struct Session {
    machine: Box<dyn Machine>,
    rom: PathBuf,
    frames: u64,
    save_dir: Option<PathBuf>,
}

impl Session {
    fn open(game: &GameArgs, config: &Config) -> Result<Self, FrontendError> {
        let board = game
            .board
            .clone()
            .or_else(|| config.board.clone())
            .ok_or(FrontendError::NoBoard)?;
        let entry = registry::find(&board).ok_or(FrontendError::UnknownBoard(board))?;

        let mut board_config = BoardConfig::new(rom_path::load_rom(&game.rom)?);
        board_config.clock_percent = game.clock.unwrap_or(config.clock_percent);
        if let Some(media) = rom_path::load_msu_media(&game.rom)? {
            board_config.media = Some(Box::new(media));
        }
        let mut machine = (entry.create)(board_config)?;
        emulator::load_nvram(machine.as_mut(), &rom_path::nvram_path(&game.rom));
        info!("{}: {}", entry.name, game.rom.display());

        Ok(Self {
            machine,
            rom: game.rom.clone(),
            frames: game.frames.unwrap_or(config.frames),
            save_dir: config.save_dir.clone(),
        })
    }

    fn state_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| rom_path::state_path(&self.rom, self.save_dir.as_deref()))
    }

    fn run(&mut self) {
        emulator::run(self.machine.as_mut(), self.frames);
        println!(
            "frame {}, master clock {}",
            self.machine.frame_count(),
            self.machine.master_clock()
        );
    }

    fn close(self) {
        emulator::save_nvram(self.machine.as_ref(), &rom_path::nvram_path(&self.rom));
    }
}

fn execute(cli: Cli) -> Result<(), FrontendError> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::List => {
            for entry in registry::all() {
                println!("{:<10} {}", entry.name, entry.description);
            }
        }
        Command::Run(game) => {
            let mut session = Session::open(&game, &config)?;
            session.run();
            session.close();
        }
        Command::Save { game, output } => {
            let mut session = Session::open(&game, &config)?;
            session.run();
            let path = session.state_path(output.as_deref());
            let len = emulator::save_state(session.machine.as_mut(), &path)?;
            println!("saved {len} bytes to {}", path.display());
            session.close();
        }
        Command::Load { game, input } => {
            let mut session = Session::open(&game, &config)?;
            let path = session.state_path(input.as_deref());
            emulator::load_state(session.machine.as_mut(), &path)?;
            println!("loaded {}", path.display());
            session.run();
            session.close();
        }
        Command::Peek {
            game,
            memory,
            address,
            len,
            state,
        } => {
            let kind = MemoryType::from_name(&memory).ok_or(FrontendError::UnknownMemory(memory))?;
            let mut session = Session::open(&game, &config)?;
            if let Some(path) = state {
                emulator::load_state(session.machine.as_mut(), &path)?;
            } else if game.frames.is_some() {
                session.run();
            }
            print!("{}", emulator::dump(session.machine.as_ref(), kind, address, len));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
