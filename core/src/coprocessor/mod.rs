//! Cartridge coprocessors.
//!
//! The set is closed: each board carries at most one, chosen at construction
//! through [`create`] and driven through the [`Coprocessor`] trait object.

pub mod msu1;
pub mod obc1;
pub mod run_state;
pub mod superfx;

pub use msu1::{MemoryMedia, Msu1, MsuMedia, pcm_track};
pub use obc1::Obc1;
pub use superfx::SuperFx;

use std::any::Any;

use crate::core::{BusContender, CartMemory, ClockError, MemoryHandler};
use crate::snapshot::Snapshot;

/// A cartridge coprocessor as seen by the console.
///
/// Its register window is a [`MemoryHandler`] addressed by primary-CPU bus
/// address, with the shared cartridge as context.
pub trait Coprocessor: MemoryHandler<Context = CartMemory> + Snapshot + BusContender {
    fn name(&self) -> &'static str;

    fn reset(&mut self);

    /// Catch up to `master_clock`. Called before every primary-CPU access to
    /// the coprocessor or the shared cartridge, and once per CPU cycle.
    fn run(&mut self, master_clock: u64, cart: &mut CartMemory);

    fn irq_pending(&self) -> bool {
        false
    }

    fn process_end_of_frame(&mut self) {}

    /// Coprocessor-private memory (cache, work RAM) for debugger access.
    fn internal_memory(&self) -> &[u8] {
        &[]
    }

    fn internal_memory_mut(&mut self) -> &mut [u8] {
        &mut []
    }

    /// Battery-backed memory owned by the coprocessor rather than the cart.
    fn nvram(&self) -> Option<&[u8]> {
        None
    }

    /// Concrete access for debugger views and tests.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoprocessorKind {
    SuperFx,
    Obc1,
    Msu1,
}

impl CoprocessorKind {
    pub const ALL: [CoprocessorKind; 3] = [Self::SuperFx, Self::Obc1, Self::Msu1];

    pub fn name(self) -> &'static str {
        match self {
            Self::SuperFx => "superfx",
            Self::Obc1 => "obc1",
            Self::Msu1 => "msu1",
        }
    }
}

/// Construction options for [`create`].
pub struct CoprocessorOptions {
    /// Super FX clock as a percentage of nominal (100 = stock).
    pub clock_percent: u32,
    /// MSU-1 data and audio. Never part of a save state.
    pub media: Option<Box<dyn MsuMedia>>,
}

impl Default for CoprocessorOptions {
    fn default() -> Self {
        Self {
            clock_percent: 100,
            media: None,
        }
    }
}

pub fn create(kind: CoprocessorKind, options: CoprocessorOptions) -> Result<Box<dyn Coprocessor>, ClockError> {
    Ok(match kind {
        CoprocessorKind::SuperFx => Box::new(SuperFx::new(options.clock_percent)?),
        CoprocessorKind::Obc1 => Box::new(Obc1::new()),
        CoprocessorKind::Msu1 => {
            let media = options.media.unwrap_or_else(|| Box::new(MemoryMedia::default()));
            Box::new(Msu1::new(media)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_each_kind() {
        for kind in CoprocessorKind::ALL {
            let coprocessor = create(kind, CoprocessorOptions::default()).unwrap();
            assert_eq!(coprocessor.name(), kind.name());
        }
    }

    #[test]
    fn zero_clock_is_rejected() {
        let options = CoprocessorOptions {
            clock_percent: 0,
            media: None,
        };
        assert!(create(CoprocessorKind::SuperFx, options).is_err());
    }
}
