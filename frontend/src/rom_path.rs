//! ROM image and sidecar file resolution.
//!
//! Everything the frontend reads or writes for a game lives next to its ROM
//! and shares its stem: `game.sfc` pairs with `game.srm` (battery RAM),
//! `game.msu` and `game-N.pcm` (MSU-1 media) and `game.qst` (save state,
//! unless a save directory is configured).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use quartz_core::coprocessor::MemoryMedia;

use crate::config::FrontendError;

pub fn load_rom(path: &Path) -> Result<Vec<u8>, FrontendError> {
    fs::read(path).map_err(|e| FrontendError::io(path, e))
}

pub fn nvram_path(rom: &Path) -> PathBuf {
    rom.with_extension("srm")
}

/// State file for `rom`, in `save_dir` when one is configured.
pub fn state_path(rom: &Path, save_dir: Option<&Path>) -> PathBuf {
    let local = rom.with_extension("qst");
    match (save_dir, local.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => local,
    }
}

/// Collect `<stem>.msu` and every `<stem>-<track>.pcm` beside the ROM.
/// Returns `None` when the ROM has no MSU-1 data file.
pub fn load_msu_media(rom: &Path) -> Result<Option<MemoryMedia>, FrontendError> {
    let data_path = rom.with_extension("msu");
    if !data_path.is_file() {
        return Ok(None);
    }
    let data = fs::read(&data_path).map_err(|e| FrontendError::io(&data_path, e))?;

    let stem = rom.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let dir = match rom.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!("{stem}-");
    let mut tracks = HashMap::new();
    for entry in fs::read_dir(dir).map_err(|e| FrontendError::io(dir, e))? {
        let path = entry.map_err(|e| FrontendError::io(dir, e))?.path();
        if path.extension().is_none_or(|ext| ext != "pcm") {
            continue;
        }
        let Some(track) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(&prefix))
            .and_then(|n| n.parse::<u16>().ok())
        else {
            continue;
        };
        debug!("MSU-1 track {track}: {}", path.display());
        tracks.insert(track, fs::read(&path).map_err(|e| FrontendError::io(&path, e))?);
    }
    info!("MSU-1: {} byte data file, {} audio tracks", data.len(), tracks.len());
    Ok(Some(MemoryMedia { data, tracks }))
}
