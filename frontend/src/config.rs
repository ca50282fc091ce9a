//! `quartz.toml` settings and the frontend's error type.
//!
//! The config file is optional. Lookup order: an explicit `--config` path,
//! `./quartz.toml`, then `<config dir>/quartz/quartz.toml`. Command-line flags
//! override whatever the file sets.

use std::path::{Path, PathBuf};

use log::debug;
use quartz_core::snapshot::SnapshotError;
use quartz_machines::BoardError;
use serde::Deserialize;
use thiserror::Error;

pub const FILE_NAME: &str = "quartz.toml";

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown board \"{0}\" (try `quartz list`)")]
    UnknownBoard(String),

    #[error("no board given; pass --board or set `board` in {FILE_NAME}")]
    NoBoard,

    #[error("unknown memory type \"{0}\"")]
    UnknownMemory(String),

    #[error("could not start board: {0}")]
    Board(#[from] BoardError),

    #[error("could not load save state: {0}")]
    LoadState(#[source] SnapshotError),

    #[error("could not save state: {0}")]
    SaveState(#[source] SnapshotError),
}

impl FrontendError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        FrontendError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Board name as listed by `quartz list`.
    pub board: Option<String>,
    /// Super FX clock as a percentage of nominal.
    pub clock_percent: u32,
    /// Frames to run when the command line does not say.
    pub frames: u64,
    /// Where save states go; defaults to next to the ROM.
    pub save_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            board: None,
            clock_percent: 100,
            frames: 60,
            save_dir: None,
        }
    }
}

impl Config {
    pub fn parse(text: &str, path: &Path) -> Result<Self, FrontendError> {
        toml::from_str(text).map_err(|source| FrontendError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the first config file found, or the defaults when there is none.
    /// An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FrontendError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match search_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    debug!("no {FILE_NAME} found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let text = std::fs::read_to_string(&path).map_err(|e| FrontendError::io(&path, e))?;
        debug!("config: {}", path.display());
        Self::parse(&text, &path)
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("quartz").join(FILE_NAME));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("", Path::new("quartz.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn all_fields() {
        let text = r#"
            board = "superfx"
            clock_percent = 150
            frames = 600
            save_dir = "/tmp/states"
        "#;
        let config = Config::parse(text, Path::new("quartz.toml")).unwrap();
        assert_eq!(config.board.as_deref(), Some("superfx"));
        assert_eq!(config.clock_percent, 150);
        assert_eq!(config.frames, 600);
        assert_eq!(config.save_dir, Some(PathBuf::from("/tmp/states")));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Config::parse("scale = 3", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, FrontendError::Config { .. }));
        assert!(err.to_string().starts_with("invalid config bad.toml"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("quartz_no_such_config.toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(FrontendError::Io { .. })
        ));
    }
}
