//! Save memory persistence.
//!
//! A core exposes its battery-backed memory (`MEMORY_SAVE_RAM`) as a raw buffer.
//! The host copies that buffer from a file after loading a game and writes it back
//! on unload. The file is a plain byte dump at `<save_dir>/<rom stem>.<ext>`.
//!
//! Notes:
//! - Save failures are logged by the caller and never block gameplay.
//! - A file shorter than the core's memory fills a prefix; a longer one is truncated
//!   (with a warning) to the core's size.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{HostError, Result};

/// How save file extensions are chosen.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SaveNaming {
    /// `.dsv` for Nintendo DS ROMs (`.nds`), `.sav` for everything else.
    #[default]
    ByConsole,
    /// Always use this extension (without the dot).
    Fixed(String),
}

impl SaveNaming {
    fn extension_for(&self, rom: &Path) -> &str {
        match self {
            SaveNaming::Fixed(ext) => ext.trim_start_matches('.'),
            SaveNaming::ByConsole => {
                let is_nds = rom
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("nds"));
                if is_nds { "dsv" } else { "sav" }
            }
        }
    }
}

/// Compute the save file path for `rom`.
pub fn save_path(save_dir: &Path, rom: &Path, naming: &SaveNaming) -> PathBuf {
    let stem = rom
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "game".to_string());
    save_dir.join(format!("{stem}.{}", naming.extension_for(rom)))
}

/// Create `dir` if needed and return it as an absolute path.
pub fn prepare_dir(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    std::path::absolute(dir)
}

/// Copy the save file at `path` into `memory`.
///
/// Returns the number of bytes copied, or `None` when no save file exists yet.
pub fn load_into(path: &Path, memory: &mut [u8]) -> Result<Option<usize>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(HostError::SaveIo {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if data.len() > memory.len() {
        warn!(
            "save file {} is {} bytes, core exposes {}; truncating",
            path.display(),
            data.len(),
            memory.len()
        );
    }
    let n = data.len().min(memory.len());
    memory[..n].copy_from_slice(&data[..n]);
    info!("loaded {n} bytes of save memory from {}", path.display());
    Ok(Some(n))
}

/// Write `memory` to `path`, creating the parent directory if needed.
pub fn persist(path: &Path, memory: &[u8]) -> Result<()> {
    let io_err = |source: io::Error| HostError::SaveIo {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, memory).map_err(io_err)?;
    info!("saved {} bytes of save memory to {}", memory.len(), path.display());
    Ok(())
}
