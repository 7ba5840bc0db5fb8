//! Host error taxonomy.
//!
//! Fatal load errors (`ModuleNotFound`, `ModuleInvalid`, `SymbolMissing`) are surfaced
//! to the caller and never retried. `LoadFailed` leaves the session unloaded so the
//! caller can try again. `FramebufferIncomplete` and `SaveIo` are logged by the host
//! and do not interrupt gameplay.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("core module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),

    #[error("core module {} was rejected by the loader: {source}", .path.display())]
    ModuleInvalid {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("core module is missing required entry point `{0}`")]
    SymbolMissing(&'static str),

    #[error("core rejected content {}", .0.display())]
    LoadFailed(PathBuf),

    #[error("failed to read content {}: {source}", .path.display())]
    RomRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no game is loaded")]
    NotLoaded,

    #[error("render target incomplete (status {status:#06x}) at {width}x{height}")]
    FramebufferIncomplete { status: u32, width: u32, height: u32 },

    #[error("save file {}: {source}", .path.display())]
    SaveIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T, E = HostError> = std::result::Result<T, E>;
