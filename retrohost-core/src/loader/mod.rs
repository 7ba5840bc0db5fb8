//! Loader utilities for retrohost-core.
//!
//! Responsibilities:
//! - Open a core module from disk (via `libloading`).
//! - Resolve every required entry point into a `CoreApi` table, plus the optional ones.
//! - Keep the library handle alive for as long as the table is in use.
//!
//! Notes:
//! - A missing file is reported as `ModuleNotFound` before the OS loader is involved,
//!   so callers can tell "wrong path" from "not a loadable module".
//! - We sniff the object format from the header bytes for diagnostics only; the OS
//!   loader has the final word.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::{debug, info};

use crate::abi::{CoreApi, entry_points as ep};
use crate::error::{HostError, Result};

/// A resolved core: the entry point table plus whatever keeps it valid.
pub struct CoreLibrary {
    api: CoreApi,
    path: Option<PathBuf>,
    // Declared last so it is dropped after everything that may still call into it.
    _library: Option<Library>,
}

impl CoreLibrary {
    /// Wrap an entry point table whose functions live in this process.
    pub fn from_api(api: CoreApi) -> Self {
        Self {
            api,
            path: None,
            _library: None,
        }
    }

    pub fn api(&self) -> &CoreApi {
        &self.api
    }

    /// Path the module was opened from (`None` for in-process cores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for CoreLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreLibrary")
            .field("path", &self.path)
            .field("api", &self.api)
            .finish()
    }
}

/// Object file format inferred from the module header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModuleFormat {
    Elf,
    Pe,
    MachO,
}

/// Best-effort detection from the first bytes of a module.
pub fn detect_format(bytes: &[u8]) -> Option<ModuleFormat> {
    match bytes {
        [0x7f, b'E', b'L', b'F', ..] => Some(ModuleFormat::Elf),
        [b'M', b'Z', ..] => Some(ModuleFormat::Pe),
        [0xcf, 0xfa, 0xed, 0xfe, ..] | [0xfe, 0xed, 0xfa, 0xcf, ..] | [0xca, 0xfe, 0xba, 0xbe, ..] => {
            Some(ModuleFormat::MachO)
        }
        _ => None,
    }
}

fn sniff(path: &Path) -> Option<ModuleFormat> {
    let mut header = [0u8; 4];
    let mut file = File::open(path).ok()?;
    file.read_exact(&mut header).ok()?;
    detect_format(&header)
}

/// Open: check path -> dlopen -> resolve entry points.
pub fn open(path: &Path) -> Result<CoreLibrary> {
    if !path.is_file() {
        return Err(HostError::ModuleNotFound(path.to_path_buf()));
    }

    debug!("opening core {} (format: {:?})", path.display(), sniff(path));

    // SAFETY: loading a library runs its initializers. Core modules are trusted
    // plugins chosen by the user.
    let library = unsafe { Library::new(path) }.map_err(|source| HostError::ModuleInvalid {
        path: path.to_path_buf(),
        source,
    })?;

    let api = resolve(&library)?;
    info!("loaded core module {}", path.display());

    Ok(CoreLibrary {
        api,
        path: Some(path.to_path_buf()),
        _library: Some(library),
    })
}

fn required<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    // SAFETY: `T` is the documented signature of `name` in the core ABI.
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|_| HostError::SymbolMissing(name))?;
    Ok(*symbol)
}

fn optional<T: Copy>(library: &Library, name: &'static str) -> Option<T> {
    // SAFETY: see `required`.
    unsafe { library.get::<T>(name.as_bytes()) }
        .ok()
        .map(|symbol| *symbol)
}

fn resolve(library: &Library) -> Result<CoreApi> {
    Ok(CoreApi {
        set_environment: required(library, ep::SET_ENVIRONMENT)?,
        set_video_refresh: required(library, ep::SET_VIDEO_REFRESH)?,
        set_audio_sample: required(library, ep::SET_AUDIO_SAMPLE)?,
        set_audio_sample_batch: required(library, ep::SET_AUDIO_SAMPLE_BATCH)?,
        set_input_poll: required(library, ep::SET_INPUT_POLL)?,
        set_input_state: required(library, ep::SET_INPUT_STATE)?,
        init: required(library, ep::INIT)?,
        deinit: required(library, ep::DEINIT)?,
        get_system_info: required(library, ep::GET_SYSTEM_INFO)?,
        get_system_av_info: required(library, ep::GET_SYSTEM_AV_INFO)?,
        set_controller_port_device: required(library, ep::SET_CONTROLLER_PORT_DEVICE)?,
        run: required(library, ep::RUN)?,
        load_game: required(library, ep::LOAD_GAME)?,
        unload_game: required(library, ep::UNLOAD_GAME)?,
        get_memory_data: required(library, ep::GET_MEMORY_DATA)?,
        get_memory_size: required(library, ep::GET_MEMORY_SIZE)?,
        api_version: optional(library, ep::API_VERSION),
        reset: optional(library, ep::RESET),
    })
}
