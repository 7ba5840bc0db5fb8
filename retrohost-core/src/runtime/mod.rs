//! Core host runtime.
//!
//! Responsibilities:
//! - Drive one loaded core through its lifecycle: init, load a game, run frames,
//!   unload, deinit.
//! - Hand the core our callbacks (`imports`) and answer its environment calls
//!   (`environment`).
//! - Keep negotiated state (pixel format, geometry, hardware context) and the
//!   save memory file in sync with the core.
//!
//! Notes:
//! - Every call into the core goes through `CoreHost::call`, which installs the
//!   active call context for the callbacks it may trigger.
//! - The host never owns the frontend services; callers pass a `Frontend` to each
//!   operation so the same services can outlive (or be swapped between) cores.

mod environment;
mod imports;

use std::ffi::{CStr, CString, c_char};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::slice;

use libretro_sys::{self as sys, GameInfo, SystemAvInfo, SystemInfo};
use log::{debug, info, warn};

use crate::abi::{self, CoreApi};
use crate::av::audio::{AudioSink, NullSink};
use crate::av::video::FramePresenter;
use crate::av::{GameGeometry, PixelFormat, ViewportRect};
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::input::{InputSource, NullInput};
use crate::loader::{self, CoreLibrary};
use crate::state::{self, AvTiming, CallContext, CoreState, HwRenderConfig};
use crate::storage::{self, SaveNaming};

/// Services the host drives on behalf of the core.
pub struct Frontend {
    pub audio: Box<dyn AudioSink>,
    pub input: Box<dyn InputSource>,
    pub video: FramePresenter,
    pub system_dir: PathBuf,
    pub save_dir: PathBuf,
    pub save_naming: SaveNaming,
}

impl Frontend {
    pub fn new(config: &HostConfig, audio: Box<dyn AudioSink>, input: Box<dyn InputSource>) -> Self {
        let mut frontend = Self {
            audio,
            input,
            video: FramePresenter::new(),
            system_dir: config.system_dir.clone(),
            save_dir: config.save_dir.clone(),
            save_naming: config.save_naming(),
        };
        frontend.audio.set_volume(config.volume);
        frontend
    }

    /// No audio, no input, no render backend, default directories.
    pub fn headless() -> Self {
        Self::new(
            &HostConfig::default(),
            Box::new(NullSink::default()),
            Box::new(NullInput),
        )
    }
}

impl std::fmt::Debug for Frontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frontend")
            .field("system_dir", &self.system_dir)
            .field("save_dir", &self.save_dir)
            .field("save_naming", &self.save_naming)
            .field("has_backend", &self.video.has_backend())
            .finish_non_exhaustive()
    }
}

/// Static description of a core (`retro_get_system_info`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreInfo {
    pub library_name: String,
    pub library_version: String,
    pub valid_extensions: Vec<String>,
    /// The core reads the game itself from `path`; no data buffer is passed.
    pub need_fullpath: bool,
    pub block_extract: bool,
}

impl CoreInfo {
    fn from_raw(raw: &SystemInfo) -> Self {
        let extensions = cstr_lossy(raw.valid_extensions);
        Self {
            library_name: cstr_lossy(raw.library_name),
            library_version: cstr_lossy(raw.library_version),
            valid_extensions: extensions
                .split('|')
                .filter(|e| !e.is_empty())
                .map(str::to_owned)
                .collect(),
            need_fullpath: raw.need_fullpath,
            block_extract: raw.block_extract,
        }
    }

    /// Whether `path` has one of the core's declared extensions (case-insensitive).
    /// A core that declares none accepts anything.
    pub fn accepts(&self, path: &Path) -> bool {
        if self.valid_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.valid_extensions
                    .iter()
                    .any(|v| v.eq_ignore_ascii_case(ext))
            })
    }
}

fn cstr_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null strings from `SystemInfo` are NUL-terminated and static.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Path as a C string for the core. Interior NULs cannot be represented; such a
/// path is reported as empty.
fn path_cstring(path: &Path) -> CString {
    CString::new(path.to_string_lossy().into_owned()).unwrap_or_else(|_| {
        warn!("path {} contains a NUL byte", path.display());
        CString::default()
    })
}

fn directory_for_core(dir: &Path) -> (PathBuf, CString) {
    let abs = storage::prepare_dir(dir).unwrap_or_else(|e| {
        warn!("cannot prepare {}: {e}", dir.display());
        dir.to_path_buf()
    });
    let c = path_cstring(&abs);
    (abs, c)
}

struct LoadedGame {
    rom_path: PathBuf,
    save_path: PathBuf,
    // Both stay alive while the game is loaded; the core may keep pointers into them.
    _path: CString,
    _data: Vec<u8>,
}

/// One loaded core.
pub struct CoreHost {
    state: CoreState,
    info: CoreInfo,
    save_dir: PathBuf,
    game: Option<LoadedGame>,
    initialized: bool,
    // Last: the library must outlive every call above.
    library: CoreLibrary,
}

impl CoreHost {
    /// Open the core module at `path` and initialize it.
    pub fn load(path: &Path, frontend: &mut Frontend) -> Result<Self> {
        let library = loader::open(path)?;
        Self::with_library(library, frontend)
    }

    /// Initialize an already resolved core.
    ///
    /// Installs every callback before `retro_init`, then reads the system info.
    pub fn with_library(library: CoreLibrary, frontend: &mut Frontend) -> Result<Self> {
        let (_, system_dir) = directory_for_core(&frontend.system_dir);
        let (save_dir, save_dir_c) = directory_for_core(&frontend.save_dir);

        let mut host = Self {
            state: CoreState::new(system_dir, save_dir_c),
            info: CoreInfo::default(),
            save_dir,
            game: None,
            initialized: false,
            library,
        };

        let api_version = host.library.api().api_version;
        if let Some(api_version) = api_version {
            // SAFETY: resolved entry point with no arguments.
            let version = host.call(frontend, |_| unsafe { api_version() });
            if version != abi::API_VERSION {
                warn!(
                    "core reports API version {version}, host implements {}",
                    abi::API_VERSION
                );
            }
        }

        host.call(frontend, |api| unsafe {
            (api.set_environment)(imports::environment);
            (api.set_video_refresh)(imports::video_refresh);
            (api.set_audio_sample)(imports::audio_sample);
            (api.set_audio_sample_batch)(imports::audio_sample_batch);
            (api.set_input_poll)(imports::input_poll);
            (api.set_input_state)(imports::input_state);
            (api.init)();
        });
        host.initialized = true;
        host.call(frontend, |api| unsafe {
            (api.set_controller_port_device)(0, sys::DEVICE_JOYPAD)
        });

        let mut raw = SystemInfo {
            library_name: ptr::null(),
            library_version: ptr::null(),
            valid_extensions: ptr::null(),
            need_fullpath: false,
            block_extract: false,
        };
        host.call(frontend, |api| unsafe { (api.get_system_info)(&mut raw) });
        host.info = CoreInfo::from_raw(&raw);
        info!(
            "core: {} {} (extensions: {})",
            host.info.library_name,
            host.info.library_version,
            host.info.valid_extensions.join("|")
        );
        Ok(host)
    }

    /// Run `f` against the core with this host's context active for callbacks.
    fn call<R>(&mut self, frontend: &mut Frontend, f: impl FnOnce(&CoreApi) -> R) -> R {
        let api = *self.library.api();
        let mut ctx = CallContext {
            state: &mut self.state,
            frontend,
        };
        let _guard = state::enter(&mut ctx);
        f(&api)
    }

    pub fn info(&self) -> &CoreInfo {
        &self.info
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library.path()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.state.pixel_format
    }

    pub fn geometry(&self) -> GameGeometry {
        self.state.geometry
    }

    pub fn timing(&self) -> Option<AvTiming> {
        self.state.timing
    }

    pub fn hw_render(&self) -> Option<HwRenderConfig> {
        self.state.hw_render
    }

    pub fn viewport(&self) -> ViewportRect {
        self.state.viewport
    }

    pub fn is_game_loaded(&self) -> bool {
        self.game.is_some()
    }

    pub fn rom_path(&self) -> Option<&Path> {
        self.game.as_ref().map(|g| g.rom_path.as_path())
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.game.as_ref().map(|g| g.save_path.as_path())
    }

    /// Load a game.
    ///
    /// A game that is already loaded is unloaded first (its save is flushed). On
    /// success the render target exists at the base geometry, audio is opened at
    /// the core's sample rate and the save file (if any) has been copied into the
    /// core's save memory.
    pub fn load_game(&mut self, rom: &Path, frontend: &mut Frontend) -> Result<()> {
        if !self.initialized {
            return Err(HostError::NotLoaded);
        }
        if self.game.is_some() {
            self.unload_game(frontend);
        }

        let rom_path = std::path::absolute(rom).unwrap_or_else(|_| rom.to_path_buf());
        if !self.info.accepts(&rom_path) {
            warn!(
                "{} does not have an extension the core declares ({})",
                rom_path.display(),
                self.info.valid_extensions.join("|")
            );
        }
        let data = if self.info.need_fullpath {
            Vec::new()
        } else {
            fs::read(&rom_path).map_err(|source| HostError::RomRead {
                path: rom_path.clone(),
                source,
            })?
        };
        let path_c = CString::new(rom_path.to_string_lossy().into_owned()).map_err(|_| {
            HostError::RomRead {
                path: rom_path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
            }
        })?;

        let game_info = GameInfo {
            path: path_c.as_ptr(),
            data: if data.is_empty() {
                ptr::null()
            } else {
                data.as_ptr().cast()
            },
            size: data.len(),
            meta: ptr::null(),
        };
        // SAFETY: `game_info` points into `path_c` and `data`, both kept alive below.
        let accepted = self.call(frontend, |api| unsafe { (api.load_game)(&game_info) });
        if !accepted {
            return Err(HostError::LoadFailed(rom_path));
        }
        info!("loaded {} ({} bytes)", rom_path.display(), data.len());

        let save_path = storage::save_path(&self.save_dir, &rom_path, &frontend.save_naming);
        self.game = Some(LoadedGame {
            rom_path,
            save_path,
            _path: path_c,
            _data: data,
        });

        self.call(frontend, |api| unsafe {
            (api.set_controller_port_device)(0, sys::DEVICE_JOYPAD)
        });
        self.refresh_av_info(frontend);

        let (depth, stencil) = environment::depth_stencil(&self.state);
        match self.state.geometry.target_size() {
            Some((width, height)) => frontend
                .video
                .create_or_resize_target(width, height, depth, stencil),
            None => warn!("core reports no usable geometry; waiting for its first frame"),
        }

        if let Some(context_reset) = self.state.hw_render.and_then(|hw| hw.context_reset) {
            debug!("calling context_reset");
            self.call(frontend, |_| unsafe { context_reset() });
        }

        environment::apply_layout(&mut self.state, frontend);
        self.load_save(frontend);
        Ok(())
    }

    fn refresh_av_info(&mut self, frontend: &mut Frontend) {
        let mut av = SystemAvInfo {
            geometry: sys::GameGeometry {
                base_width: 0,
                base_height: 0,
                max_width: 0,
                max_height: 0,
                aspect_ratio: 0.0,
            },
            timing: sys::SystemTiming {
                fps: 0.0,
                sample_rate: 0.0,
            },
        };
        self.call(frontend, |api| unsafe { (api.get_system_av_info)(&mut av) });

        self.state.geometry = GameGeometry::from(&av.geometry);
        self.state.timing = Some(AvTiming {
            fps: av.timing.fps,
            sample_rate: av.timing.sample_rate,
        });
        info!(
            "av info: {}x{} (max {}x{}) aspect {} @ {} fps, {} Hz",
            av.geometry.base_width,
            av.geometry.base_height,
            av.geometry.max_width,
            av.geometry.max_height,
            self.state.geometry.target_aspect(),
            av.timing.fps,
            av.timing.sample_rate
        );

        environment::apply_geometry(&self.state, frontend);
        if av.timing.sample_rate > 0.0 && av.timing.sample_rate.is_finite() {
            frontend.audio.init(av.timing.sample_rate.round() as u32);
        } else {
            warn!("core reports no usable sample rate; audio stays closed");
        }
    }

    /// The core's save memory, if it exposes any.
    fn save_memory(&mut self, frontend: &mut Frontend) -> Option<&mut [u8]> {
        let (data, size) = self.call(frontend, |api| unsafe {
            (
                (api.get_memory_data)(sys::MEMORY_SAVE_RAM),
                (api.get_memory_size)(sys::MEMORY_SAVE_RAM),
            )
        });
        if data.is_null() || size == 0 {
            return None;
        }
        // SAFETY: the core owns `size` bytes at `data` until the game is unloaded,
        // and the returned borrow is tied to `self`.
        Some(unsafe { slice::from_raw_parts_mut(data.cast::<u8>(), size) })
    }

    fn load_save(&mut self, frontend: &mut Frontend) {
        let Some(path) = self.game.as_ref().map(|g| g.save_path.clone()) else {
            return;
        };
        let Some(memory) = self.save_memory(frontend) else {
            debug!("core exposes no save memory");
            return;
        };
        match storage::load_into(&path, memory) {
            Ok(Some(_)) => {}
            Ok(None) => debug!("no save file at {}", path.display()),
            Err(e) => warn!("{e}"),
        }
    }

    fn flush_save(&mut self, frontend: &mut Frontend) {
        let Some(path) = self.game.as_ref().map(|g| g.save_path.clone()) else {
            return;
        };
        let Some(memory) = self.save_memory(frontend) else {
            return;
        };
        if let Err(e) = storage::persist(&path, memory) {
            warn!("{e}");
        }
    }

    /// Write the save memory to disk without unloading.
    pub fn save(&mut self, frontend: &mut Frontend) -> Result<()> {
        let Some(path) = self.game.as_ref().map(|g| g.save_path.clone()) else {
            return Err(HostError::NotLoaded);
        };
        match self.save_memory(frontend) {
            Some(memory) => storage::persist(&path, memory),
            None => Ok(()),
        }
    }

    /// Advance the core by one frame.
    pub fn run(&mut self, frontend: &mut Frontend) -> Result<()> {
        if self.game.is_none() {
            return Err(HostError::NotLoaded);
        }
        self.call(frontend, |api| unsafe { (api.run)() });
        Ok(())
    }

    /// Soft-reset the running game. Cores without `retro_reset` ignore this.
    pub fn reset(&mut self, frontend: &mut Frontend) -> Result<()> {
        if self.game.is_none() {
            return Err(HostError::NotLoaded);
        }
        let reset = self.library.api().reset;
        match reset {
            Some(reset) => self.call(frontend, |_| unsafe { reset() }),
            None => debug!("core has no retro_reset"),
        }
        Ok(())
    }

    /// Blit the last frame into the viewport computed by `update_video_layout`.
    pub fn present(&mut self, frontend: &mut Frontend) {
        frontend.video.present(self.state.viewport);
    }

    /// Recompute the letterboxed viewport for a window of `width x height`.
    pub fn update_video_layout(
        &mut self,
        width: u32,
        height: u32,
        frontend: &mut Frontend,
    ) -> ViewportRect {
        self.state.window = Some((width, height));
        environment::apply_layout(&mut self.state, frontend)
    }

    /// Unload the current game (if any), keeping the core initialized.
    pub fn unload_game(&mut self, frontend: &mut Frontend) {
        if self.game.is_none() {
            return;
        }
        self.flush_save(frontend);
        self.call(frontend, |api| unsafe { (api.unload_game)() });
        if let Some(context_destroy) = self.state.hw_render.and_then(|hw| hw.context_destroy) {
            debug!("calling context_destroy");
            self.call(frontend, |_| unsafe { context_destroy() });
        }
        if let Some(game) = self.game.take() {
            info!("unloaded {}", game.rom_path.display());
        }
        frontend.video.destroy_target();
        frontend.video.clear_frame();
        frontend.audio.stop();
    }

    /// Unload the game and deinitialize the core. Idempotent.
    pub fn unload(&mut self, frontend: &mut Frontend) {
        self.unload_game(frontend);
        if self.initialized {
            self.call(frontend, |api| unsafe { (api.deinit)() });
            self.initialized = false;
            debug!("core deinitialized");
        }
        self.state.clear_on_unload();
    }
}

impl std::fmt::Debug for CoreHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreHost")
            .field("info", &self.info)
            .field("library", &self.library)
            .field("state", &self.state)
            .field("game_loaded", &self.game.is_some())
            .finish()
    }
}

/// Dropping a host that is still initialized deinitializes the core against a
/// headless frontend: the caller's presenter and audio sink are not touched and
/// no graphics context is current, so `context_destroy` is skipped. Call
/// `unload` with the real frontend to release those.
impl Drop for CoreHost {
    fn drop(&mut self) {
        if !self.initialized {
            return;
        }
        warn!("core host dropped without unload; unloading with a headless frontend");
        let destroy = self.state.hw_render.as_mut().and_then(|hw| hw.context_destroy.take());
        if destroy.is_some() {
            warn!("no graphics context on drop; skipping context_destroy");
        }
        let mut frontend = Frontend::headless();
        self.unload(&mut frontend);
    }
}
