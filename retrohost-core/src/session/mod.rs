//! Game session.
//!
//! Responsibilities:
//! - Own the frontend services (audio, input, presenter) and at most one `CoreHost`.
//! - Sequence the shell's lifecycle calls:
//!   `Constructed -> ContextReady -> Loaded -> Running -> Unloaded`.
//! - Keep the graphics context current around everything that touches GL.
//!
//! Notes
//! - A `load_game` that arrives before `context_ready` is queued and executed by
//!   `context_ready` (shells often learn the ROM before their surface exists).
//! - A failed load leaves the session in `ContextReady`; loading again is allowed.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::Key;
use crate::av::audio::AudioSink;
use crate::av::backend::RenderBackend;
use crate::av::ViewportRect;
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::input::InputSource;
use crate::loader::CoreLibrary;
use crate::runtime::{CoreHost, CoreInfo, Frontend};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Constructed,
    ContextReady,
    Loaded,
    Running,
    Unloaded,
}

/// Where the core comes from.
#[derive(Debug)]
pub enum CoreSource {
    /// A module on disk, opened with the OS loader.
    Module(PathBuf),
    /// An entry point table that is already resolved.
    Resolved(CoreLibrary),
}

impl From<&Path> for CoreSource {
    fn from(path: &Path) -> Self {
        CoreSource::Module(path.to_path_buf())
    }
}

impl From<PathBuf> for CoreSource {
    fn from(path: PathBuf) -> Self {
        CoreSource::Module(path)
    }
}

impl From<CoreLibrary> for CoreSource {
    fn from(library: CoreLibrary) -> Self {
        CoreSource::Resolved(library)
    }
}

pub struct GameSession {
    phase: SessionPhase,
    frontend: Frontend,
    core: Option<CoreHost>,
    pending: Option<(CoreSource, PathBuf)>,
    window: Option<(u32, u32)>,
}

impl GameSession {
    pub fn new(config: &HostConfig, audio: Box<dyn AudioSink>, input: Box<dyn InputSource>) -> Self {
        Self {
            phase: SessionPhase::Constructed,
            frontend: Frontend::new(config, audio, input),
            core: None,
            pending: None,
            window: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn core(&self) -> Option<&CoreHost> {
        self.core.as_ref()
    }

    pub fn core_info(&self) -> Option<&CoreInfo> {
        self.core.as_ref().map(CoreHost::info)
    }

    pub fn frontend(&self) -> &Frontend {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut Frontend {
        &mut self.frontend
    }

    /// The shell's graphics context exists. Runs a queued load, if any.
    pub fn context_ready(&mut self, backend: Box<dyn RenderBackend>) -> Result<()> {
        self.frontend.video.attach(backend);
        if self.phase == SessionPhase::Constructed {
            self.phase = SessionPhase::ContextReady;
        }
        match self.pending.take() {
            Some((source, rom)) => {
                info!("running deferred load of {}", rom.display());
                self.load_now(source, &rom)
            }
            None => Ok(()),
        }
    }

    /// Load `rom` with `core`, replacing whatever is loaded.
    ///
    /// Before `context_ready` the request is queued (a later request replaces an
    /// earlier one) and `Ok(())` is returned.
    pub fn load_game(&mut self, core: impl Into<CoreSource>, rom: impl AsRef<Path>) -> Result<()> {
        let source = core.into();
        let rom = rom.as_ref().to_path_buf();
        if self.phase == SessionPhase::Constructed {
            info!("graphics context not ready; deferring load of {}", rom.display());
            self.pending = Some((source, rom));
            return Ok(());
        }
        self.load_now(source, &rom)
    }

    fn load_now(&mut self, source: CoreSource, rom: &Path) -> Result<()> {
        self.unload_game();

        self.make_current();
        let result = self.open_and_load(source, rom);
        self.done_current();

        match result {
            Ok(host) => {
                self.core = Some(host);
                self.phase = SessionPhase::Loaded;
                Ok(())
            }
            Err(e) => {
                warn!("load of {} failed: {e}", rom.display());
                self.phase = SessionPhase::ContextReady;
                Err(e)
            }
        }
    }

    fn open_and_load(&mut self, source: CoreSource, rom: &Path) -> Result<CoreHost> {
        let frontend = &mut self.frontend;
        let mut host = match source {
            CoreSource::Module(path) => CoreHost::load(&path, frontend)?,
            CoreSource::Resolved(library) => CoreHost::with_library(library, frontend)?,
        };
        if let Some((w, h)) = self.window {
            host.update_video_layout(w, h, frontend);
        }
        if let Err(e) = host.load_game(rom, frontend) {
            host.unload(frontend);
            return Err(e);
        }
        Ok(host)
    }

    /// Run one frame and present it.
    pub fn run(&mut self) -> Result<()> {
        let Some(core) = self.core.as_mut() else {
            return Err(HostError::NotLoaded);
        };
        if let Some(backend) = self.frontend.video.backend_mut() {
            backend.make_current();
        }
        let result = core.run(&mut self.frontend);
        if result.is_ok() {
            core.present(&mut self.frontend);
            self.phase = SessionPhase::Running;
        }
        if let Some(backend) = self.frontend.video.backend_mut() {
            backend.done_current();
        }
        result
    }

    pub fn reset(&mut self) -> Result<()> {
        match self.core.as_mut() {
            Some(core) => core.reset(&mut self.frontend),
            None => Err(HostError::NotLoaded),
        }
    }

    /// Unload the game and the core. Safe to call at any time.
    pub fn unload_game(&mut self) {
        self.pending = None;
        let Some(mut core) = self.core.take() else {
            return;
        };
        self.make_current();
        core.unload(&mut self.frontend);
        drop(core);
        if let Some(backend) = self.frontend.video.backend_mut() {
            backend.reset_state();
        }
        self.done_current();
        self.phase = SessionPhase::Unloaded;
    }

    /// New window size. Returns the letterboxed viewport (empty before a game is
    /// loaded; the size is remembered for the next load).
    pub fn update_video_layout(&mut self, width: u32, height: u32) -> ViewportRect {
        self.window = Some((width, height));
        match self.core.as_mut() {
            Some(core) => core.update_video_layout(width, height, &mut self.frontend),
            None => ViewportRect::default(),
        }
    }

    pub fn viewport(&self) -> ViewportRect {
        self.core
            .as_ref()
            .map_or_else(ViewportRect::default, CoreHost::viewport)
    }

    pub fn key_down(&mut self, key: Key) {
        self.frontend.input.key_down(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.frontend.input.key_up(key);
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.frontend.input.pointer_down(x, y);
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.frontend.input.pointer_move(x, y);
    }

    pub fn pointer_up(&mut self, x: f32, y: f32) {
        self.frontend.input.pointer_up(x, y);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.frontend.audio.set_volume(volume);
    }

    fn make_current(&mut self) {
        if let Some(backend) = self.frontend.video.backend_mut() {
            backend.make_current();
        }
    }

    fn done_current(&mut self) {
        if let Some(backend) = self.frontend.video.backend_mut() {
            backend.done_current();
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.unload_game();
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("phase", &self.phase)
            .field("core", &self.core)
            .field("pending", &self.pending)
            .field("window", &self.window)
            .finish()
    }
}
