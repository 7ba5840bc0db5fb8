//! Core-side shared state.
//!
//! This module owns the host-side state that bridges core callbacks and the
//! frontend services.
//!
//! Callback model:
//! - The core calls back through plain `extern "C"` functions with no user pointer.
//! - Before every call into the core, `CoreHost` installs a `CallContext` (its
//!   negotiated state plus the frontend services) as the thread's *active call*.
//! - Trampolines borrow the active call for the duration of one callback. Outside a
//!   host call there is nothing to borrow and they return the ABI failure value.
//!
//! Notes
//! - The slot is thread-local: two hosts on two threads never see each other.
//! - The raw pointer lives only here, behind an RAII guard that restores the
//!   previous value (also on unwind).
//! - A callback arriving while another one is being handled sees no active call.

use std::cell::Cell;
use std::ffi::{CString, c_void};
use std::ptr;

use libretro_sys::HwContextType;

use crate::abi::HwContextResetFn;
use crate::av::{GameGeometry, PixelFormat, ViewportRect};
use crate::runtime::Frontend;

/// Hardware rendering negotiated through `SET_HW_RENDER`.
#[derive(Clone, Copy, Debug)]
pub struct HwRenderConfig {
    pub context_type: HwContextType,
    pub version_major: u32,
    pub version_minor: u32,
    pub depth: bool,
    pub stencil: bool,
    pub bottom_left_origin: bool,
    pub context_reset: Option<HwContextResetFn>,
    pub context_destroy: Option<HwContextResetFn>,
}

/// Audio/video timing reported by `retro_get_system_av_info`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AvTiming {
    pub fps: f64,
    pub sample_rate: f64,
}

/// Everything negotiated with one core.
#[derive(Debug)]
pub struct CoreState {
    pub pixel_format: PixelFormat,
    pub geometry: GameGeometry,
    pub timing: Option<AvTiming>,
    pub hw_render: Option<HwRenderConfig>,

    /// Reported through `GET_SYSTEM_DIRECTORY` / `GET_SAVE_DIRECTORY`. Owned here so
    /// the pointers handed to the core stay valid until the host is dropped.
    pub system_dir: CString,
    pub save_dir: CString,

    /// Last window size passed to `update_video_layout`.
    pub window: Option<(u32, u32)>,
    pub viewport: ViewportRect,
}

impl CoreState {
    pub fn new(system_dir: CString, save_dir: CString) -> Self {
        Self {
            pixel_format: PixelFormat::default(),
            geometry: GameGeometry::default(),
            timing: None,
            hw_render: None,
            system_dir,
            save_dir,
            window: None,
            viewport: ViewportRect::default(),
        }
    }

    /// Drop per-game negotiation (everything but the directories).
    pub fn clear_on_unload(&mut self) {
        self.pixel_format = PixelFormat::default();
        self.geometry = GameGeometry::default();
        self.timing = None;
        self.hw_render = None;
        self.viewport = ViewportRect::default();
    }

    pub fn bottom_left_origin(&self) -> bool {
        self.hw_render.is_some_and(|hw| hw.bottom_left_origin)
    }
}

/// What a callback may touch while the core is being called.
pub struct CallContext<'a> {
    pub state: &'a mut CoreState,
    pub frontend: &'a mut Frontend,
}

thread_local! {
    static ACTIVE: Cell<*mut c_void> = const { Cell::new(ptr::null_mut()) };
}

/// Restores the previously active call when dropped.
#[must_use = "the call context is only active while the guard is alive"]
pub struct ActiveGuard {
    previous: *mut c_void,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|a| a.set(self.previous));
    }
}

/// Make `ctx` the active call on this thread until the guard drops.
///
/// The caller must not touch `ctx` while the guard is alive.
pub fn enter(ctx: &mut CallContext<'_>) -> ActiveGuard {
    let raw = (ctx as *mut CallContext<'_>).cast::<c_void>();
    ActiveGuard {
        previous: ACTIVE.with(|a| a.replace(raw)),
    }
}

/// Run `f` with the active call, if any.
///
/// The slot is emptied while `f` runs so a nested callback gets `None`.
pub fn with_active<R>(f: impl FnOnce(&mut CallContext<'_>) -> R) -> Option<R> {
    let raw = ACTIVE.with(|a| a.replace(ptr::null_mut()));
    if raw.is_null() {
        return None;
    }
    let _restore = ActiveGuard { previous: raw };
    // SAFETY: `raw` was installed by `enter` from a `CallContext` that outlives its
    // guard, and the slot is empty while this borrow exists.
    let ctx = unsafe { &mut *raw.cast::<CallContext<'_>>() };
    Some(f(ctx))
}

/// Whether a host call is in progress on this thread.
pub fn is_active() -> bool {
    ACTIVE.with(|a| !a.get().is_null())
}
