//! retrohost-core ABI module
//!
//! This module defines the contract between:
//! - **Host**: `retrohost-core` (the frontend)
//! - **Core**: a native module exporting the libretro entry points
//!
//! ## High-level model (callback-based)
//! The host registers six callbacks before `retro_init`:
//! - **environment**: one multiplexed negotiation call `(cmd, data) -> bool`
//! - **video refresh**: a software frame, a hardware frame marker, or a duplicate (null)
//! - **audio sample / audio sample batch**: interleaved stereo `i16`
//! - **input poll / input state**: the `(port, device, index, id) -> i16` query model
//!
//! The host then drives the core by calling `retro_run` once per frame. Every
//! callback arrives synchronously on the thread that made the call.
//!
//! ## Entry points (host -> core)
//! Required:
//! - `retro_set_environment`, `retro_set_video_refresh`, `retro_set_audio_sample`,
//!   `retro_set_audio_sample_batch`, `retro_set_input_poll`, `retro_set_input_state`
//! - `retro_init`, `retro_deinit`
//! - `retro_get_system_info`, `retro_get_system_av_info`
//! - `retro_load_game`, `retro_run`, `retro_unload_game`
//! - `retro_set_controller_port_device`
//! - `retro_get_memory_data`, `retro_get_memory_size`
//!
//! Optional:
//! - `retro_api_version` (checked against `API_VERSION`, mismatch is only logged)
//! - `retro_reset`
//!
//! Struct layouts, device ids and most environment commands come from `libretro_sys`.
//! This module adds the pieces that crate lacks:
//! - environment commands newer than its header snapshot
//! - `HwRenderCallback` / `LogCallback` mirrors whose function pointers are nullable
//!   or whose arguments are plain integers, so a misbehaving core cannot hand us
//!   an invalid Rust value

use std::ffi::{c_char, c_uint, c_void};

pub use libretro_sys as sys;

pub use sys::{
    AudioSampleBatchFn, AudioSampleFn, EnvironmentFn, GameInfo, InputPollFn, InputStateFn,
    ProcAddressFn, SystemAvInfo, SystemInfo, VideoRefreshFn,
};

/// Core API version this host implements.
pub const API_VERSION: c_uint = sys::API_VERSION;

/// `RETRO_ENVIRONMENT_SET_CORE_OPTIONS`
pub const ENVIRONMENT_SET_CORE_OPTIONS: c_uint = 53;

/// `RETRO_ENVIRONMENT_GET_PREFERRED_HW_RENDER`
pub const ENVIRONMENT_GET_PREFERRED_HW_RENDER: c_uint = 56;

/// `RETRO_ENVIRONMENT_SET_CORE_OPTIONS_V2`
pub const ENVIRONMENT_SET_CORE_OPTIONS_V2: c_uint = 67;

/// Low bits of a device id; the rest selects a subclass.
pub const DEVICE_MASK: c_uint = 0xff;

/// Joypad id returning the bitmask of every held button.
pub const DEVICE_ID_JOYPAD_MASK: c_uint = 256;

/// Number of individually addressable joypad buttons (B .. R3).
pub const JOYPAD_BUTTON_COUNT: usize = 16;

/// Entry point symbol names (host -> core).
pub mod entry_points {
    // Callback registration.
    pub const SET_ENVIRONMENT: &str = "retro_set_environment";
    pub const SET_VIDEO_REFRESH: &str = "retro_set_video_refresh";
    pub const SET_AUDIO_SAMPLE: &str = "retro_set_audio_sample";
    pub const SET_AUDIO_SAMPLE_BATCH: &str = "retro_set_audio_sample_batch";
    pub const SET_INPUT_POLL: &str = "retro_set_input_poll";
    pub const SET_INPUT_STATE: &str = "retro_set_input_state";

    // Lifecycle.
    pub const INIT: &str = "retro_init";
    pub const DEINIT: &str = "retro_deinit";
    pub const API_VERSION: &str = "retro_api_version";
    pub const GET_SYSTEM_INFO: &str = "retro_get_system_info";
    pub const GET_SYSTEM_AV_INFO: &str = "retro_get_system_av_info";
    pub const SET_CONTROLLER_PORT_DEVICE: &str = "retro_set_controller_port_device";
    pub const RESET: &str = "retro_reset";
    pub const RUN: &str = "retro_run";
    pub const LOAD_GAME: &str = "retro_load_game";
    pub const UNLOAD_GAME: &str = "retro_unload_game";

    // Memory.
    pub const GET_MEMORY_DATA: &str = "retro_get_memory_data";
    pub const GET_MEMORY_SIZE: &str = "retro_get_memory_size";
}

pub type HwContextResetFn = unsafe extern "C" fn();
pub type HwGetCurrentFramebufferFn = unsafe extern "C" fn() -> usize;
/// Returns null when the symbol cannot be resolved.
pub type HwGetProcAddressFn = unsafe extern "C" fn(sym: *const c_char) -> Option<ProcAddressFn>;

/// Layout-compatible mirror of `retro_hw_render_callback`.
///
/// Cores routinely leave `context_destroy` (and sometimes `context_reset`) null,
/// which `libretro_sys::HwRenderCallback` cannot represent.
#[repr(C)]
pub struct HwRenderCallback {
    pub context_type: c_uint,
    pub context_reset: Option<HwContextResetFn>,
    pub get_current_framebuffer: Option<HwGetCurrentFramebufferFn>,
    pub get_proc_address: Option<HwGetProcAddressFn>,
    pub depth: bool,
    pub stencil: bool,
    pub bottom_left_origin: bool,
    pub version_major: c_uint,
    pub version_minor: c_uint,
    pub cache_context: bool,
    pub context_destroy: Option<HwContextResetFn>,
    pub debug_context: bool,
}

/// `retro_log_printf_t` with the level taken as a raw integer.
///
/// The real signature is variadic; the host only reads the format string.
pub type LogPrintfFn = unsafe extern "C" fn(level: c_uint, fmt: *const c_char);

#[repr(C)]
pub struct LogCallback {
    pub log: LogPrintfFn,
}

/// Resolved entry points of a loaded core.
///
/// Plain function pointers, so the table is `Copy` and can be built either from a
/// dynamic library (`crate::loader`) or from in-process functions.
#[derive(Clone, Copy)]
pub struct CoreApi {
    pub set_environment: unsafe extern "C" fn(EnvironmentFn),
    pub set_video_refresh: unsafe extern "C" fn(VideoRefreshFn),
    pub set_audio_sample: unsafe extern "C" fn(AudioSampleFn),
    pub set_audio_sample_batch: unsafe extern "C" fn(AudioSampleBatchFn),
    pub set_input_poll: unsafe extern "C" fn(InputPollFn),
    pub set_input_state: unsafe extern "C" fn(InputStateFn),

    pub init: unsafe extern "C" fn(),
    pub deinit: unsafe extern "C" fn(),
    pub get_system_info: unsafe extern "C" fn(*mut SystemInfo),
    pub get_system_av_info: unsafe extern "C" fn(*mut SystemAvInfo),
    pub set_controller_port_device: unsafe extern "C" fn(c_uint, c_uint),
    pub run: unsafe extern "C" fn(),
    pub load_game: unsafe extern "C" fn(*const GameInfo) -> bool,
    pub unload_game: unsafe extern "C" fn(),

    pub get_memory_data: unsafe extern "C" fn(c_uint) -> *mut c_void,
    pub get_memory_size: unsafe extern "C" fn(c_uint) -> usize,

    pub api_version: Option<unsafe extern "C" fn() -> c_uint>,
    pub reset: Option<unsafe extern "C" fn()>,
}

impl std::fmt::Debug for CoreApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreApi")
            .field("api_version", &self.api_version.is_some())
            .field("reset", &self.reset.is_some())
            .finish_non_exhaustive()
    }
}

/// Input device capability mask reported through `GET_INPUT_DEVICE_CAPABILITIES`.
pub const fn input_device_capabilities() -> u64 {
    (1 << sys::DEVICE_JOYPAD)
        | (1 << sys::DEVICE_MOUSE)
        | (1 << sys::DEVICE_ANALOG)
        | (1 << sys::DEVICE_POINTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn hw_render_mirror_matches_sys_layout() {
        assert_eq!(size_of::<HwRenderCallback>(), size_of::<sys::HwRenderCallback>());
        assert_eq!(
            offset_of!(HwRenderCallback, context_destroy),
            offset_of!(sys::HwRenderCallback, context_destroy)
        );
        assert_eq!(
            offset_of!(HwRenderCallback, bottom_left_origin),
            offset_of!(sys::HwRenderCallback, bottom_left_origin)
        );
    }

    #[test]
    fn capabilities_cover_query_devices() {
        let caps = input_device_capabilities();
        assert_eq!(caps, 0b110_0110);
    }
}
