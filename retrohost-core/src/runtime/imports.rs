//! Callbacks handed to the core.
//!
//! Every function here is an `extern "C"` trampoline: it borrows the thread's
//! active call (see `crate::state`) and forwards to the frontend services.
//!
//! Notes:
//! - Panics never cross the FFI boundary; they are caught, logged, and turned
//!   into the ABI failure value (`false`, `0`, null).
//! - Outside a host call there is no context and the same failure value is
//!   returned.

use std::ffi::{CStr, c_char, c_uint, c_void};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use libretro_sys::{self as sys, ProcAddressFn};
use log::{Level, error, log, warn};

use super::environment;
use crate::abi;
use crate::av::video::{FrameOutcome, VideoFrame};
use crate::av::required_frame_len;
use crate::state;

fn guarded<R>(name: &str, fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!("panic in {name} callback");
            fallback
        }
    }
}

pub(crate) unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    guarded("environment", false, || {
        // SAFETY: `data` comes straight from the core with the payload for `cmd`.
        state::with_active(|ctx| unsafe { environment::dispatch(ctx, cmd, data) }).unwrap_or(false)
    })
}

pub(crate) unsafe extern "C" fn video_refresh(
    data: *const c_void,
    width: c_uint,
    height: c_uint,
    pitch: usize,
) {
    guarded("video_refresh", (), || {
        state::with_active(|ctx| {
            let format = ctx.state.pixel_format;
            let frame = if data.is_null() {
                VideoFrame::Duplicate
            } else if data as usize == sys::HW_FRAME_BUFFER_VALID as usize {
                VideoFrame::Hardware { width, height }
            } else {
                let row_bytes = width as usize * format.bytes_per_pixel();
                if pitch < row_bytes {
                    warn!("dropping {width}x{height} frame: pitch {pitch} < row {row_bytes}");
                    return;
                }
                let len = required_frame_len(width, height, pitch, format);
                // SAFETY: the core guarantees `height` rows of `pitch` bytes at `data`,
                // and `len` never exceeds that.
                let data = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
                VideoFrame::Software {
                    data,
                    width,
                    height,
                    pitch,
                }
            };

            let bottom_left = ctx.state.bottom_left_origin();
            let outcome = ctx.frontend.video.on_video_refresh(frame, format, bottom_left);
            if let FrameOutcome::Software { resized: true } = outcome {
                let aspect = ctx.state.geometry.target_aspect();
                ctx.frontend.input.update_geometry(width, height, aspect);
            }
        });
    })
}

pub(crate) unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    guarded("audio_sample", (), || {
        state::with_active(|ctx| ctx.frontend.audio.write(&[left, right]));
    })
}

pub(crate) unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    guarded("audio_sample_batch", 0, || {
        let Some(len) = frames.checked_mul(2) else {
            return 0;
        };
        if data.is_null() || len == 0 {
            return 0;
        }
        // SAFETY: the core passes `frames` interleaved stereo frames.
        let samples = unsafe { slice::from_raw_parts(data, len) };
        state::with_active(|ctx| {
            ctx.frontend.audio.write(samples);
            frames
        })
        .unwrap_or(0)
    })
}

pub(crate) unsafe extern "C" fn input_poll() {
    guarded("input_poll", (), || {
        state::with_active(|ctx| ctx.frontend.input.poll());
    })
}

pub(crate) unsafe extern "C" fn input_state(
    port: c_uint,
    device: c_uint,
    index: c_uint,
    id: c_uint,
) -> i16 {
    guarded("input_state", 0, || {
        state::with_active(|ctx| {
            ctx.frontend
                .input
                .state(port, device & abi::DEVICE_MASK, index, id)
        })
        .unwrap_or(0)
    })
}

/// Log interface. Only the format string is forwarded; varargs are not expanded.
pub(crate) unsafe extern "C" fn log_printf(level: c_uint, fmt: *const c_char) {
    guarded("log", (), || {
        if fmt.is_null() {
            return;
        }
        // SAFETY: non-null, NUL-terminated per the log interface contract.
        let msg = unsafe { CStr::from_ptr(fmt) }.to_string_lossy();
        let level = match level {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        };
        log!(target: "core", level, "{}", msg.trim_end());
    })
}

pub(crate) unsafe extern "C" fn get_current_framebuffer() -> usize {
    guarded("get_current_framebuffer", 0, || {
        state::with_active(|ctx| ctx.frontend.video.framebuffer_id() as usize).unwrap_or(0)
    })
}

pub(crate) unsafe extern "C" fn get_proc_address(sym: *const c_char) -> Option<ProcAddressFn> {
    guarded("get_proc_address", None, || {
        if sym.is_null() {
            return None;
        }
        // SAFETY: non-null, NUL-terminated symbol name.
        let name = unsafe { CStr::from_ptr(sym) }.to_str().ok()?;
        let ptr = state::with_active(|ctx| {
            ctx.frontend
                .video
                .backend_mut()
                .map_or(std::ptr::null(), |backend| backend.get_proc_address(name))
        })?;
        if ptr.is_null() {
            return None;
        }
        // SAFETY: a non-null address returned by the GL loader for `name`.
        Some(unsafe { mem::transmute::<*const c_void, ProcAddressFn>(ptr) })
    })
}
