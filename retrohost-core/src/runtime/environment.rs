//! Environment negotiation.
//!
//! One multiplexed call, `environment(cmd, data) -> bool`, through which the core
//! asks for paths, declares its pixel format, requests a GL context, reports
//! geometry changes and so on. `true` means "understood and handled".
//!
//! Notes:
//! - The EXPERIMENTAL flag bit is masked off before dispatch.
//! - Every handled command carries a payload; a null `data` is rejected up front.
//! - Unknown commands return `false` and touch nothing.

use std::ffi::{c_char, c_uint, c_void};
use std::ptr;

use libretro_sys::{self as sys, HwContextType};
use log::{debug, info, warn};

use super::imports;
use crate::abi::{self, HwRenderCallback, LogCallback};
use crate::av::{PixelFormat, ViewportRect};
use crate::runtime::Frontend;
use crate::state::{CallContext, CoreState, HwRenderConfig};

/// Handle one environment call.
///
/// # Safety
/// `data` must be null or point to the payload type documented for `cmd`.
pub(crate) unsafe fn dispatch(ctx: &mut CallContext<'_>, cmd: c_uint, data: *mut c_void) -> bool {
    let cmd = cmd & !sys::ENVIRONMENT_EXPERIMENTAL;
    if data.is_null() {
        debug!("environment({cmd}) with null data");
        return false;
    }

    // SAFETY (all arms): `data` is non-null and, per the ABI, points to the
    // payload type of `cmd`.
    match cmd {
        sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY => {
            unsafe { *data.cast::<*const c_char>() = ctx.state.system_dir.as_ptr() };
            true
        }
        sys::ENVIRONMENT_GET_SAVE_DIRECTORY => {
            unsafe { *data.cast::<*const c_char>() = ctx.state.save_dir.as_ptr() };
            true
        }
        sys::ENVIRONMENT_SET_PIXEL_FORMAT => {
            let raw = unsafe { *data.cast::<c_uint>() };
            match PixelFormat::from_raw(raw) {
                Some(format) => {
                    info!("core pixel format: {format:?}");
                    ctx.state.pixel_format = format;
                    true
                }
                None => {
                    warn!("core requested unknown pixel format {raw}");
                    false
                }
            }
        }
        sys::ENVIRONMENT_GET_LOG_INTERFACE => {
            unsafe { (*data.cast::<LogCallback>()).log = imports::log_printf };
            true
        }
        sys::ENVIRONMENT_GET_VARIABLE => {
            let var = unsafe { &mut *data.cast::<sys::Variable>() };
            var.value = ptr::null();
            true
        }
        sys::ENVIRONMENT_GET_VARIABLE_UPDATE => {
            unsafe { *data.cast::<bool>() = false };
            true
        }
        sys::ENVIRONMENT_GET_CAN_DUPE => {
            unsafe { *data.cast::<bool>() = true };
            true
        }
        sys::ENVIRONMENT_SET_HW_RENDER => {
            let cb = unsafe { &mut *data.cast::<HwRenderCallback>() };
            set_hw_render(ctx, cb)
        }
        sys::ENVIRONMENT_SET_GEOMETRY => {
            let g = unsafe { &*data.cast::<sys::GameGeometry>() };
            set_geometry(ctx, g);
            true
        }
        sys::ENVIRONMENT_GET_INPUT_DEVICE_CAPABILITIES => {
            unsafe { *data.cast::<u64>() = abi::input_device_capabilities() };
            true
        }
        abi::ENVIRONMENT_GET_PREFERRED_HW_RENDER => {
            if !ctx.frontend.video.supports_hw_context() {
                return false;
            }
            unsafe { *data.cast::<c_uint>() = HwContextType::OpenGL as c_uint };
            true
        }
        sys::ENVIRONMENT_SET_INPUT_DESCRIPTORS
        | sys::ENVIRONMENT_SET_VARIABLES
        | abi::ENVIRONMENT_SET_CORE_OPTIONS
        | abi::ENVIRONMENT_SET_CORE_OPTIONS_V2 => {
            debug!("environment({cmd}) accepted and ignored");
            true
        }
        _ => {
            debug!("unsupported environment command {cmd}");
            false
        }
    }
}

fn set_hw_render(ctx: &mut CallContext<'_>, cb: &mut HwRenderCallback) -> bool {
    if !ctx.frontend.video.supports_hw_context() {
        warn!("core requested hardware rendering but the backend has no GL context");
        return false;
    }
    let context_type = match HwContextType::from_uint(cb.context_type) {
        Some(t @ (HwContextType::OpenGL | HwContextType::OpenGLCore)) => t,
        other => {
            warn!("unsupported hardware context {other:?} ({})", cb.context_type);
            return false;
        }
    };

    cb.get_current_framebuffer = Some(imports::get_current_framebuffer);
    cb.get_proc_address = Some(imports::get_proc_address);

    let config = HwRenderConfig {
        context_type,
        version_major: cb.version_major,
        version_minor: cb.version_minor,
        depth: cb.depth,
        stencil: cb.stencil,
        bottom_left_origin: cb.bottom_left_origin,
        context_reset: cb.context_reset,
        context_destroy: cb.context_destroy,
    };
    info!(
        "hardware rendering: {:?} {}.{} depth={} stencil={} bottom_left_origin={}",
        config.context_type,
        config.version_major,
        config.version_minor,
        config.depth,
        config.stencil,
        config.bottom_left_origin
    );
    ctx.state.hw_render = Some(config);
    true
}

fn set_geometry(ctx: &mut CallContext<'_>, g: &sys::GameGeometry) {
    let geometry = &mut ctx.state.geometry;
    geometry.base_width = g.base_width;
    geometry.base_height = g.base_height;
    geometry.aspect_ratio = g.aspect_ratio;
    info!(
        "geometry changed: {}x{} aspect {}",
        g.base_width, g.base_height, g.aspect_ratio
    );

    apply_geometry(ctx.state, ctx.frontend);
    if ctx.frontend.video.target().is_some() {
        match ctx.state.geometry.target_size() {
            Some((width, height)) => {
                let (depth, stencil) = depth_stencil(ctx.state);
                ctx.frontend
                    .video
                    .create_or_resize_target(width, height, depth, stencil);
            }
            None => warn!("geometry has no usable size; keeping the current render target"),
        }
    }
    apply_layout(ctx.state, ctx.frontend);
}

/// Depth/stencil requested by the hardware context, if any.
pub(crate) fn depth_stencil(state: &CoreState) -> (bool, bool) {
    state
        .hw_render
        .map_or((false, false), |hw| (hw.depth, hw.stencil))
}

/// Push the negotiated geometry to input.
pub(crate) fn apply_geometry(state: &CoreState, frontend: &mut Frontend) {
    let g = state.geometry;
    frontend
        .input
        .update_geometry(g.base_width, g.base_height, g.target_aspect());
}

/// Recompute the viewport for the last known window size and push it to input.
pub(crate) fn apply_layout(state: &mut CoreState, frontend: &mut Frontend) -> ViewportRect {
    if let Some((w, h)) = state.window {
        state.viewport = ViewportRect::letterbox(w, h, state.geometry.target_aspect());
        frontend.input.update_viewport(state.viewport);
    }
    state.viewport
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    use crate::av::GameGeometry;
    use crate::av::backend::MemoryBackend;
    use crate::av::video::FramePresenter;

    fn fixture() -> (CoreState, Frontend) {
        let state = CoreState::new(
            CString::new("/abs/system").unwrap(),
            CString::new("/abs/saves").unwrap(),
        );
        let mut frontend = Frontend::headless();
        frontend.video = FramePresenter::with_backend(Box::new(MemoryBackend::new(800, 480)));
        (state, frontend)
    }

    fn env(state: &mut CoreState, frontend: &mut Frontend, cmd: c_uint, data: *mut c_void) -> bool {
        let mut ctx = CallContext { state, frontend };
        unsafe { dispatch(&mut ctx, cmd, data) }
    }

    #[test]
    fn unknown_command_is_rejected_without_side_effects() {
        let (mut state, mut frontend) = fixture();
        let mut payload = [0xAAu8; 64];
        assert!(!env(&mut state, &mut frontend, 9999, payload.as_mut_ptr().cast()));
        assert_eq!(payload, [0xAA; 64]);
        assert_eq!(state.pixel_format, PixelFormat::Rgb1555);
        assert_eq!(state.geometry, GameGeometry::default());
        assert!(state.hw_render.is_none());
    }

    #[test]
    fn null_payload_is_rejected() {
        let (mut state, mut frontend) = fixture();
        assert!(!env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY,
            ptr::null_mut()
        ));
    }

    #[test]
    fn directories_are_reported() {
        let (mut state, mut frontend) = fixture();
        let mut out: *const c_char = ptr::null();
        let data = (&mut out as *mut *const c_char).cast();
        assert!(env(&mut state, &mut frontend, sys::ENVIRONMENT_GET_SAVE_DIRECTORY, data));
        assert_eq!(unsafe { CStr::from_ptr(out) }.to_str().unwrap(), "/abs/saves");
        assert!(env(&mut state, &mut frontend, sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY, data));
        assert_eq!(unsafe { CStr::from_ptr(out) }.to_str().unwrap(), "/abs/system");
    }

    #[test]
    fn pixel_format_accepts_known_values_only() {
        let (mut state, mut frontend) = fixture();
        let mut fmt: c_uint = 2;
        let data = (&mut fmt as *mut c_uint).cast();
        assert!(env(&mut state, &mut frontend, sys::ENVIRONMENT_SET_PIXEL_FORMAT, data));
        assert_eq!(state.pixel_format, PixelFormat::Rgb565);

        fmt = 7;
        assert!(!env(&mut state, &mut frontend, sys::ENVIRONMENT_SET_PIXEL_FORMAT, data));
        assert_eq!(state.pixel_format, PixelFormat::Rgb565);
    }

    #[test]
    fn experimental_bit_is_masked() {
        let (mut state, mut frontend) = fixture();
        let mut dupe = false;
        let cmd = sys::ENVIRONMENT_GET_CAN_DUPE | sys::ENVIRONMENT_EXPERIMENTAL;
        assert!(env(&mut state, &mut frontend, cmd, (&mut dupe as *mut bool).cast()));
        assert!(dupe);
    }

    #[test]
    fn variables_have_no_value_and_never_update() {
        let (mut state, mut frontend) = fixture();
        let key = CString::new("core_option").unwrap();
        let mut var = sys::Variable {
            key: key.as_ptr(),
            value: key.as_ptr(),
        };
        assert!(env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_GET_VARIABLE,
            (&mut var as *mut sys::Variable).cast()
        ));
        assert!(var.value.is_null());

        let mut updated = true;
        assert!(env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_GET_VARIABLE_UPDATE,
            (&mut updated as *mut bool).cast()
        ));
        assert!(!updated);
    }

    #[test]
    fn capabilities_mask_is_written() {
        let (mut state, mut frontend) = fixture();
        let mut caps = 0u64;
        assert!(env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_GET_INPUT_DEVICE_CAPABILITIES,
            (&mut caps as *mut u64).cast()
        ));
        assert_eq!(caps, abi::input_device_capabilities());
    }

    #[test]
    fn hw_render_is_refused_without_gl() {
        let (mut state, mut frontend) = fixture();
        let mut cb = HwRenderCallback {
            context_type: HwContextType::OpenGLCore as c_uint,
            context_reset: None,
            get_current_framebuffer: None,
            get_proc_address: None,
            depth: true,
            stencil: true,
            bottom_left_origin: true,
            version_major: 3,
            version_minor: 3,
            cache_context: false,
            context_destroy: None,
            debug_context: false,
        };
        assert!(!env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_SET_HW_RENDER,
            (&mut cb as *mut HwRenderCallback).cast()
        ));
        assert!(cb.get_current_framebuffer.is_none());
        assert!(state.hw_render.is_none());

        let mut preferred: c_uint = 0;
        assert!(!env(
            &mut state,
            &mut frontend,
            abi::ENVIRONMENT_GET_PREFERRED_HW_RENDER,
            (&mut preferred as *mut c_uint).cast()
        ));
    }

    #[test]
    fn geometry_change_recreates_target_and_relayouts() {
        let (mut state, mut frontend) = fixture();
        state.geometry = GameGeometry {
            base_width: 256,
            base_height: 192,
            max_width: 512,
            max_height: 512,
            aspect_ratio: 2.0,
        };
        state.window = Some((800, 480));
        frontend.video.create_or_resize_target(256, 192, false, false);
        apply_layout(&mut state, &mut frontend);
        assert_eq!(state.viewport, ViewportRect { x: 0, y: 40, w: 800, h: 400 });

        let mut g = sys::GameGeometry {
            base_width: 400,
            base_height: 240,
            max_width: 0,
            max_height: 0,
            aspect_ratio: 1.0,
        };
        assert!(env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_SET_GEOMETRY,
            (&mut g as *mut sys::GameGeometry).cast()
        ));

        let target = frontend.video.target().unwrap();
        assert_eq!((target.width, target.height), (400, 240));
        assert_eq!(state.geometry.max_width, 512);
        assert_eq!(state.viewport, ViewportRect { x: 160, y: 0, w: 480, h: 480 });
    }

    #[test]
    fn zero_base_size_falls_back_to_max_and_keeps_a_target() {
        let (mut state, mut frontend) = fixture();
        state.geometry = GameGeometry {
            base_width: 256,
            base_height: 192,
            max_width: 512,
            max_height: 384,
            aspect_ratio: 0.0,
        };
        frontend.video.create_or_resize_target(256, 192, false, false);

        let mut g = sys::GameGeometry {
            base_width: 0,
            base_height: 0,
            max_width: 0,
            max_height: 0,
            aspect_ratio: 0.0,
        };
        let data = (&mut g as *mut sys::GameGeometry).cast();
        assert!(env(&mut state, &mut frontend, sys::ENVIRONMENT_SET_GEOMETRY, data));
        let target = frontend.video.target().unwrap();
        assert_eq!((target.width, target.height), (512, 384));

        // A later real size still resizes the target.
        g.base_width = 320;
        g.base_height = 240;
        assert!(env(&mut state, &mut frontend, sys::ENVIRONMENT_SET_GEOMETRY, data));
        let target = frontend.video.target().unwrap();
        assert_eq!((target.width, target.height), (320, 240));
    }

    #[test]
    fn unusable_geometry_keeps_the_current_target() {
        let (mut state, mut frontend) = fixture();
        frontend.video.create_or_resize_target(256, 192, false, false);

        let mut g = sys::GameGeometry {
            base_width: 0,
            base_height: 240,
            max_width: 0,
            max_height: 0,
            aspect_ratio: 0.0,
        };
        assert!(env(
            &mut state,
            &mut frontend,
            sys::ENVIRONMENT_SET_GEOMETRY,
            (&mut g as *mut sys::GameGeometry).cast()
        ));
        let target = frontend.video.target().unwrap();
        assert_eq!((target.width, target.height), (256, 192));
    }
}
