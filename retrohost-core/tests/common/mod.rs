//! In-process fake core used by the integration tests.
//!
//! The fake keeps its state in a thread local (tests run on separate threads) and
//! exercises the host the way a real core does: it negotiates during init and
//! load, renders a solid-color frame per `retro_run` (in software, or into the
//! host's framebuffer when asked for hardware rendering), emits audio and reads
//! input.
#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_uint, c_void};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex};

use libretro_sys as sys;
use retrohost_core::error::Result;
use retrohost_core::abi::{
    AudioSampleBatchFn, AudioSampleFn, CoreApi, EnvironmentFn, GameInfo,
    HwGetCurrentFramebufferFn, HwRenderCallback, InputPollFn, InputStateFn, SystemAvInfo,
    SystemInfo, VideoRefreshFn,
};
use retrohost_core::av::backend::{
    BlitRequest, DepthAttachment, MemoryBackend, RenderBackend, RenderTarget,
};
use retrohost_core::loader::CoreLibrary;

/// Hardware rendering request made during `retro_load_game`.
#[derive(Clone, Copy, Debug)]
pub struct FakeHw {
    pub bottom_left_origin: bool,
    pub depth: bool,
    pub stencil: bool,
}

/// `MemoryBackend` that claims it can host a GL context. The fake core paints
/// its "hardware" frames straight into the shared backend.
#[derive(Clone, Debug)]
pub struct HwMemoryBackend {
    pub inner: Arc<Mutex<MemoryBackend>>,
}

impl HwMemoryBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryBackend::new(width, height))),
        }
    }
}

impl RenderBackend for HwMemoryBackend {
    fn supports_hw_context(&self) -> bool {
        true
    }

    fn create_target(
        &mut self,
        width: u32,
        height: u32,
        attachment: DepthAttachment,
    ) -> Result<RenderTarget> {
        self.inner
            .lock()
            .unwrap()
            .create_target(width, height, attachment)
    }

    fn destroy_target(&mut self, target: &RenderTarget) {
        self.inner.lock().unwrap().destroy_target(target);
    }

    fn upload(&mut self, target: &RenderTarget, width: u32, height: u32, rgba: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .upload(target, width, height, rgba);
    }

    fn present(&mut self, target: &RenderTarget, blit: &BlitRequest) {
        self.inner.lock().unwrap().present(target, blit);
    }
}

#[derive(Clone, Debug)]
pub struct FakeConfig {
    /// Raw pixel format requested during `retro_load_game`.
    pub pixel_format: Option<c_uint>,
    pub base: (u32, u32),
    pub max: (u32, u32),
    pub aspect: f32,
    pub sample_rate: f64,
    pub save_size: usize,
    /// `(frame, width, height)`: on that frame, announce a new geometry and render at it.
    pub resize_at: Option<(u64, u32, u32)>,
    /// Extra bytes at the end of every row.
    pub row_padding: usize,
    /// Stereo frames emitted per `retro_run`, all `(1000, -1000)`.
    pub audio_frames: usize,
    pub reject_load: bool,
    pub need_fullpath: bool,
    /// RGB color of the rendered frame.
    pub color: (u8, u8, u8),
    pub hw_render: Option<FakeHw>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            pixel_format: Some(2),
            base: (256, 192),
            max: (512, 512),
            aspect: 0.0,
            sample_rate: 32_768.0,
            save_size: 8,
            resize_at: None,
            row_padding: 0,
            audio_frames: 4,
            reject_load: false,
            need_fullpath: false,
            color: (255, 0, 0),
            hw_render: None,
        }
    }
}

/// One `retro_run`'s input reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputReads {
    pub pointer_pressed: i16,
    pub pointer_x: i16,
    pub pointer_y: i16,
    pub joypad_b: i16,
}

#[derive(Default)]
pub struct FakeState {
    pub config: FakeConfig,
    environment: Option<EnvironmentFn>,
    video: Option<VideoRefreshFn>,
    audio_sample: Option<AudioSampleFn>,
    audio_batch: Option<AudioSampleBatchFn>,
    poll: Option<InputPollFn>,
    input: Option<InputStateFn>,

    pub calls: Vec<&'static str>,
    pub save: Vec<u8>,
    pub frame: u64,
    pub size: (u32, u32),
    pub reads: Vec<InputReads>,
    pub unknown_env_result: Option<bool>,
    pub system_dir: Option<String>,
    pub save_dir: Option<String>,
    pub game_path: Option<String>,
    pub game_size: usize,
    pub port_devices: Vec<(c_uint, c_uint)>,
    pub batch_consumed: Vec<usize>,

    get_framebuffer: Option<HwGetCurrentFramebufferFn>,
    /// Backend the "hardware" frames are painted into.
    pub hw_surface: Option<Arc<Mutex<MemoryBackend>>>,
    pub preferred_hw: Option<c_uint>,
    pub hw_accepted: Option<bool>,
    /// Framebuffer id seen from inside `context_reset`.
    pub reset_framebuffer: Option<usize>,
    pub run_framebuffers: Vec<usize>,
}

thread_local! {
    static FAKE: RefCell<FakeState> = RefCell::new(FakeState::default());
}

/// Reset the fake for this thread and return its entry point table.
pub fn install(config: FakeConfig) -> CoreLibrary {
    FAKE.with(|f| {
        *f.borrow_mut() = FakeState {
            config,
            ..FakeState::default()
        }
    });
    CoreLibrary::from_api(api())
}

/// Inspect or mutate the fake's state.
pub fn with<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    FAKE.with(|s| f(&mut s.borrow_mut()))
}

pub fn api() -> CoreApi {
    CoreApi {
        set_environment,
        set_video_refresh,
        set_audio_sample,
        set_audio_sample_batch,
        set_input_poll,
        set_input_state,
        init,
        deinit,
        get_system_info,
        get_system_av_info,
        set_controller_port_device,
        run,
        load_game,
        unload_game,
        get_memory_data,
        get_memory_size,
        api_version: Some(api_version),
        reset: Some(reset),
    }
}

fn env(cmd: c_uint, data: *mut c_void) -> bool {
    let cb = with(|s| s.environment).expect("environment callback installed");
    unsafe { cb(cmd, data) }
}

fn env_dir(cmd: c_uint) -> Option<String> {
    let mut out: *const c_char = ptr::null();
    if !env(cmd, (&mut out as *mut *const c_char).cast()) || out.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned())
}

unsafe extern "C" fn set_environment(cb: EnvironmentFn) {
    with(|s| s.environment = Some(cb));
}

unsafe extern "C" fn set_video_refresh(cb: VideoRefreshFn) {
    with(|s| s.video = Some(cb));
}

unsafe extern "C" fn set_audio_sample(cb: AudioSampleFn) {
    with(|s| s.audio_sample = Some(cb));
}

unsafe extern "C" fn set_audio_sample_batch(cb: AudioSampleBatchFn) {
    with(|s| s.audio_batch = Some(cb));
}

unsafe extern "C" fn set_input_poll(cb: InputPollFn) {
    with(|s| s.poll = Some(cb));
}

unsafe extern "C" fn set_input_state(cb: InputStateFn) {
    with(|s| s.input = Some(cb));
}

unsafe extern "C" fn api_version() -> c_uint {
    sys::API_VERSION
}

unsafe extern "C" fn init() {
    with(|s| s.calls.push("init"));
    let mut payload = [0u8; 16];
    let unknown = env(9999, payload.as_mut_ptr().cast());
    let system_dir = env_dir(sys::ENVIRONMENT_GET_SYSTEM_DIRECTORY);
    with(|s| {
        s.unknown_env_result = Some(unknown);
        s.system_dir = system_dir;
    });
}

unsafe extern "C" fn deinit() {
    with(|s| s.calls.push("deinit"));
}

unsafe extern "C" fn get_system_info(info: *mut SystemInfo) {
    let need_fullpath = with(|s| s.config.need_fullpath);
    let info = unsafe { &mut *info };
    info.library_name = c"Fake Core".as_ptr();
    info.library_version = c"1.0".as_ptr();
    info.valid_extensions = c"gba|fake".as_ptr();
    info.need_fullpath = need_fullpath;
    info.block_extract = false;
}

unsafe extern "C" fn get_system_av_info(info: *mut SystemAvInfo) {
    let config = with(|s| s.config.clone());
    let info = unsafe { &mut *info };
    info.geometry = sys::GameGeometry {
        base_width: config.base.0,
        base_height: config.base.1,
        max_width: config.max.0,
        max_height: config.max.1,
        aspect_ratio: config.aspect,
    };
    info.timing = sys::SystemTiming {
        fps: 60.0,
        sample_rate: config.sample_rate,
    };
}

unsafe extern "C" fn set_controller_port_device(port: c_uint, device: c_uint) {
    with(|s| s.port_devices.push((port, device)));
}

unsafe extern "C" fn load_game(game: *const GameInfo) -> bool {
    with(|s| s.calls.push("load_game"));
    let game = unsafe { &*game };
    let path = (!game.path.is_null())
        .then(|| unsafe { CStr::from_ptr(game.path) }.to_string_lossy().into_owned());
    let config = with(|s| {
        s.game_path = path;
        s.game_size = game.size;
        s.config.clone()
    });
    if config.reject_load {
        return false;
    }

    if let Some(mut format) = config.pixel_format {
        env(
            sys::ENVIRONMENT_SET_PIXEL_FORMAT,
            (&mut format as *mut c_uint).cast(),
        );
    }
    if let Some(hw) = config.hw_render {
        request_hw_render(hw);
    }
    let save_dir = env_dir(sys::ENVIRONMENT_GET_SAVE_DIRECTORY);
    with(|s| {
        s.save_dir = save_dir;
        s.save = vec![0; config.save_size];
        s.size = config.base;
        s.frame = 0;
    });
    true
}

fn request_hw_render(hw: FakeHw) {
    let mut preferred: c_uint = 0;
    let preferred = env(
        retrohost_core::abi::ENVIRONMENT_GET_PREFERRED_HW_RENDER,
        (&mut preferred as *mut c_uint).cast(),
    )
    .then_some(preferred);

    let mut cb = HwRenderCallback {
        context_type: sys::HwContextType::OpenGL as c_uint,
        context_reset: Some(context_reset),
        get_current_framebuffer: None,
        get_proc_address: None,
        depth: hw.depth,
        stencil: hw.stencil,
        bottom_left_origin: hw.bottom_left_origin,
        version_major: 3,
        version_minor: 3,
        cache_context: false,
        context_destroy: Some(context_destroy),
        debug_context: false,
    };
    let accepted = env(
        sys::ENVIRONMENT_SET_HW_RENDER,
        (&mut cb as *mut HwRenderCallback).cast(),
    );
    with(|s| {
        s.preferred_hw = preferred;
        s.hw_accepted = Some(accepted);
        s.get_framebuffer = cb.get_current_framebuffer;
    });
}

fn current_framebuffer() -> usize {
    let get = with(|s| s.get_framebuffer).expect("get_current_framebuffer handed out");
    unsafe { get() }
}

unsafe extern "C" fn context_reset() {
    with(|s| s.calls.push("context_reset"));
    let fb = current_framebuffer();
    with(|s| s.reset_framebuffer = Some(fb));
}

unsafe extern "C" fn context_destroy() {
    with(|s| s.calls.push("context_destroy"));
}

/// Paint the bound framebuffer: row 0 (the bottom row in GL order) blue, the
/// rest in the configured color.
fn draw_hw_frame(framebuffer: usize, (w, h): (u32, u32), (r, g, b): (u8, u8, u8)) {
    let Some(surface) = with(|s| s.hw_surface.clone()) else {
        return;
    };
    let mut rgba = Vec::with_capacity(w as usize * h as usize * 4);
    for row in 0..h {
        let px = if row == 0 { [0, 0, 255, 255] } else { [r, g, b, 255] };
        for _ in 0..w {
            rgba.extend_from_slice(&px);
        }
    }
    let target = RenderTarget {
        framebuffer: framebuffer as u32,
        color: framebuffer as u32,
        depth: None,
        attachment: DepthAttachment::None,
        width: w,
        height: h,
    };
    surface.lock().unwrap().upload(&target, w, h, &rgba);
}

unsafe extern "C" fn unload_game() {
    with(|s| s.calls.push("unload_game"));
}

unsafe extern "C" fn reset() {
    with(|s| {
        s.calls.push("reset");
        s.frame = 0;
    });
}

unsafe extern "C" fn get_memory_data(id: c_uint) -> *mut c_void {
    with(|s| {
        if id == sys::MEMORY_SAVE_RAM && !s.save.is_empty() {
            s.save.as_mut_ptr().cast()
        } else {
            ptr::null_mut()
        }
    })
}

unsafe extern "C" fn get_memory_size(id: c_uint) -> usize {
    with(|s| if id == sys::MEMORY_SAVE_RAM { s.save.len() } else { 0 })
}

fn encode(format: c_uint, (r, g, b): (u8, u8, u8)) -> Vec<u8> {
    match format {
        1 => u32::from_le_bytes([b, g, r, 0]).to_le_bytes().to_vec(),
        2 => {
            let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
            v.to_le_bytes().to_vec()
        }
        _ => {
            let v = ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3);
            v.to_le_bytes().to_vec()
        }
    }
}

unsafe extern "C" fn run() {
    let (config, frame) = with(|s| {
        s.calls.push("run");
        s.frame += 1;
        (s.config.clone(), s.frame)
    });

    if let Some((_, w, h)) = config.resize_at.filter(|&(at, _, _)| at == frame) {
        let mut geometry = sys::GameGeometry {
            base_width: w,
            base_height: h,
            max_width: 0,
            max_height: 0,
            aspect_ratio: 0.0,
        };
        env(
            sys::ENVIRONMENT_SET_GEOMETRY,
            (&mut geometry as *mut sys::GameGeometry).cast(),
        );
        with(|s| s.size = (w, h));
    }

    let (poll, input) = with(|s| (s.poll, s.input));
    if let (Some(poll), Some(input)) = (poll, input) {
        unsafe { poll() };
        let reads = InputReads {
            pointer_pressed: unsafe {
                input(0, sys::DEVICE_POINTER, 0, sys::DEVICE_ID_POINTER_PRESSED)
            },
            pointer_x: unsafe { input(0, sys::DEVICE_POINTER, 0, sys::DEVICE_ID_POINTER_X) },
            pointer_y: unsafe { input(0, sys::DEVICE_POINTER, 0, sys::DEVICE_ID_POINTER_Y) },
            joypad_b: unsafe { input(0, sys::DEVICE_JOYPAD, 0, sys::DEVICE_ID_JOYPAD_B) },
        };
        with(|s| s.reads.push(reads));
    }

    let (video, size) = with(|s| (s.video, s.size));
    if let (Some(video), Some(_)) = (video, config.hw_render) {
        let fb = current_framebuffer();
        with(|s| s.run_framebuffers.push(fb));
        draw_hw_frame(fb, size, config.color);
        unsafe { video(sys::HW_FRAME_BUFFER_VALID, size.0, size.1, 0) };
    } else if let Some(video) = video {
        let format = config.pixel_format.unwrap_or(0);
        let pixel = encode(format, config.color);
        let (w, h) = size;
        let pitch = w as usize * pixel.len() + config.row_padding;
        let mut buffer = vec![0u8; pitch * h as usize];
        for row in buffer.chunks_mut(pitch) {
            for px in row[..w as usize * pixel.len()].chunks_mut(pixel.len()) {
                px.copy_from_slice(&pixel);
            }
        }
        unsafe { video(buffer.as_ptr().cast(), w, h, pitch) };
    }

    let batch = with(|s| s.audio_batch).filter(|_| config.audio_frames > 0);
    if let Some(batch) = batch {
        let samples: Vec<i16> = (0..config.audio_frames).flat_map(|_| [1000, -1000]).collect();
        let consumed = unsafe { batch(samples.as_ptr(), config.audio_frames) };
        with(|s| s.batch_consumed.push(consumed));
    }
}

/// Write a ROM file named `name` into `dir`.
pub fn write_rom(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write rom");
    path
}
