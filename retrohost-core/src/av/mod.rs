//! Audio/Video types and helpers for retrohost-core.
//!
//! This module implements the "core pushes, host presents" model.
//!
//! - Video: the core hands the host either a software frame (pointer, size, pitch in
//!   the negotiated pixel format), a hardware frame marker (it already rendered into
//!   the host's framebuffer), or null (duplicate the previous frame). `video` decodes
//!   and uploads, `backend` owns the GPU (or CPU) render targets.
//!
//! - Audio: the core pushes interleaved stereo i16 samples; `audio` applies gain and
//!   forwards them to the selected sink.
//!
//! Notes / limitations (current):
//! - Software frames are always decoded on the CPU into RGBA8 before upload.
//! - The destination surface is fully cleared before each blit, not just the bars.

pub mod audio;
pub mod backend;
pub mod opengl;
pub mod utils;
pub mod video;


use std::ffi::c_uint;

use crate::abi::sys;

/// Errors from decoding a software frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    ZeroSize,
    PitchTooSmall { pitch: usize, row_bytes: usize },
    BufferTooShort { len: usize, required: usize },
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::ZeroSize => write!(f, "frame has zero width or height"),
            FrameError::PitchTooSmall { pitch, row_bytes } => {
                write!(f, "pitch {pitch} is smaller than a row ({row_bytes} bytes)")
            }
            FrameError::BufferTooShort { len, required } => {
                write!(f, "frame buffer holds {len} bytes, {required} required")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Software pixel encodings a core can negotiate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// 0RGB1555, native endian. The ABI default.
    #[default]
    Rgb1555,
    /// XRGB8888, native endian.
    Xrgb8888,
    /// RGB565, native endian.
    Rgb565,
}

impl PixelFormat {
    /// Map the raw `SET_PIXEL_FORMAT` value. Unknown values yield `None`.
    pub fn from_raw(value: c_uint) -> Option<Self> {
        Some(match sys::PixelFormat::from_uint(value)? {
            sys::PixelFormat::ARGB1555 => PixelFormat::Rgb1555,
            sys::PixelFormat::ARGB8888 => PixelFormat::Xrgb8888,
            sys::PixelFormat::RGB565 => PixelFormat::Rgb565,
        })
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb1555 | PixelFormat::Rgb565 => 2,
            PixelFormat::Xrgb8888 => 4,
        }
    }
}

/// Negotiated frame size and aspect.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GameGeometry {
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// `<= 0.0` means "derive from base size".
    pub aspect_ratio: f32,
}

impl GameGeometry {
    /// Aspect used for letterboxing: the declared one if positive, else
    /// `base_width / base_height`, else square.
    pub fn target_aspect(&self) -> f32 {
        if self.aspect_ratio > 0.0 && self.aspect_ratio.is_finite() {
            self.aspect_ratio
        } else if self.base_width > 0 && self.base_height > 0 {
            self.base_width as f32 / self.base_height as f32
        } else {
            1.0
        }
    }

    /// Render target size: the base size, else the max size. `None` when neither
    /// is usable.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        if self.base_width > 0 && self.base_height > 0 {
            Some((self.base_width, self.base_height))
        } else if self.max_width > 0 && self.max_height > 0 {
            Some((self.max_width, self.max_height))
        } else {
            None
        }
    }
}

impl From<&sys::GameGeometry> for GameGeometry {
    fn from(g: &sys::GameGeometry) -> Self {
        Self {
            base_width: g.base_width,
            base_height: g.base_height,
            max_width: g.max_width,
            max_height: g.max_height,
            aspect_ratio: g.aspect_ratio,
        }
    }
}

/// Letterboxed destination rectangle, in host pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl ViewportRect {
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Fit `aspect` inside a `window_w x window_h` surface, centered.
    ///
    /// Wider windows get pillarboxed (full height), taller ones letterboxed
    /// (full width). Sizes and offsets truncate toward zero.
    pub fn letterbox(window_w: u32, window_h: u32, aspect: f32) -> Self {
        if window_w == 0 || window_h == 0 {
            return Self::default();
        }
        let aspect = if aspect > 0.0 && aspect.is_finite() {
            aspect
        } else {
            1.0
        };

        let (ww, wh) = (window_w as f32, window_h as f32);
        let (w, h) = if ww / wh > aspect {
            ((wh * aspect) as i32, window_h as i32)
        } else {
            (window_w as i32, (ww / aspect) as i32)
        };
        let w = w.clamp(1, window_w as i32);
        let h = h.clamp(1, window_h as i32);

        Self {
            x: (window_w as i32 - w) / 2,
            y: (window_h as i32 - h) / 2,
            w,
            h,
        }
    }
}

/// Bytes a software frame must provide: full rows for all but the last line,
/// which only needs its visible pixels. Saturating.
pub fn required_frame_len(width: u32, height: u32, pitch: usize, format: PixelFormat) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    let row = (width as usize).saturating_mul(format.bytes_per_pixel());
    pitch
        .saturating_mul(height as usize - 1)
        .saturating_add(row)
}

/// Validate a software frame's dimensions against its buffer.
pub fn validate_frame(
    width: u32,
    height: u32,
    pitch: usize,
    len: usize,
    format: PixelFormat,
) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::ZeroSize);
    }
    let row_bytes = (width as usize).saturating_mul(format.bytes_per_pixel());
    if pitch < row_bytes {
        return Err(FrameError::PitchTooSmall { pitch, row_bytes });
    }
    let required = required_frame_len(width, height, pitch, format);
    if len < required {
        return Err(FrameError::BufferTooShort { len, required });
    }
    Ok(())
}
