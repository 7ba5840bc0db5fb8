//! Render backends.
//!
//! A backend owns the surfaces the presenter draws with: offscreen render targets
//! (color plus optional depth/stencil) and the destination the window shows.
//!
//! - `GlBackend` (`av::opengl`): OpenGL framebuffer objects; can host a core's
//!   hardware context.
//! - `MemoryBackend`: CPU-side targets and canvas. Used headless and in tests;
//!   it cannot host a hardware context.
//!
//! Row order follows GL conventions everywhere: row 0 of a target or canvas is the
//! bottom row. A software frame uploaded as-is therefore lands upside down and the
//! presenter flips it on blit.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use log::debug;

use super::ViewportRect;
use crate::error::{HostError, Result};

/// Depth/stencil attachment of a render target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DepthAttachment {
    None,
    Depth24,
    /// Packed 24-bit depth + 8-bit stencil.
    Depth24Stencil8,
}

impl DepthAttachment {
    /// Stencil without depth is not a valid request and is ignored.
    pub fn for_request(depth: bool, stencil: bool) -> Self {
        match (depth, stencil) {
            (true, true) => DepthAttachment::Depth24Stencil8,
            (true, false) => DepthAttachment::Depth24,
            (false, _) => DepthAttachment::None,
        }
    }
}

/// An allocated offscreen surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: u32,
    pub color: u32,
    pub depth: Option<u32>,
    pub attachment: DepthAttachment,
    pub width: u32,
    pub height: u32,
}

/// Parameters of one blit from a target to the destination.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlitRequest {
    /// Source rectangle size, anchored at the target's origin.
    pub src_width: u32,
    pub src_height: u32,
    pub viewport: ViewportRect,
    /// Mirror the source vertically.
    pub flip: bool,
}

pub trait RenderBackend {
    /// Whether a core may render into our targets with its own GL context.
    fn supports_hw_context(&self) -> bool;

    fn make_current(&mut self) {}

    fn done_current(&mut self) {}

    /// Resolve a GL symbol for the core. Null when unknown.
    fn get_proc_address(&self, _name: &str) -> *const c_void {
        std::ptr::null()
    }

    /// Allocate a target. Returns `FramebufferIncomplete` (after releasing anything
    /// it allocated) when the result is unusable.
    fn create_target(
        &mut self,
        width: u32,
        height: u32,
        attachment: DepthAttachment,
    ) -> Result<RenderTarget>;

    fn destroy_target(&mut self, target: &RenderTarget);

    /// Replace the top-left `width x height` region with tightly packed RGBA8 rows.
    fn upload(&mut self, target: &RenderTarget, width: u32, height: u32, rgba: &[u8]);

    /// Clear the destination to opaque black, then blit.
    fn present(&mut self, target: &RenderTarget, blit: &BlitRequest);

    /// Restore default pipeline state after a core released its context.
    fn reset_state(&mut self) {}
}

/// CPU destination surface of a `MemoryBackend`.
#[derive(Clone, Debug, Default)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// RGBA8, bottom row first.
    pub pixels: Vec<u8>,
    pub presented_frames: u64,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            presented_frames: 0,
        }
    }

    /// Pixel at `(x, y)` with `y` counted from the top.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = (self.height - 1 - y) as usize;
        let i = (row * self.width as usize + x as usize) * 4;
        self.pixels.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// RGBA8 rows, top row first (image order).
    pub fn to_top_down(&self) -> Vec<u8> {
        let stride = self.width as usize * 4;
        if stride == 0 {
            return Vec::new();
        }
        self.pixels
            .chunks_exact(stride)
            .rev()
            .flatten()
            .copied()
            .collect()
    }
}

#[derive(Debug)]
struct MemoryTarget {
    framebuffer: u32,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Backend that keeps every surface in system memory.
#[derive(Debug)]
pub struct MemoryBackend {
    canvas: Arc<Mutex<Canvas>>,
    targets: Vec<MemoryTarget>,
    next_id: u32,
    reject_depth: bool,
    created: u32,
}

impl MemoryBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Arc::new(Mutex::new(Canvas::new(width, height))),
            targets: Vec::new(),
            next_id: 1,
            reject_depth: false,
            created: 0,
        }
    }

    /// Report targets with a depth attachment as incomplete, like a driver without
    /// packed depth/stencil support.
    pub fn reject_depth_attachments(mut self, reject: bool) -> Self {
        self.reject_depth = reject;
        self
    }

    /// Handle to the destination surface.
    pub fn canvas(&self) -> Arc<Mutex<Canvas>> {
        Arc::clone(&self.canvas)
    }

    /// Number of targets created so far.
    pub fn targets_created(&self) -> u32 {
        self.created
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    fn target_mut(&mut self, framebuffer: u32) -> Option<&mut MemoryTarget> {
        self.targets.iter_mut().find(|t| t.framebuffer == framebuffer)
    }
}

impl RenderBackend for MemoryBackend {
    fn supports_hw_context(&self) -> bool {
        false
    }

    fn create_target(
        &mut self,
        width: u32,
        height: u32,
        attachment: DepthAttachment,
    ) -> Result<RenderTarget> {
        if width == 0 || height == 0 || (self.reject_depth && attachment != DepthAttachment::None)
        {
            return Err(HostError::FramebufferIncomplete {
                status: 0,
                width,
                height,
            });
        }
        let framebuffer = self.next_id;
        self.next_id += 1;
        self.created += 1;
        self.targets.push(MemoryTarget {
            framebuffer,
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        });
        debug!("memory target {framebuffer} created at {width}x{height}");

        Ok(RenderTarget {
            framebuffer,
            color: framebuffer,
            depth: (attachment != DepthAttachment::None).then_some(framebuffer),
            attachment,
            width,
            height,
        })
    }

    fn destroy_target(&mut self, target: &RenderTarget) {
        self.targets.retain(|t| t.framebuffer != target.framebuffer);
    }

    fn upload(&mut self, target: &RenderTarget, width: u32, height: u32, rgba: &[u8]) {
        let Some(t) = self.target_mut(target.framebuffer) else {
            return;
        };
        let w = width.min(t.width) as usize;
        let h = height.min(t.height) as usize;
        let src_stride = width as usize * 4;
        let dst_stride = t.width as usize * 4;
        for y in 0..h {
            let src = &rgba[y * src_stride..y * src_stride + w * 4];
            t.pixels[y * dst_stride..y * dst_stride + w * 4].copy_from_slice(src);
        }
    }

    fn present(&mut self, target: &RenderTarget, blit: &BlitRequest) {
        let Some(src) = self.targets.iter().find(|t| t.framebuffer == target.framebuffer) else {
            return;
        };
        let Ok(mut canvas) = self.canvas.lock() else {
            return;
        };

        for px in canvas.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 0xff]);
        }
        canvas.presented_frames += 1;

        let vp = blit.viewport;
        let sw = blit.src_width.min(src.width) as i64;
        let sh = blit.src_height.min(src.height) as i64;
        if vp.is_empty() || sw == 0 || sh == 0 {
            return;
        }

        let (cw, ch) = (canvas.width as i64, canvas.height as i64);
        // Nearest-neighbour scaling; sampling at pixel centers.
        for dy in 0..vp.h as i64 {
            let ty = vp.y as i64 + dy;
            if !(0..ch).contains(&ty) {
                continue;
            }
            let mut sy = (dy * 2 + 1) * sh / (vp.h as i64 * 2);
            if blit.flip {
                sy = sh - 1 - sy;
            }
            for dx in 0..vp.w as i64 {
                let tx = vp.x as i64 + dx;
                if !(0..cw).contains(&tx) {
                    continue;
                }
                let sx = (dx * 2 + 1) * sw / (vp.w as i64 * 2);
                let si = ((sy * src.width as i64 + sx) * 4) as usize;
                let di = ((ty * cw + tx) * 4) as usize;
                canvas.pixels[di..di + 4].copy_from_slice(&src.pixels[si..si + 4]);
            }
        }
    }
}
