//! OpenGL render backend.
//!
//! Responsibilities:
//! - Allocate render targets as framebuffer objects: an RGBA8 color texture plus an
//!   optional depth (24) or packed depth/stencil (24/8) renderbuffer.
//! - Upload decoded software frames with `TexSubImage2D`.
//! - Blit the target into the shell's default framebuffer with linear filtering.
//!
//! Notes / constraints:
//! - Every call assumes the shell's context is current. `GameSession` brackets load,
//!   run and unload with `make_current` / `done_current`.
//! - Function pointers are loaded once, in `GlBackend::new`, from the shell's
//!   `get_proc_address`. The same resolver is handed to hardware-rendered cores.

use std::ffi::c_void;

use log::{debug, warn};

use super::backend::{BlitRequest, DepthAttachment, RenderBackend, RenderTarget};
use crate::error::{HostError, Result};

/// The window-system side of an OpenGL context, provided by the GUI shell.
pub trait GraphicsContext {
    fn make_current(&mut self);

    fn done_current(&mut self);

    fn get_proc_address(&self, name: &str) -> *const c_void;

    /// Framebuffer object the window presents (often 0, not always).
    fn default_framebuffer(&self) -> u32;

    /// Destination size in pixels.
    fn surface_size(&self) -> (u32, u32);
}

pub struct GlBackend {
    context: Box<dyn GraphicsContext>,
}

impl GlBackend {
    /// Load GL entry points through `context`. The context is made current for the
    /// duration of the call.
    pub fn new(mut context: Box<dyn GraphicsContext>) -> Self {
        context.make_current();
        gl::load_with(|name| context.get_proc_address(name));
        context.done_current();
        Self { context }
    }

    fn release(&self, target: &RenderTarget) {
        // SAFETY: ids come from `create_target` on this context.
        unsafe {
            gl::DeleteFramebuffers(1, &target.framebuffer);
            gl::DeleteTextures(1, &target.color);
            if let Some(depth) = target.depth {
                gl::DeleteRenderbuffers(1, &depth);
            }
        }
    }
}

impl RenderBackend for GlBackend {
    fn supports_hw_context(&self) -> bool {
        true
    }

    fn make_current(&mut self) {
        self.context.make_current();
    }

    fn done_current(&mut self) {
        self.context.done_current();
    }

    fn get_proc_address(&self, name: &str) -> *const c_void {
        self.context.get_proc_address(name)
    }

    fn create_target(
        &mut self,
        width: u32,
        height: u32,
        attachment: DepthAttachment,
    ) -> Result<RenderTarget> {
        let (w, h) = (width as i32, height as i32);
        let mut target = RenderTarget {
            framebuffer: 0,
            color: 0,
            depth: None,
            attachment,
            width,
            height,
        };

        // SAFETY: GL calls on the current context with ids we own.
        let status = unsafe {
            gl::GenFramebuffers(1, &mut target.framebuffer);
            gl::BindFramebuffer(gl::FRAMEBUFFER, target.framebuffer);

            gl::GenTextures(1, &mut target.color);
            gl::BindTexture(gl::TEXTURE_2D, target.color);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as i32,
                w,
                h,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
            gl::FramebufferTexture2D(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                gl::TEXTURE_2D,
                target.color,
                0,
            );

            let depth_format = match attachment {
                DepthAttachment::None => None,
                DepthAttachment::Depth24 => Some((gl::DEPTH_COMPONENT24, gl::DEPTH_ATTACHMENT)),
                DepthAttachment::Depth24Stencil8 => {
                    Some((gl::DEPTH24_STENCIL8, gl::DEPTH_STENCIL_ATTACHMENT))
                }
            };
            if let Some((format, point)) = depth_format {
                let mut rb = 0;
                gl::GenRenderbuffers(1, &mut rb);
                gl::BindRenderbuffer(gl::RENDERBUFFER, rb);
                gl::RenderbufferStorage(gl::RENDERBUFFER, format, w, h);
                gl::FramebufferRenderbuffer(gl::FRAMEBUFFER, point, gl::RENDERBUFFER, rb);
                gl::BindRenderbuffer(gl::RENDERBUFFER, 0);
                target.depth = Some(rb);
            }

            let status = gl::CheckFramebufferStatus(gl::FRAMEBUFFER);
            gl::BindTexture(gl::TEXTURE_2D, 0);
            gl::BindFramebuffer(gl::FRAMEBUFFER, self.context.default_framebuffer());
            status
        };

        if status != gl::FRAMEBUFFER_COMPLETE {
            self.release(&target);
            return Err(HostError::FramebufferIncomplete {
                status,
                width,
                height,
            });
        }

        // SAFETY: target is complete and bound nowhere.
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, target.framebuffer);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
            gl::BindFramebuffer(gl::FRAMEBUFFER, self.context.default_framebuffer());
        }

        debug!(
            "GL target fbo={} tex={} {:?} at {width}x{height}",
            target.framebuffer, target.color, attachment
        );
        Ok(target)
    }

    fn destroy_target(&mut self, target: &RenderTarget) {
        self.release(target);
    }

    fn upload(&mut self, target: &RenderTarget, width: u32, height: u32, rgba: &[u8]) {
        let needed = width as usize * height as usize * 4;
        if rgba.len() < needed {
            warn!("upload skipped: {} bytes for {width}x{height}", rgba.len());
            return;
        }
        // SAFETY: `rgba` holds `width * height` tightly packed RGBA8 pixels.
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, target.color);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                0,
                0,
                width.min(target.width) as i32,
                height.min(target.height) as i32,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                rgba.as_ptr().cast(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn present(&mut self, target: &RenderTarget, blit: &BlitRequest) {
        let dest = self.context.default_framebuffer();
        let (sw, sh) = (blit.src_width as i32, blit.src_height as i32);
        let (y0, y1) = if blit.flip { (sh, 0) } else { (0, sh) };
        let vp = blit.viewport;

        // SAFETY: GL calls on the current context.
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, target.framebuffer);
            gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, dest);
            gl::Disable(gl::SCISSOR_TEST);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
            gl::BlitFramebuffer(
                0,
                y0,
                sw,
                y1,
                vp.x,
                vp.y,
                vp.x + vp.w,
                vp.y + vp.h,
                gl::COLOR_BUFFER_BIT,
                gl::LINEAR,
            );
            gl::BindFramebuffer(gl::FRAMEBUFFER, dest);
        }
    }

    fn reset_state(&mut self) {
        let (w, h) = self.context.surface_size();
        // SAFETY: GL calls on the current context.
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, self.context.default_framebuffer());
            gl::BindTexture(gl::TEXTURE_2D, 0);
            gl::BindRenderbuffer(gl::RENDERBUFFER, 0);
            gl::UseProgram(0);
            gl::Disable(gl::DEPTH_TEST);
            gl::Disable(gl::STENCIL_TEST);
            gl::Disable(gl::SCISSOR_TEST);
            gl::Disable(gl::BLEND);
            gl::Disable(gl::CULL_FACE);
            gl::Viewport(0, 0, w as i32, h as i32);
        }
    }
}
