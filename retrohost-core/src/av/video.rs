//! Frame presentation.
//!
//! `FramePresenter` owns the render target and remembers enough about the last
//! frame (size, orientation) to present it again on a duplicate.
//!
//! Orientation: software frames arrive top row first and are uploaded as-is, so
//! they are always flipped on blit. Hardware frames follow the GL convention only
//! if the core declared `bottom_left_origin`; otherwise they are flipped too.

use log::{debug, warn};

use super::backend::{BlitRequest, DepthAttachment, RenderBackend, RenderTarget};
use super::utils::decode_to_rgba;
use super::{PixelFormat, ViewportRect};

/// One video refresh as delivered by the core.
#[derive(Debug, Clone, Copy)]
pub enum VideoFrame<'a> {
    /// Null data: present the previous frame again.
    Duplicate,
    /// The core rendered into the current target's framebuffer.
    Hardware { width: u32, height: u32 },
    /// CPU pixels in the negotiated format. Rows are `pitch` bytes apart.
    Software {
        data: &'a [u8],
        width: u32,
        height: u32,
        pitch: usize,
    },
}

/// What `on_video_refresh` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Skipped,
    Duplicate,
    Hardware,
    /// `resized` is set when the target had to be recreated for this frame.
    Software { resized: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LastFrame {
    width: u32,
    height: u32,
    flip: bool,
}

pub struct FramePresenter {
    backend: Option<Box<dyn RenderBackend>>,
    target: Option<RenderTarget>,
    last: Option<LastFrame>,
    /// Depth/stencil requested by the hardware context, reused on resize.
    attachment: DepthAttachment,
    rgba: Vec<u8>,
}

impl Default for FramePresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePresenter {
    /// A presenter without a backend. Everything is a no-op until `attach`.
    pub fn new() -> Self {
        Self {
            backend: None,
            target: None,
            last: None,
            attachment: DepthAttachment::None,
            rgba: Vec::new(),
        }
    }

    pub fn with_backend(backend: Box<dyn RenderBackend>) -> Self {
        let mut presenter = Self::new();
        presenter.attach(backend);
        presenter
    }

    /// Attach (or replace) the render backend. Any existing target is dropped first.
    pub fn attach(&mut self, backend: Box<dyn RenderBackend>) {
        self.destroy_target();
        self.backend = Some(backend);
    }

    pub fn backend_mut(&mut self) -> Option<&mut (dyn RenderBackend + 'static)> {
        self.backend.as_deref_mut()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn supports_hw_context(&self) -> bool {
        self.backend
            .as_ref()
            .is_some_and(|b| b.supports_hw_context())
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Framebuffer a hardware core should draw into (0 without a target).
    pub fn framebuffer_id(&self) -> u32 {
        self.target.as_ref().map_or(0, |t| t.framebuffer)
    }

    /// Size of the last presented frame.
    pub fn last_frame_size(&self) -> Option<(u32, u32)> {
        self.last.map(|l| (l.width, l.height))
    }

    /// (Re)create the target at `width x height`.
    ///
    /// Stencil without depth is ignored. An incomplete target is retried without
    /// its depth attachment; if that fails as well the presenter continues with no
    /// target (frames are dropped until the next successful resize).
    pub fn create_or_resize_target(&mut self, width: u32, height: u32, depth: bool, stencil: bool) {
        self.attachment = DepthAttachment::for_request(depth, stencil);
        self.recreate(width, height);
    }

    fn recreate(&mut self, width: u32, height: u32) {
        self.destroy_target();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if width == 0 || height == 0 {
            return;
        }

        let first = backend.create_target(width, height, self.attachment);
        let result = match first {
            Err(e) if self.attachment != DepthAttachment::None => {
                warn!("{e}; retrying without depth/stencil");
                backend.create_target(width, height, DepthAttachment::None)
            }
            other => other,
        };

        match result {
            Ok(target) => self.target = Some(target),
            Err(e) => warn!("{e}; continuing without a render target"),
        }
    }

    pub fn destroy_target(&mut self) {
        if let (Some(target), Some(backend)) = (self.target.take(), self.backend.as_mut()) {
            backend.destroy_target(&target);
        }
    }

    /// Forget the last frame (e.g. after unload) so nothing stale is re-presented.
    pub fn clear_frame(&mut self) {
        self.last = None;
    }

    /// Handle one video refresh.
    ///
    /// `bottom_left_origin` is the hardware context's declared orientation; it only
    /// matters for hardware frames.
    pub fn on_video_refresh(
        &mut self,
        frame: VideoFrame<'_>,
        format: PixelFormat,
        bottom_left_origin: bool,
    ) -> FrameOutcome {
        match frame {
            VideoFrame::Duplicate => FrameOutcome::Duplicate,
            VideoFrame::Hardware { width, height } => {
                if width == 0 || height == 0 {
                    return FrameOutcome::Skipped;
                }
                self.last = Some(LastFrame {
                    width,
                    height,
                    flip: !bottom_left_origin,
                });
                FrameOutcome::Hardware
            }
            VideoFrame::Software {
                data,
                width,
                height,
                pitch,
            } => {
                if width == 0 || height == 0 || self.backend.is_none() {
                    return FrameOutcome::Skipped;
                }
                if let Err(e) = decode_to_rgba(format, data, width, height, pitch, &mut self.rgba) {
                    warn!("dropping {width}x{height} frame: {e}");
                    return FrameOutcome::Skipped;
                }

                let resized = self
                    .target
                    .as_ref()
                    .is_none_or(|t| t.width != width || t.height != height);
                if resized {
                    debug!("software frame {width}x{height} resizes render target");
                    self.recreate(width, height);
                }

                let (Some(target), Some(backend)) = (self.target.as_ref(), self.backend.as_mut())
                else {
                    return FrameOutcome::Skipped;
                };
                backend.upload(target, width, height, &self.rgba);
                self.last = Some(LastFrame {
                    width,
                    height,
                    flip: true,
                });
                FrameOutcome::Software { resized }
            }
        }
    }

    /// Blit the last frame into the destination at `viewport`.
    ///
    /// No-op without a target, before the first frame, or for an empty viewport.
    pub fn present(&mut self, viewport: ViewportRect) {
        let (Some(target), Some(backend), Some(last)) =
            (self.target.as_ref(), self.backend.as_mut(), self.last)
        else {
            return;
        };
        if viewport.is_empty() {
            return;
        }
        backend.present(
            target,
            &BlitRequest {
                src_width: last.width,
                src_height: last.height,
                viewport,
                flip: last.flip,
            },
        );
    }
}

impl Drop for FramePresenter {
    fn drop(&mut self) {
        self.destroy_target();
    }
}
