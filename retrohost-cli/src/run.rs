//! `retrohost run`
//!
//! Headless run: frames are presented into a `MemoryBackend` canvas sized
//! `scale x` the core's base geometry, audio is captured in memory. Both can be
//! written out when the run ends.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use log::{info, warn};
use retrohost_core::{
    AudioSink, CaptureSink, CoreHost, Frontend, HostConfig, MemoryBackend, NullInput,
};

use crate::capture;

#[derive(Args)]
pub struct RunArgs {
    /// Core module (.so / .dll / .dylib)
    #[arg(long)]
    pub core: PathBuf,

    /// Game to load
    #[arg(long)]
    pub rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Host configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output gain in [0, 1]; overrides the configuration
    #[arg(long)]
    pub volume: Option<f32>,

    /// Write the last presented frame as PNG
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Write the captured audio as 16-bit stereo WAV
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Output surface size as a multiple of the base geometry
    #[arg(long, default_value_t = 2)]
    pub scale: u32,

    /// Play audio through the default output device instead of capturing it
    #[cfg(feature = "cpal")]
    #[arg(long, conflicts_with = "wav")]
    pub play: bool,
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<HostConfig> {
    match path {
        Some(path) => HostConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => Ok(HostConfig::default()),
    }
}

pub fn execute(args: RunArgs) -> Result<()> {
    if args.scale == 0 {
        bail!("--scale must be at least 1");
    }
    let mut config = load_config(args.config.as_deref())?;
    if let Some(volume) = args.volume {
        config.volume = volume;
    }

    let sink = CaptureSink::new();
    let capture_handle = sink.capture();
    #[cfg(feature = "cpal")]
    let audio: Box<dyn AudioSink> = if args.play {
        Box::new(retrohost_core::av::audio::CpalSink::new())
    } else {
        Box::new(sink)
    };
    #[cfg(not(feature = "cpal"))]
    let audio: Box<dyn AudioSink> = Box::new(sink);
    let mut frontend = Frontend::new(&config, audio, Box::new(NullInput));

    let mut host = CoreHost::load(&args.core, &mut frontend)
        .with_context(|| format!("failed to load core {}", args.core.display()))?;
    if let Err(e) = host.load_game(&args.rom, &mut frontend) {
        host.unload(&mut frontend);
        return Err(e).with_context(|| format!("failed to load game {}", args.rom.display()));
    }

    let geometry = host.geometry();
    let width = geometry.base_width.max(1) * args.scale;
    let height = geometry.base_height.max(1) * args.scale;
    let backend = MemoryBackend::new(width, height);
    let canvas = backend.canvas();
    frontend.video.attach(Box::new(backend));
    let viewport = host.update_video_layout(width, height, &mut frontend);
    info!(
        "running {} frames at {}x{} (viewport {}x{}+{}+{})",
        args.frames, width, height, viewport.w, viewport.h, viewport.x, viewport.y
    );

    let mut result: Result<()> = Ok(());
    for frame in 0..args.frames {
        if let Err(e) = host.run(&mut frontend) {
            result = Err(e).with_context(|| format!("frame {frame} failed"));
            break;
        }
        host.present(&mut frontend);
    }
    host.unload(&mut frontend);
    result?;

    if let Some(path) = &args.screenshot {
        let canvas = canvas
            .lock()
            .map_err(|_| anyhow::anyhow!("canvas lock poisoned"))?;
        if canvas.presented_frames == 0 {
            warn!("no frame was presented; screenshot is blank");
        }
        capture::write_png(path, canvas.width, canvas.height, &canvas.to_top_down())?;
        info!("wrote {}", path.display());
    }

    if let Some(path) = &args.wav {
        let captured = capture_handle
            .lock()
            .map_err(|_| anyhow::anyhow!("audio capture lock poisoned"))?;
        capture::write_wav(path, captured.sample_rate, &captured.samples)?;
        info!(
            "wrote {} ({} stereo frames)",
            path.display(),
            captured.samples.len() / 2
        );
    }
    Ok(())
}
