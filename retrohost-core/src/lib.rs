//! retrohost-core: a host runtime for libretro-style emulation cores.
//!
//! The crate loads a native core module, answers its environment negotiation,
//! and drives it one frame at a time while routing its callbacks to the
//! frontend services:
//! - `av`: frame presentation (render targets, pixel decode, letterboxing) and audio sinks
//! - `input`: host input state exposed through the `(port, device, index, id)` query
//! - `storage`: save memory persistence
//! - `runtime`: the `CoreHost` and its FFI trampolines
//! - `session`: the `GameSession` lifecycle state machine
//!
//! Everything runs on one thread. Callbacks from the core reach the host through a
//! scoped thread-local call context (see `state`), never through a process global.

pub mod abi;
pub mod av;
pub mod config;
pub mod error;
pub mod input;
pub mod loader;
pub mod runtime;
pub mod session;
pub mod state;
pub mod storage;

pub use av::audio::{AudioSink, CaptureSink, NullSink};
pub use av::backend::{MemoryBackend, RenderBackend};
pub use av::opengl::{GlBackend, GraphicsContext};
pub use av::video::FramePresenter;
pub use av::{GameGeometry, PixelFormat, ViewportRect};
pub use config::HostConfig;
pub use error::HostError;
pub use input::{InputSource, KeyboardPointerInput, NullInput};
pub use runtime::{CoreHost, CoreInfo, Frontend};
pub use session::{CoreSource, GameSession, SessionPhase};

/// Re-export of the key codes used for input bindings.
pub use libretro_sys::Key;
