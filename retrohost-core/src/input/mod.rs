//! Input module for retrohost-core.
//!
//! Responsibilities:
//! - Answer the core's `input_state(port, device, index, id)` query from host input.
//! - Accept host events (keys, pointer/touch) from the GUI shell.
//! - Map pointer positions into the core's coordinate space using the current
//!   letterboxed viewport.
//!
//! Notes / constraints:
//! - Only port 0 is wired. Every other port reads 0.
//! - Pointer coordinates are stored raw and normalized at query time, so a viewport
//!   change is reflected by the very next query.
//! - A pointer press latches until the core reads `POINTER_PRESSED` (or mouse
//!   `LEFT`) once. A tap that starts and ends between two polls is still seen.

pub mod bindings;

use std::collections::HashSet;

use libretro_sys as sys;
use log::trace;

use crate::Key;
use crate::abi::{DEVICE_ID_JOYPAD_MASK, JOYPAD_BUTTON_COUNT};
use crate::av::ViewportRect;
use crate::av::utils::clamp_i16;

pub use bindings::{AxisBinding, Binding, InputBindings, default_bindings};

/// Source of input state for the core.
pub trait InputSource {
    /// Called from the core's input poll callback.
    fn poll(&mut self) {}

    /// Value of one control. `device` is masked with `DEVICE_MASK` by the caller.
    fn state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16;

    /// Negotiated frame geometry changed.
    fn update_geometry(&mut self, width: u32, height: u32, aspect: f32);

    /// Letterboxed destination rectangle changed.
    fn update_viewport(&mut self, viewport: ViewportRect);

    fn key_down(&mut self, _key: Key) {}
    fn key_up(&mut self, _key: Key) {}

    fn pointer_down(&mut self, _x: f32, _y: f32) {}
    fn pointer_move(&mut self, _x: f32, _y: f32) {}
    fn pointer_up(&mut self, _x: f32, _y: f32) {}
}

/// Source that never reports any input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInput;

impl InputSource for NullInput {
    fn state(&mut self, _port: u32, _device: u32, _index: u32, _id: u32) -> i16 {
        0
    }

    fn update_geometry(&mut self, _width: u32, _height: u32, _aspect: f32) {}

    fn update_viewport(&mut self, _viewport: ViewportRect) {}
}

#[derive(Debug, Default, Clone, Copy)]
struct PointerState {
    x: f32,
    y: f32,
    held: bool,
    latched: bool,
}

/// Map a host coordinate into `[-32767, 32767]` across `[origin, origin + extent]`.
fn normalize(pos: f32, origin: i32, extent: i32) -> i16 {
    if extent <= 0 {
        return 0;
    }
    let norm = ((pos - origin as f32) / extent as f32).clamp(0.0, 1.0);
    ((norm * 65534.0).floor() as i32 - 32767) as i16
}

/// Keyboard + pointer input with rebindable keys.
#[derive(Debug)]
pub struct KeyboardPointerInput {
    bindings: InputBindings,
    held: HashSet<Key>,
    pointer: PointerState,
    viewport: ViewportRect,
    geometry: (u32, u32, f32),
}

impl Default for KeyboardPointerInput {
    fn default() -> Self {
        Self::new(default_bindings())
    }
}

impl KeyboardPointerInput {
    pub fn new(bindings: InputBindings) -> Self {
        Self {
            bindings,
            held: HashSet::new(),
            pointer: PointerState::default(),
            viewport: ViewportRect::default(),
            geometry: (0, 0, 0.0),
        }
    }

    pub fn bindings(&self) -> &InputBindings {
        &self.bindings
    }

    pub fn viewport(&self) -> ViewportRect {
        self.viewport
    }

    /// Last geometry pushed by the host: `(width, height, aspect)`.
    pub fn geometry(&self) -> (u32, u32, f32) {
        self.geometry
    }

    fn is_active(&self, binding: Binding) -> bool {
        self.held
            .iter()
            .any(|&key| self.bindings.drives(key, binding))
    }

    fn button(&self, id: u32) -> i16 {
        if id == DEVICE_ID_JOYPAD_MASK {
            let mut mask: u16 = 0;
            for bit in 0..JOYPAD_BUTTON_COUNT as u32 {
                if self.is_active(Binding::Button(bit)) {
                    mask |= 1 << bit;
                }
            }
            return mask as i16;
        }
        self.is_active(Binding::Button(id)) as i16
    }

    fn analog(&self, stick: u32, axis: u32) -> i16 {
        let half = |positive| {
            self.is_active(Binding::Axis(AxisBinding {
                stick,
                axis,
                positive,
            }))
        };
        let mut value = 0i32;
        if half(true) {
            value += i16::MAX as i32;
        }
        if half(false) {
            value += i16::MIN as i32;
        }
        clamp_i16(value)
    }

    /// Held or latched; reading consumes the latch.
    fn take_pressed(&mut self) -> i16 {
        let pressed = self.pointer.held || self.pointer.latched;
        self.pointer.latched = false;
        pressed as i16
    }

    fn pointer(&mut self, id: u32) -> i16 {
        match id {
            sys::DEVICE_ID_POINTER_X => normalize(self.pointer.x, self.viewport.x, self.viewport.w),
            sys::DEVICE_ID_POINTER_Y => normalize(self.pointer.y, self.viewport.y, self.viewport.h),
            sys::DEVICE_ID_POINTER_PRESSED => self.take_pressed(),
            _ => 0,
        }
    }
}

impl InputSource for KeyboardPointerInput {
    fn state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        if port != 0 {
            return 0;
        }
        let value = match device {
            sys::DEVICE_JOYPAD => self.button(id),
            sys::DEVICE_ANALOG => self.analog(index, id),
            sys::DEVICE_POINTER if index == 0 => self.pointer(id),
            sys::DEVICE_MOUSE if id == sys::DEVICE_ID_MOUSE_LEFT => self.take_pressed(),
            _ => 0,
        };
        trace!("input_state({port}, {device}, {index}, {id}) = {value}");
        value
    }

    fn update_geometry(&mut self, width: u32, height: u32, aspect: f32) {
        self.geometry = (width, height, aspect);
    }

    fn update_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = viewport;
    }

    fn key_down(&mut self, key: Key) {
        self.held.insert(key);
    }

    fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    fn pointer_down(&mut self, x: f32, y: f32) {
        self.pointer = PointerState {
            x,
            y,
            held: true,
            latched: true,
        };
    }

    fn pointer_move(&mut self, x: f32, y: f32) {
        self.pointer.x = x;
        self.pointer.y = y;
    }

    fn pointer_up(&mut self, x: f32, y: f32) {
        self.pointer.x = x;
        self.pointer.y = y;
        self.pointer.held = false;
    }
}
