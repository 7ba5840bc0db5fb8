//! Host key -> logical control bindings.
//!
//! Many keys may drive the same control, and one key may drive several controls.
//! Defaults mirror a keyboard layout common to handheld-console frontends:
//! Z/X/A/S face buttons, Q/W shoulders, arrows for both the D-pad and the left
//! stick, IJKL as a second left stick, and the keypad for the right stick.

use std::collections::{BTreeMap, HashMap};

use libretro_sys as sys;
use log::warn;

use crate::Key;

/// One analog stick half-axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AxisBinding {
    /// `DEVICE_INDEX_ANALOG_LEFT` or `DEVICE_INDEX_ANALOG_RIGHT`.
    pub stick: u32,
    /// `DEVICE_ID_ANALOG_X` or `DEVICE_ID_ANALOG_Y`.
    pub axis: u32,
    pub positive: bool,
}

/// What a bound key controls.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Joypad button id (`DEVICE_ID_JOYPAD_*`).
    Button(u32),
    Axis(AxisBinding),
}

/// Maps host keys to joypad buttons and stick axes.
#[derive(Clone, Debug, Default)]
pub struct InputBindings {
    map: HashMap<Key, Vec<Binding>>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `binding` to the controls `key` drives.
    pub fn bind(&mut self, key: Key, binding: Binding) {
        let controls = self.map.entry(key).or_default();
        if !controls.contains(&binding) {
            controls.push(binding);
        }
    }

    /// Controls driven by `key`, in binding order.
    pub fn get(&self, key: Key) -> &[Binding] {
        self.map.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn drives(&self, key: Key, binding: Binding) -> bool {
        self.get(key).contains(&binding)
    }

    /// Remove `binding` from every key.
    pub fn unbind_all(&mut self, binding: Binding) {
        self.map.retain(|_, controls| {
            controls.retain(|b| *b != binding);
            !controls.is_empty()
        });
    }

    pub fn keys_for(&self, binding: Binding) -> impl Iterator<Item = Key> + '_ {
        self.map
            .iter()
            .filter(move |(_, controls)| controls.contains(&binding))
            .map(|(k, _)| *k)
    }

    /// Apply overrides keyed by control name (see `control_by_name`), each listing
    /// RETROK key codes. Each named control loses its default keys first.
    /// Unknown names and key codes are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, Vec<u32>>) {
        for (name, codes) in overrides {
            let Some(binding) = control_by_name(name) else {
                warn!("unknown input control `{name}` in bindings");
                continue;
            };
            self.unbind_all(binding);
            for &code in codes {
                match Key::from_uint(code) {
                    Some(key) => self.bind(key, binding),
                    None => warn!("unknown key code {code} for `{name}`"),
                }
            }
        }
    }
}

const fn axis(stick: u32, axis: u32, positive: bool) -> Binding {
    Binding::Axis(AxisBinding {
        stick,
        axis,
        positive,
    })
}

const LEFT: u32 = sys::DEVICE_INDEX_ANALOG_LEFT;
const RIGHT: u32 = sys::DEVICE_INDEX_ANALOG_RIGHT;
const X: u32 = sys::DEVICE_ID_ANALOG_X;
const Y: u32 = sys::DEVICE_ID_ANALOG_Y;

/// Resolve a config control name (e.g. `"start"`, `"left_stick_up"`).
pub fn control_by_name(name: &str) -> Option<Binding> {
    let button = match name {
        "b" => sys::DEVICE_ID_JOYPAD_B,
        "y" => sys::DEVICE_ID_JOYPAD_Y,
        "select" => sys::DEVICE_ID_JOYPAD_SELECT,
        "start" => sys::DEVICE_ID_JOYPAD_START,
        "up" => sys::DEVICE_ID_JOYPAD_UP,
        "down" => sys::DEVICE_ID_JOYPAD_DOWN,
        "left" => sys::DEVICE_ID_JOYPAD_LEFT,
        "right" => sys::DEVICE_ID_JOYPAD_RIGHT,
        "a" => sys::DEVICE_ID_JOYPAD_A,
        "x" => sys::DEVICE_ID_JOYPAD_X,
        "l" => sys::DEVICE_ID_JOYPAD_L,
        "r" => sys::DEVICE_ID_JOYPAD_R,
        "l2" => sys::DEVICE_ID_JOYPAD_L2,
        "r2" => sys::DEVICE_ID_JOYPAD_R2,
        "l3" => sys::DEVICE_ID_JOYPAD_L3,
        "r3" => sys::DEVICE_ID_JOYPAD_R3,
        "left_stick_right" => return Some(axis(LEFT, X, true)),
        "left_stick_left" => return Some(axis(LEFT, X, false)),
        "left_stick_down" => return Some(axis(LEFT, Y, true)),
        "left_stick_up" => return Some(axis(LEFT, Y, false)),
        "right_stick_right" => return Some(axis(RIGHT, X, true)),
        "right_stick_left" => return Some(axis(RIGHT, X, false)),
        "right_stick_down" => return Some(axis(RIGHT, Y, true)),
        "right_stick_up" => return Some(axis(RIGHT, Y, false)),
        _ => return None,
    };
    Some(Binding::Button(button))
}

/// Build the default bindings.
pub fn default_bindings() -> InputBindings {
    let mut b = InputBindings::new();

    let buttons = [
        (Key::Z, sys::DEVICE_ID_JOYPAD_B),
        (Key::A, sys::DEVICE_ID_JOYPAD_Y),
        (Key::RShift, sys::DEVICE_ID_JOYPAD_SELECT),
        (Key::LShift, sys::DEVICE_ID_JOYPAD_SELECT),
        (Key::Return, sys::DEVICE_ID_JOYPAD_START),
        (Key::Up, sys::DEVICE_ID_JOYPAD_UP),
        (Key::Down, sys::DEVICE_ID_JOYPAD_DOWN),
        (Key::Left, sys::DEVICE_ID_JOYPAD_LEFT),
        (Key::Right, sys::DEVICE_ID_JOYPAD_RIGHT),
        (Key::X, sys::DEVICE_ID_JOYPAD_A),
        (Key::S, sys::DEVICE_ID_JOYPAD_X),
        (Key::Q, sys::DEVICE_ID_JOYPAD_L),
        (Key::W, sys::DEVICE_ID_JOYPAD_R),
    ];
    for (key, id) in buttons {
        b.bind(key, Binding::Button(id));
    }

    let axes = [
        (Key::Right, axis(LEFT, X, true)),
        (Key::Left, axis(LEFT, X, false)),
        (Key::Down, axis(LEFT, Y, true)),
        (Key::Up, axis(LEFT, Y, false)),
        (Key::L, axis(LEFT, X, true)),
        (Key::J, axis(LEFT, X, false)),
        (Key::K, axis(LEFT, Y, true)),
        (Key::I, axis(LEFT, Y, false)),
        (Key::Kp6, axis(RIGHT, X, true)),
        (Key::Kp4, axis(RIGHT, X, false)),
        (Key::Kp2, axis(RIGHT, Y, true)),
        (Key::Kp8, axis(RIGHT, Y, false)),
    ];
    for (key, binding) in axes {
        b.bind(key, binding);
    }

    b
}
