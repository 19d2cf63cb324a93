//! Keyboard state tracking
//!
//! Raw Linux scancodes end-to-end; no keymap compilation. The workspace
//! matches chords against the down-key set, clients receive the same codes
//! together with a modifier summary.

use bitflags::bitflags;
use log::debug;

/// Linux event codes for the keys the compositor itself cares about.
pub mod keys {
    pub const ESC: u32 = 1;
    pub const ENTER: u32 = 28;
    pub const CTRL: u32 = 29;
    pub const SHIFT: u32 = 42;
    pub const H: u32 = 35;
    pub const J: u32 = 36;
    pub const L: u32 = 38;
    pub const V: u32 = 47;
    pub const ALT: u32 = 56;
    pub const SUPER: u32 = 125;
}

bitflags! {
    /// The depressed-modifier mask reported to clients.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 0x1;
        const CTRL = 0x4;
        const ALT = 0x8;
        const SUPER = 0x40;
    }
}

/// One key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub key: u32,
    pub pressed: bool,
}

/// The set of keys currently held down.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    down: Vec<u32>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a key transition into the down set.
    ///
    /// Returns false for repeats (press of a held key, release of an
    /// unheld one); repeats are not forwarded.
    pub fn apply(&mut self, ev: KeyboardEvent) -> bool {
        if ev.pressed {
            if self.down.contains(&ev.key) {
                return false;
            }
            self.down.push(ev.key);
            debug!("key down: {}", ev.key);
            true
        } else if let Some(idx) = self.down.iter().position(|&k| k == ev.key) {
            self.down.remove(idx);
            debug!("key up: {}", ev.key);
            true
        } else {
            false
        }
    }

    pub fn is_down(&self, key: u32) -> bool {
        self.down.contains(&key)
    }

    /// Both chord modifiers held.
    pub fn ctrl_alt(&self) -> bool {
        self.is_down(keys::CTRL) && self.is_down(keys::ALT)
    }

    pub fn down_keys(&self) -> &[u32] {
        &self.down
    }

    /// Summarize the held keys as a client-facing modifier mask.
    pub fn modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::empty();
        if self.is_down(keys::SHIFT) {
            mods |= Modifiers::SHIFT;
        }
        if self.is_down(keys::CTRL) {
            mods |= Modifiers::CTRL;
        }
        if self.is_down(keys::ALT) {
            mods |= Modifiers::ALT;
        }
        if self.is_down(keys::SUPER) {
            mods |= Modifiers::SUPER;
        }
        mods
    }
}
