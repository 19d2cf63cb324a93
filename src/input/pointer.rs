//! Pointer state tracking
//!
//! The backend reports relative motion; the compositor integrates it into
//! an absolute position clamped to the output, and tracks held buttons so
//! chords and drags can be matched against the keyboard state.

use log::debug;

use crate::compositor::geometry::Point;

/// Linux event codes for pointer buttons.
pub mod buttons {
    pub const LEFT: u32 = 0x110;
    pub const RIGHT: u32 = 0x111;
    pub const MIDDLE: u32 = 0x112;
}

/// One pointer transition, delivered after the state has been updated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Motion,
    Button { button: u32, pressed: bool },
    Axis { axis: u32, value: f32 },
}

/// Absolute pointer position and held buttons.
#[derive(Debug, Default)]
pub struct PointerState {
    position: Point,
    down: Vec<u32>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Integrate a relative motion, clamping to the output extent.
    pub fn motion(&mut self, dx: f64, dy: f64, width: i32, height: i32) {
        self.position.x = (self.position.x + dx.round() as i32).clamp(0, width.max(0));
        self.position.y = (self.position.y + dy.round() as i32).clamp(0, height.max(0));
    }

    /// Fold a button transition into the held set; repeats return false.
    pub fn button(&mut self, button: u32, pressed: bool) -> bool {
        if pressed {
            if self.down.contains(&button) {
                return false;
            }
            self.down.push(button);
            debug!("button down: {:#x}", button);
            true
        } else if let Some(idx) = self.down.iter().position(|&b| b == button) {
            self.down.remove(idx);
            debug!("button up: {:#x}", button);
            true
        } else {
            false
        }
    }

    pub fn is_down(&self, button: u32) -> bool {
        self.down.contains(&button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_clamps_to_output() {
        let mut ptr = PointerState::new();
        ptr.motion(-50.0, -50.0, 640, 480);
        assert_eq!(ptr.position(), Point::new(0, 0));
        ptr.motion(10000.0, 30.0, 640, 480);
        assert_eq!(ptr.position(), Point::new(640, 30));
    }

    #[test]
    fn test_button_filters_repeats() {
        let mut ptr = PointerState::new();
        assert!(ptr.button(buttons::LEFT, true));
        assert!(!ptr.button(buttons::LEFT, true));
        assert!(ptr.is_down(buttons::LEFT));
        assert!(ptr.button(buttons::LEFT, false));
        assert!(!ptr.is_down(buttons::LEFT));
    }
}
