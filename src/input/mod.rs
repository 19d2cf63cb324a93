//! Input state models
//!
//! Compositor-side keyboard and pointer state, fed by the backend's raw
//! event stream and consumed by the workspace tree and the seat handlers.

pub mod keyboard;
pub mod pointer;

pub use keyboard::{keys, KeyboardEvent, KeyboardState, Modifiers};
pub use pointer::{buttons, PointerEvent, PointerState};
