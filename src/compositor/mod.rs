//! Workspace model
//!
//! The compositor side of the server: a recursive tree of tiling panels
//! that blends client windows into the output frame and routes input to
//! whichever window is under the pointer.
//!
//! The tree is built from three node kinds. A [`Stack`] holds windows
//! front-to-back and shows the top one. A [`Split`] starts as a
//! passthrough around a single child and can be split in two at runtime.
//! The [`DragOverlay`] sits at the root and carries the window currently
//! being dragged between panels.

pub mod canvas;
pub mod drag;
pub mod geometry;
pub mod split;
pub mod stack;

pub use canvas::Canvas;
pub use drag::{DragOverlay, DragState};
pub use geometry::{Point, Rect};
pub use split::Split;
pub use stack::Stack;

use crate::input::{KeyboardEvent, KeyboardState, PointerEvent};

/// Compositor-wide identity of a mapped top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

/// Identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// A pointer position carried through the workspace tree.
///
/// `local` is re-rooted as the event descends into nested panels;
/// `global` stays in output coordinates for the drag preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSample {
    pub local: Point,
    pub global: Point,
}

impl PointerSample {
    pub fn new(p: Point) -> Self {
        Self { local: p, global: p }
    }

    /// Re-root into a child rectangle; None when the pointer is outside it.
    pub fn descend(&self, rect: Rect) -> Option<PointerSample> {
        rect.to_local(self.local).map(|local| PointerSample {
            local,
            global: self.global,
        })
    }
}

/// A mapped client window as seen by the workspace tree.
///
/// Implementations use interior locking; every method takes `&self` so
/// windows can be driven concurrently by the render thread and the input
/// path.
pub trait TopLevelWindow: Send + Sync {
    fn index(&self) -> WindowId;

    /// The connection this window belongs to.
    fn owner(&self) -> ClientId;

    /// Draw the window into `area` of the output frame, requesting a
    /// resize from the client when the panel size changed.
    fn render(&self, frame: &mut Canvas, area: Rect);

    fn keyboard_event(&self, ev: KeyboardEvent);

    /// Route a pointer event; `pointer.local` is window-local. Returns
    /// true when the window took the event.
    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool;

    fn pointer_leave(&self);

    /// Called once per presented output frame.
    fn ack_frame(&self);
}

/// A node of the tiling tree.
pub trait Workspace: Send + Sync {
    /// Insert a window at the focused leaf.
    fn add_window(&self, window: Box<dyn TopLevelWindow>);

    fn remove_window(&self, id: WindowId);

    /// Remove every window owned by a disconnecting client.
    fn remove_client_windows(&self, client: ClientId);

    /// Draw this node into `area` of the output frame.
    fn render(&self, frame: &mut Canvas, area: Rect);

    fn keyboard_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: KeyboardEvent);

    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool;

    fn pointer_leave(&self);

    fn ack_frame(&self);

    /// Whether the quit chord has been pressed; only the root overrides.
    fn quit_requested(&self) -> bool {
        false
    }
}
