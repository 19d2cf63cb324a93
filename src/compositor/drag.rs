//! Drag overlay
//!
//! The root of the workspace tree. Wraps the outermost split, holds the
//! window currently being dragged between panels, and owns the two
//! compositor-level chords that do not belong to any panel: the spawn
//! hook (ctrl+alt+Enter) and the quit flag (ctrl+alt+Esc).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::compositor::split::Split;
use crate::compositor::{
    Canvas, ClientId, Point, PointerSample, Rect, TopLevelWindow, WindowId, Workspace,
};
use crate::input::{keys, KeyboardEvent, KeyboardState, PointerEvent};
use crate::lock;

/// Fixed extent of the floating drag preview.
const PREVIEW_WIDTH: i32 = 480;
const PREVIEW_HEIGHT: i32 = 256;
const GRAB_MARKER: [u8; 4] = [0, 0, 255, 255];

/// Invoked on the spawn chord, typically to launch a terminal.
pub type SpawnHook = Box<dyn FnMut() + Send>;

/// The window in flight between two panels, shared by every node so any
/// stack can start a drag and any split can complete one.
pub struct DragState {
    dragging: Mutex<Option<Box<dyn TopLevelWindow>>>,
    origin: Mutex<Point>,
}

impl DragState {
    pub fn new() -> Self {
        Self {
            dragging: Mutex::new(None),
            origin: Mutex::new(Point::default()),
        }
    }

    pub fn start(&self, window: Box<dyn TopLevelWindow>, origin: Point) {
        *lock(&self.origin) = origin;
        *lock(&self.dragging) = Some(window);
    }

    pub fn take(&self) -> Option<Box<dyn TopLevelWindow>> {
        lock(&self.dragging).take()
    }

    pub fn active(&self) -> bool {
        lock(&self.dragging).is_some()
    }

    pub fn update_origin(&self, origin: Point) {
        *lock(&self.origin) = origin;
    }

    pub fn origin(&self) -> Point {
        *lock(&self.origin)
    }
}

impl Default for DragState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DragOverlay {
    root: Split,
    drag: Arc<DragState>,
    quit: AtomicBool,
    spawn: Mutex<Option<SpawnHook>>,
}

impl DragOverlay {
    pub fn new(spawn: Option<SpawnHook>) -> Self {
        let drag = Arc::new(DragState::new());
        Self {
            root: Split::new(drag.clone()),
            drag,
            quit: AtomicBool::new(false),
            spawn: Mutex::new(spawn),
        }
    }

    pub fn drag_state(&self) -> &Arc<DragState> {
        &self.drag
    }
}

impl Workspace for DragOverlay {
    fn add_window(&self, window: Box<dyn TopLevelWindow>) {
        self.root.add_window(window);
    }

    fn remove_window(&self, id: WindowId) {
        self.root.remove_window(id);
        // A dragged window whose client went away must not reappear.
        let mut dragging = lock(&self.drag.dragging);
        if dragging.as_ref().is_some_and(|w| w.index() == id) {
            *dragging = None;
        }
    }

    fn remove_client_windows(&self, client: ClientId) {
        self.root.remove_client_windows(client);
        let mut dragging = lock(&self.drag.dragging);
        if dragging.as_ref().is_some_and(|w| w.owner() == client) {
            *dragging = None;
        }
    }

    fn render(&self, frame: &mut Canvas, area: Rect) {
        self.root.render(frame, area);

        let origin = self.drag.origin();
        let dragging = lock(&self.drag.dragging);
        if let Some(window) = dragging.as_ref() {
            window.render(
                frame,
                Rect::from_size(origin.x, origin.y, PREVIEW_WIDTH, PREVIEW_HEIGHT),
            );
            frame.draw_rect(
                Rect::new(origin.x, origin.y, origin.x + 2, origin.y + 2),
                GRAB_MARKER,
            );
        }
    }

    fn keyboard_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: KeyboardEvent) {
        if kb.ctrl_alt() && ev.pressed && ev.key == keys::ENTER {
            debug!("overlay: spawn chord");
            if let Some(hook) = lock(&self.spawn).as_mut() {
                hook();
            }
            return;
        }
        if kb.ctrl_alt() && ev.pressed && ev.key == keys::ESC {
            info!("overlay: quit chord");
            self.quit.store(true, Ordering::SeqCst);
            return;
        }
        self.root.keyboard_event(pointer, kb, ev);
    }

    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool {
        self.drag.update_origin(pointer.global);
        self.root.pointer_event(pointer, kb, ev)
    }

    fn pointer_leave(&self) {
        self.root.pointer_leave();
    }

    fn ack_frame(&self) {
        self.root.ack_frame();
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::stack::tests::RecordingWindow;
    use std::sync::atomic::AtomicU32;

    fn chord() -> KeyboardState {
        let mut kb = KeyboardState::new();
        kb.apply(KeyboardEvent { key: keys::CTRL, pressed: true });
        kb.apply(KeyboardEvent { key: keys::ALT, pressed: true });
        kb
    }

    #[test]
    fn test_quit_chord_sets_flag() {
        let overlay = DragOverlay::new(None);
        assert!(!overlay.quit_requested());
        overlay.keyboard_event(
            PointerSample::new(Point::default()),
            &chord(),
            KeyboardEvent { key: keys::ESC, pressed: true },
        );
        assert!(overlay.quit_requested());
    }

    #[test]
    fn test_spawn_chord_runs_hook() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let overlay = DragOverlay::new(Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));
        overlay.keyboard_event(
            PointerSample::new(Point::default()),
            &chord(),
            KeyboardEvent { key: keys::ENTER, pressed: true },
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_clears_dragged_window() {
        let overlay = DragOverlay::new(None);
        overlay
            .drag_state()
            .start(Box::new(RecordingWindow::new(3, 8)), Point::default());
        assert!(overlay.drag_state().active());
        overlay.remove_client_windows(ClientId(8));
        assert!(!overlay.drag_state().active());
    }

    #[test]
    fn test_pointer_updates_drag_origin() {
        let overlay = DragOverlay::new(None);
        overlay.pointer_event(
            PointerSample::new(Point::new(33, 44)),
            &KeyboardState::new(),
            PointerEvent::Motion,
        );
        assert_eq!(overlay.drag_state().origin(), Point::new(33, 44));
    }
}
