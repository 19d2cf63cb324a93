//! Stack panel
//!
//! The leaf of the tiling tree: windows kept front-to-back, with only the
//! front window drawn and receiving input. New windows land on top.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::compositor::drag::DragState;
use crate::compositor::{
    Canvas, ClientId, PointerSample, Rect, TopLevelWindow, WindowId, Workspace,
};
use crate::input::{buttons, KeyboardEvent, KeyboardState, PointerEvent};
use crate::lock;

pub struct Stack {
    windows: Mutex<Vec<Box<dyn TopLevelWindow>>>,
    drag: Arc<DragState>,
}

impl Stack {
    pub fn new(drag: Arc<DragState>) -> Self {
        Self {
            windows: Mutex::new(Vec::new()),
            drag,
        }
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.windows).is_empty()
    }

    /// The id of the front window, if any.
    pub fn top(&self) -> Option<WindowId> {
        lock(&self.windows).first().map(|w| w.index())
    }
}

impl Workspace for Stack {
    fn add_window(&self, window: Box<dyn TopLevelWindow>) {
        debug!("stack: raising window {:?}", window.index());
        lock(&self.windows).insert(0, window);
    }

    fn remove_window(&self, id: WindowId) {
        lock(&self.windows).retain(|w| w.index() != id);
    }

    fn remove_client_windows(&self, client: ClientId) {
        lock(&self.windows).retain(|w| w.owner() != client);
    }

    fn render(&self, frame: &mut Canvas, area: Rect) {
        if let Some(top) = lock(&self.windows).first() {
            top.render(frame, area);
        }
    }

    fn keyboard_event(&self, _pointer: PointerSample, _kb: &KeyboardState, ev: KeyboardEvent) {
        if let Some(top) = lock(&self.windows).first() {
            top.keyboard_event(ev);
        }
    }

    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool {
        let mut windows = lock(&self.windows);

        // Chord-click on a window tears it out into the drag overlay.
        if !windows.is_empty() && kb.ctrl_alt() && !self.drag.active() {
            if let PointerEvent::Button {
                button: buttons::LEFT,
                pressed: true,
            } = ev
            {
                let window = windows.remove(0);
                debug!("stack: starting drag of {:?}", window.index());
                self.drag.start(window, pointer.global);
                return true;
            }
        }

        if let Some(top) = windows.first() {
            top.pointer_event(pointer, kb, ev)
        } else {
            false
        }
    }

    fn pointer_leave(&self) {
        if let Some(top) = lock(&self.windows).first() {
            top.pointer_leave();
        }
    }

    fn ack_frame(&self) {
        for window in lock(&self.windows).iter() {
            window.ack_frame();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compositor::Point;
    use crate::input::keys;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A window that records how it was driven.
    pub(crate) struct RecordingWindow {
        id: WindowId,
        owner: ClientId,
        pub keys: AtomicU32,
        pub pointer: AtomicU32,
        pub leaves: AtomicU32,
    }

    impl RecordingWindow {
        pub fn new(id: u32, owner: u32) -> Self {
            Self {
                id: WindowId(id),
                owner: ClientId(owner),
                keys: AtomicU32::new(0),
                pointer: AtomicU32::new(0),
                leaves: AtomicU32::new(0),
            }
        }
    }

    impl TopLevelWindow for RecordingWindow {
        fn index(&self) -> WindowId {
            self.id
        }

        fn owner(&self) -> ClientId {
            self.owner
        }

        fn render(&self, _frame: &mut Canvas, _area: Rect) {}

        fn keyboard_event(&self, _ev: KeyboardEvent) {
            self.keys.fetch_add(1, Ordering::SeqCst);
        }

        fn pointer_event(
            &self,
            _pointer: PointerSample,
            _kb: &KeyboardState,
            _ev: PointerEvent,
        ) -> bool {
            self.pointer.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn pointer_leave(&self) {
            self.leaves.fetch_add(1, Ordering::SeqCst);
        }

        fn ack_frame(&self) {}
    }

    fn press(kb: &mut KeyboardState, key: u32) {
        kb.apply(KeyboardEvent { key, pressed: true });
    }

    #[test]
    fn test_new_window_lands_on_top() {
        let stack = Stack::new(Arc::new(DragState::new()));
        stack.add_window(Box::new(RecordingWindow::new(1, 1)));
        stack.add_window(Box::new(RecordingWindow::new(2, 1)));
        assert_eq!(stack.top(), Some(WindowId(2)));
    }

    #[test]
    fn test_input_goes_to_top_only() {
        let stack = Stack::new(Arc::new(DragState::new()));
        let a = Arc::new(RecordingWindow::new(1, 1));
        let b = Arc::new(RecordingWindow::new(2, 1));

        struct Fwd(Arc<RecordingWindow>);
        impl TopLevelWindow for Fwd {
            fn index(&self) -> WindowId {
                self.0.index()
            }
            fn owner(&self) -> ClientId {
                self.0.owner()
            }
            fn render(&self, f: &mut Canvas, r: Rect) {
                self.0.render(f, r)
            }
            fn keyboard_event(&self, ev: KeyboardEvent) {
                self.0.keyboard_event(ev)
            }
            fn pointer_event(&self, p: PointerSample, k: &KeyboardState, e: PointerEvent) -> bool {
                self.0.pointer_event(p, k, e)
            }
            fn pointer_leave(&self) {
                self.0.pointer_leave()
            }
            fn ack_frame(&self) {
                self.0.ack_frame()
            }
        }

        stack.add_window(Box::new(Fwd(a.clone())));
        stack.add_window(Box::new(Fwd(b.clone())));

        let kb = KeyboardState::new();
        stack.keyboard_event(
            PointerSample::new(Point::new(0, 0)),
            &kb,
            KeyboardEvent {
                key: keys::H,
                pressed: true,
            },
        );
        assert_eq!(a.keys.load(Ordering::SeqCst), 0);
        assert_eq!(b.keys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chord_click_starts_drag() {
        let drag = Arc::new(DragState::new());
        let stack = Stack::new(drag.clone());
        stack.add_window(Box::new(RecordingWindow::new(7, 1)));

        let mut kb = KeyboardState::new();
        press(&mut kb, keys::CTRL);
        press(&mut kb, keys::ALT);

        let taken = stack.pointer_event(
            PointerSample::new(Point::new(5, 5)),
            &kb,
            PointerEvent::Button {
                button: buttons::LEFT,
                pressed: true,
            },
        );
        assert!(taken);
        assert!(drag.active());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_remove_client_windows() {
        let stack = Stack::new(Arc::new(DragState::new()));
        stack.add_window(Box::new(RecordingWindow::new(1, 10)));
        stack.add_window(Box::new(RecordingWindow::new(2, 11)));
        stack.add_window(Box::new(RecordingWindow::new(3, 10)));
        stack.remove_client_windows(ClientId(10));
        assert_eq!(stack.top(), Some(WindowId(2)));
        stack.remove_window(WindowId(2));
        assert!(stack.is_empty());
    }
}
