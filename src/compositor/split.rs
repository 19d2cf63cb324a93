//! Split panel
//!
//! A node that starts as a passthrough around one child and can be split
//! in two at runtime with the ctrl+alt+V / ctrl+alt+H chords. Each half is
//! wrapped in its own `Split` so the tree nests arbitrarily deep. The
//! divider position follows `ratio` and is adjusted with ctrl+alt+J /
//! ctrl+alt+L.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::compositor::drag::DragState;
use crate::compositor::stack::Stack;
use crate::compositor::{
    Canvas, ClientId, Point, PointerSample, Rect, TopLevelWindow, WindowId, Workspace,
};
use crate::input::{buttons, keys, KeyboardEvent, KeyboardState, PointerEvent};
use crate::lock;

const DIVIDER: [u8; 4] = [255, 255, 255, 255];
const RATIO_MIN: f64 = 0.1;
const RATIO_MAX: f64 = 0.9;
const RATIO_STEP: f64 = 0.1;

pub struct Split {
    drag: Arc<DragState>,
    inner: Mutex<SplitInner>,
}

struct SplitInner {
    first: Box<dyn Workspace>,
    second: Option<Box<dyn Workspace>>,
    ratio: f64,
    horizontal: bool,
    // Extent assigned at the last render; pointer routing works in this
    // local space.
    size: Point,
    focus_first: bool,
}

impl SplitInner {
    /// The two halves in local coordinates. Only meaningful when split.
    fn half_bounds(&self) -> (Rect, Rect) {
        if self.horizontal {
            let y = (self.ratio * self.size.y as f64) as i32;
            (
                Rect::new(0, 0, self.size.x, y),
                Rect::new(0, y, self.size.x, self.size.y),
            )
        } else {
            let x = (self.ratio * self.size.x as f64) as i32;
            (
                Rect::new(0, 0, x, self.size.y),
                Rect::new(x, 0, self.size.x, self.size.y),
            )
        }
    }

    fn focused(&self) -> &dyn Workspace {
        if self.focus_first || self.second.is_none() {
            self.first.as_ref()
        } else {
            self.second.as_deref().unwrap_or(self.first.as_ref())
        }
    }

    /// Convert into an active split, wrapping the current child and a
    /// fresh stack so both halves can split again.
    fn activate(&mut self, horizontal: bool, drag: &Arc<DragState>) {
        let prev = std::mem::replace(&mut self.first, Box::new(Stack::new(drag.clone())));
        self.first = Box::new(Split::with_child(prev, drag.clone()));
        self.second = Some(Box::new(Split::new(drag.clone())));
        self.ratio = 0.5;
        self.horizontal = horizontal;
        self.focus_first = true;
        debug!(
            "split: activated {} split",
            if horizontal { "horizontal" } else { "vertical" }
        );
    }
}

impl Split {
    pub fn new(drag: Arc<DragState>) -> Self {
        let first = Box::new(Stack::new(drag.clone()));
        Self::with_child(first, drag)
    }

    pub fn with_child(child: Box<dyn Workspace>, drag: Arc<DragState>) -> Self {
        Self {
            drag,
            inner: Mutex::new(SplitInner {
                first: child,
                second: None,
                ratio: 0.5,
                horizontal: false,
                size: Point::default(),
                focus_first: true,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn ratio(&self) -> f64 {
        lock(&self.inner).ratio
    }

    #[cfg(test)]
    pub(crate) fn is_split(&self) -> bool {
        lock(&self.inner).second.is_some()
    }
}

impl Workspace for Split {
    fn add_window(&self, window: Box<dyn TopLevelWindow>) {
        lock(&self.inner).focused().add_window(window);
    }

    fn remove_window(&self, id: WindowId) {
        let inner = lock(&self.inner);
        inner.first.remove_window(id);
        if let Some(second) = &inner.second {
            second.remove_window(id);
        }
    }

    fn remove_client_windows(&self, client: ClientId) {
        let inner = lock(&self.inner);
        inner.first.remove_client_windows(client);
        if let Some(second) = &inner.second {
            second.remove_client_windows(client);
        }
    }

    fn render(&self, frame: &mut Canvas, area: Rect) {
        let mut inner = lock(&self.inner);
        inner.size = Point::new(area.dx(), area.dy());

        if inner.second.is_some() {
            let (a, b) = inner.half_bounds();
            let first_area = a.translate(area.min);
            let second_area = b.translate(area.min);
            inner.first.render(frame, first_area);
            if let Some(second) = &inner.second {
                second.render(frame, second_area);
            }
            if inner.horizontal {
                frame.draw_rect(
                    Rect::new(first_area.min.x, first_area.max.y, first_area.max.x, first_area.max.y),
                    DIVIDER,
                );
            } else {
                frame.draw_rect(
                    Rect::new(first_area.max.x, first_area.min.y, first_area.max.x, first_area.max.y),
                    DIVIDER,
                );
            }
        } else {
            inner.first.render(frame, area);
        }
    }

    fn keyboard_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: KeyboardEvent) {
        let mut inner = lock(&self.inner);

        if inner.second.is_some() {
            if kb.ctrl_alt() && ev.pressed && ev.key == keys::J {
                inner.ratio = (inner.ratio - RATIO_STEP).clamp(RATIO_MIN, RATIO_MAX);
                return;
            }
            if kb.ctrl_alt() && ev.pressed && ev.key == keys::L {
                inner.ratio = (inner.ratio + RATIO_STEP).clamp(RATIO_MIN, RATIO_MAX);
                return;
            }

            let (a, b) = inner.half_bounds();
            if let Some(p) = pointer.descend(a) {
                inner.first.keyboard_event(p, kb, ev);
            } else if let Some(p) = pointer.descend(b) {
                if let Some(second) = &inner.second {
                    second.keyboard_event(p, kb, ev);
                }
            }
            return;
        }

        if kb.ctrl_alt() && ev.pressed && ev.key == keys::V {
            let drag = self.drag.clone();
            inner.activate(false, &drag);
            return;
        }
        if kb.ctrl_alt() && ev.pressed && ev.key == keys::H {
            let drag = self.drag.clone();
            inner.activate(true, &drag);
            return;
        }

        inner.first.keyboard_event(pointer, kb, ev);
    }

    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool {
        let mut inner = lock(&self.inner);

        // Chord-release drops the dragged window into the half under the
        // pointer; if it lands in neither, the focused half keeps it so
        // windows are never lost.
        if kb.ctrl_alt() && self.drag.active() {
            if let PointerEvent::Button {
                button: buttons::LEFT,
                pressed: false,
            } = ev
            {
                if let Some(window) = self.drag.take() {
                    debug!("split: dropping window {:?}", window.index());
                    if inner.second.is_some() {
                        let (a, b) = inner.half_bounds();
                        if pointer.descend(a).is_some() {
                            inner.focus_first = true;
                        } else if pointer.descend(b).is_some() {
                            inner.focus_first = false;
                        }
                        inner.focused().add_window(window);
                    } else {
                        inner.focus_first = true;
                        inner.first.add_window(window);
                    }
                    return true;
                }
            }
        }

        if inner.second.is_some() {
            let (a, b) = inner.half_bounds();
            if let Some(p) = pointer.descend(a) {
                inner.focus_first = true;
                if let Some(second) = &inner.second {
                    second.pointer_leave();
                }
                return inner.first.pointer_event(p, kb, ev);
            } else if let Some(p) = pointer.descend(b) {
                inner.focus_first = false;
                inner.first.pointer_leave();
                if let Some(second) = &inner.second {
                    return second.pointer_event(p, kb, ev);
                }
            }
            return false;
        }

        inner.focus_first = true;
        inner.first.pointer_event(pointer, kb, ev)
    }

    fn pointer_leave(&self) {
        let inner = lock(&self.inner);
        inner.first.pointer_leave();
        if let Some(second) = &inner.second {
            second.pointer_leave();
        }
    }

    fn ack_frame(&self) {
        let inner = lock(&self.inner);
        inner.first.ack_frame();
        if let Some(second) = &inner.second {
            second.ack_frame();
        }
    }
}
