//! Client windows
//!
//! The bridge between the workspace tree and the protocol layer: one
//! [`ClientWindow`] per mapped toplevel. Rendering pulls committed
//! canvases out of the owning connection's registry; input is translated
//! back into seat events on the same connection.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::compositor::geometry::{Point, Rect};
use crate::compositor::{Canvas, ClientId, PointerSample, TopLevelWindow, WindowId};
use crate::input::{KeyboardEvent, KeyboardState, PointerEvent};
use crate::lock;
use crate::protocol::registry::Kind;
use crate::protocol::shell;
use crate::server::connection::Connection;

const MAX_SURFACE_DEPTH: usize = 16;

pub struct ClientWindow {
    id: WindowId,
    owner: ClientId,
    conn: Arc<Connection>,
    shell_surface: u32,
    /// Last window-local pointer position, for cursor placement.
    pointer_local: Mutex<Point>,
    has_pointer: Mutex<bool>,
    /// Keys currently held while this window has focus; maintained here
    /// so modifier state can accompany every key event.
    kb: Mutex<KeyboardState>,
}

impl ClientWindow {
    pub fn new(id: WindowId, conn: Arc<Connection>, shell_surface: u32) -> Self {
        let owner = conn.id();
        Self {
            id,
            owner,
            conn,
            shell_surface,
            pointer_local: Mutex::new(Point::new(0, 0)),
            has_pointer: Mutex::new(false),
            kb: Mutex::new(KeyboardState::new()),
        }
    }

    /// Blit a committed surface and its subsurfaces at `origin`,
    /// clipped to `area`. `crop` offsets reading into the root canvas
    /// (the window-geometry origin).
    fn render_surface(
        &self,
        frame: &mut Canvas,
        area: Rect,
        surface: u32,
        origin: Point,
        crop: Point,
        depth: usize,
    ) {
        if depth >= MAX_SURFACE_DEPTH {
            return;
        }
        let Ok(handle) = self.conn.registry().get(surface) else {
            return;
        };
        let children = {
            let guard = lock(&handle);
            let Ok(surface) = guard.as_surface(surface) else {
                return;
            };
            if let Some(canvas) = surface.canvas() {
                let dst = Rect {
                    min: origin,
                    max: area.max,
                };
                frame.blit_over(dst, canvas, crop);
            }
            surface.children.clone()
        };
        for sub in children {
            let Ok(handle) = self.conn.registry().get(sub) else {
                continue;
            };
            let (child, position) = {
                let guard = lock(&handle);
                let Ok(sub) = guard.as_subsurface(sub) else {
                    continue;
                };
                (sub.surface, sub.position)
            };
            self.render_surface(frame, area, child, origin + position, Point::new(0, 0), depth + 1);
        }
    }

    fn render_popups(&self, frame: &mut Canvas, area: Rect, popups: &[u32]) {
        for popup in popups {
            let Ok(handle) = self.conn.registry().get(*popup) else {
                continue;
            };
            let surface = {
                let guard = lock(&handle);
                match guard.as_shell_surface(*popup) {
                    Ok(shell) => shell.surface,
                    Err(_) => continue,
                }
            };
            let Ok(offset) = shell::relative_offset(&self.conn, *popup) else {
                continue;
            };
            self.render_surface(frame, area, surface, area.min + offset, Point::new(0, 0), 0);
        }
    }

    fn render_cursor(&self, frame: &mut Canvas, area: Rect) {
        if !*lock(&self.has_pointer) {
            return;
        }
        let Some((pointer_id, handle)) = self.conn.find_kind(Kind::Pointer) else {
            return;
        };
        let (cursor, hotspot) = {
            let guard = lock(&handle);
            match guard.as_pointer(pointer_id) {
                Ok(pointer) => (pointer.cursor_surface, pointer.hotspot),
                Err(_) => return,
            }
        };
        let Some(cursor) = cursor else { return };
        let at = area.min + *lock(&self.pointer_local) - hotspot;
        self.render_surface(frame, area, cursor, at, Point::new(0, 0), 0);
    }
}

impl TopLevelWindow for ClientWindow {
    fn index(&self) -> WindowId {
        self.id
    }

    fn owner(&self) -> ClientId {
        self.owner
    }

    fn render(&self, frame: &mut Canvas, area: Rect) {
        let Ok(handle) = self.conn.registry().get(self.shell_surface) else {
            return;
        };
        if let Err(err) = shell::resize(&self.conn, &handle, self.shell_surface, area.dx(), area.dy())
        {
            debug!("window {:?}: resize failed: {}", self.id, err);
        }
        let (surface, crop, popups) = {
            let guard = lock(&handle);
            match guard.as_shell_surface(self.shell_surface) {
                Ok(shell) => (shell.surface, shell.window_geometry.min, shell.popups.clone()),
                Err(_) => return,
            }
        };
        self.render_surface(frame, area, surface, area.min, crop, 0);
        self.render_popups(frame, area, &popups);
        self.render_cursor(frame, area);
    }

    fn keyboard_event(&self, ev: KeyboardEvent) {
        let kb = {
            let mut kb = lock(&self.kb);
            kb.apply(ev);
            kb.clone()
        };
        if let Err(err) = crate::protocol::seat::keyboard_event(&self.conn, ev, &kb) {
            debug!("window {:?}: keyboard delivery failed: {}", self.id, err);
        }
    }

    fn pointer_event(&self, pointer: PointerSample, kb: &KeyboardState, ev: PointerEvent) -> bool {
        *lock(&self.pointer_local) = pointer.local;
        *lock(&self.has_pointer) = true;
        if let Err(err) =
            shell::route_pointer(&self.conn, self.shell_surface, pointer.local, kb, ev)
        {
            debug!("window {:?}: pointer delivery failed: {}", self.id, err);
        }
        true
    }

    fn pointer_leave(&self) {
        *lock(&self.has_pointer) = false;
        if let Err(err) = shell::pointer_left(&self.conn) {
            debug!("window {:?}: pointer leave failed: {}", self.id, err);
        }
    }

    fn ack_frame(&self) {
        // Frame callbacks fire at commit time, nothing to do per frame.
    }
}
