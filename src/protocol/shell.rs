//! xdg_wm_base, xdg_surface, xdg_toplevel, xdg_popup, xdg_positioner
//!
//! The shell layer turns surfaces into windows. A toplevel hands its
//! shell surface to the workspace as a [`ClientWindow`]; popups hang off
//! their parent in a chain (each shell surface knows its one open child
//! popup) and the root toplevel keeps the full list for rendering.
//!
//! Configure flow: the render thread calls [`resize`] every frame with
//! the slot the workspace granted; the event burst only goes out when the
//! size actually changed and the previous configure was acked.
//!
//! Lock order: a seat lock may nest registry and shell-surface locks,
//! never the other way around.

use std::sync::Arc;

use log::debug;

use crate::compositor::geometry::{Point, Rect};
use crate::compositor::WindowId;
use crate::error::ProtocolError;
use crate::input::{KeyboardState, PointerEvent};
use crate::lock;
use crate::protocol::registry::{Kind, Object, ObjectRef};
use crate::protocol::seat;
use crate::protocol::wire::{Message, MessageBuilder};
use crate::server::connection::Connection;
use crate::server::window::ClientWindow;

/// Cap on parent-chain and popup-chain walks; a client nesting deeper
/// gets its excess ignored rather than an unbounded loop.
const MAX_POPUP_DEPTH: usize = 16;

pub struct ShellSurface {
    pub surface: u32,
    pub toplevel: Option<u32>,
    pub popup_object: Option<u32>,
    pub positioner: Option<u32>,
    /// Parent xdg_surface, set for popups.
    pub parent: Option<u32>,
    /// The one open child popup's xdg_surface.
    pub popup: Option<u32>,
    /// On a root toplevel: every open popup below it, oldest first.
    pub popups: Vec<u32>,
    /// Placement relative to the parent's window geometry.
    pub offset: Point,
    pub window_geometry: Rect,
    pub configuring: bool,
    pub caps_sent: bool,
    pub last_size: Option<(i32, i32)>,
    pub window: Option<WindowId>,
    serial: u32,
}

impl ShellSurface {
    pub fn new(surface: u32) -> Self {
        Self {
            surface,
            toplevel: None,
            popup_object: None,
            positioner: None,
            parent: None,
            popup: None,
            popups: Vec::new(),
            offset: Point::new(0, 0),
            window_geometry: Rect::default(),
            configuring: false,
            caps_sent: false,
            last_size: None,
            window: None,
            serial: 0,
        }
    }

    fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }
}

pub struct Toplevel {
    pub shell_surface: u32,
    pub title: String,
    pub app_id: String,
}

pub struct Popup {
    pub shell_surface: u32,
    pub parent: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Positioner {
    pub size: Point,
    pub anchor_rect: Rect,
    pub anchor: u32,
    pub gravity: u32,
    pub constraint_adjustment: u32,
    pub offset: Point,
    pub reactive: bool,
}

impl Positioner {
    /// Where the popup lands relative to the parent's window geometry:
    /// the named corner of the anchor rectangle (center for edges and
    /// unset), shifted by the explicit offset.
    pub fn anchor_point(&self) -> Point {
        let r = self.anchor_rect;
        let base = match self.anchor {
            5 => r.min,
            6 => Point::new(r.min.x, r.max.y),
            7 => Point::new(r.max.x, r.min.y),
            8 => r.max,
            _ => Point::new((r.min.x + r.max.x) / 2, (r.min.y + r.max.y) / 2),
        };
        base + self.offset
    }
}

pub fn handle_shell_base(
    conn: &Arc<Connection>,
    id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy
        0 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // create_positioner
        1 => {
            let new_id = r.u32("new_id")?;
            conn.registry()
                .insert(new_id, Object::Positioner(Positioner::default()));
            Ok(())
        }
        // get_xdg_surface
        2 => {
            let new_id = r.u32("new_id")?;
            let surface = r.u32("surface")?;
            conn.registry()
                .insert(new_id, Object::ShellSurface(ShellSurface::new(surface)));
            Ok(())
        }
        // pong
        3 => {
            let _serial = r.u32("serial")?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "xdg_wm_base",
            opcode,
        }),
    }
}

pub fn handle_shell_surface(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy
        0 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // get_toplevel
        1 => {
            let new_id = r.u32("new_id")?;
            let window_id = conn.next_window_id();
            let surface = {
                let mut guard = lock(object);
                let shell = guard.as_shell_surface_mut(id)?;
                shell.toplevel = Some(new_id);
                shell.window = Some(window_id);
                shell.surface
            };
            conn.registry().insert(
                new_id,
                Object::Toplevel(Toplevel {
                    shell_surface: id,
                    title: String::new(),
                    app_id: String::new(),
                }),
            );
            debug!("shell: toplevel#{} -> {:?}", new_id, window_id);
            // No locks held past this point; the workspace takes over.
            conn.workspace()
                .add_window(Box::new(ClientWindow::new(window_id, conn.clone(), id)));
            seat::focus_keyboard(conn, surface, &KeyboardState::new())
        }
        // get_popup
        2 => {
            let new_id = r.u32("new_id")?;
            let parent = r.u32("parent")?;
            let positioner_id = r.u32("positioner")?;
            open_popup(conn, id, object, new_id, parent, positioner_id)
        }
        // set_window_geometry
        3 => {
            let x = r.i32("x")?;
            let y = r.i32("y")?;
            let w = r.i32("width")?;
            let h = r.i32("height")?;
            lock(object).as_shell_surface_mut(id)?.window_geometry = Rect::from_size(x, y, w, h);
            Ok(())
        }
        // ack_configure
        4 => {
            let _serial = r.u32("serial")?;
            lock(object).as_shell_surface_mut(id)?.configuring = false;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "xdg_surface",
            opcode,
        }),
    }
}

fn open_popup(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    new_id: u32,
    parent: u32,
    positioner_id: u32,
) -> Result<(), ProtocolError> {
    let positioner = {
        let handle = conn.registry().get(positioner_id)?;
        let guard = lock(&handle);
        *guard.as_positioner(positioner_id)?
    };
    let offset = positioner.anchor_point();

    {
        let mut guard = lock(object);
        let shell = guard.as_shell_surface_mut(id)?;
        shell.parent = Some(parent);
        shell.positioner = Some(positioner_id);
        shell.popup_object = Some(new_id);
        shell.offset = offset;
    }
    {
        let handle = conn.registry().get(parent)?;
        lock(&handle).as_shell_surface_mut(parent)?.popup = Some(id);
    }
    let root = root_of(conn, parent)?;
    {
        let handle = conn.registry().get(root)?;
        lock(&handle).as_shell_surface_mut(root)?.popups.push(id);
    }
    conn.registry().insert(
        new_id,
        Object::Popup(Popup {
            shell_surface: id,
            parent,
        }),
    );
    debug!("shell: popup#{} at {:?} under xdg_surface#{}", new_id, offset, parent);

    // Placement, then this surface's configure, then the parent's.
    conn.send(
        &MessageBuilder::new(new_id, 0)
            .i32(offset.x)
            .i32(offset.y)
            .i32(positioner.size.x)
            .i32(positioner.size.y)
            .build(),
    )?;
    send_configure(conn, object, id)?;
    let parent_ref = conn.registry().get(parent)?;
    send_configure(conn, &parent_ref, parent)
}

pub fn handle_toplevel(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy: the window leaves the workspace with it
        0 => {
            let shell_id = {
                let guard = lock(object);
                guard.as_toplevel(id)?.shell_surface
            };
            let window = match conn.registry().get(shell_id) {
                Ok(handle) => {
                    let mut guard = lock(&handle);
                    match guard.as_shell_surface_mut(shell_id) {
                        Ok(shell) => {
                            shell.toplevel = None;
                            shell.window.take()
                        }
                        Err(_) => None,
                    }
                }
                Err(_) => None,
            };
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            if let Some(window) = window {
                conn.workspace().remove_window(window);
            }
            Ok(())
        }
        // set_parent
        1 => {
            let _parent = r.u32("parent")?;
            Ok(())
        }
        // set_title
        2 => {
            let title = r.string("title")?;
            lock(object).as_toplevel_mut(id)?.title = title;
            Ok(())
        }
        // set_app_id
        3 => {
            let app_id = r.string("app_id")?;
            lock(object).as_toplevel_mut(id)?.app_id = app_id;
            Ok(())
        }
        // show_window_menu, move, resize, min/max sizes, (un)maximize,
        // (un)fullscreen, minimize: tiling ignores all of them
        4..=13 => Ok(()),
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "xdg_toplevel",
            opcode,
        }),
    }
}

pub fn handle_popup(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy: unlink from the chain and the root's list
        0 => {
            let (shell_id, parent) = {
                let guard = lock(object);
                let popup = guard.as_popup(id)?;
                (popup.shell_surface, popup.parent)
            };
            if let Ok(handle) = conn.registry().get(parent) {
                let mut guard = lock(&handle);
                if let Ok(shell) = guard.as_shell_surface_mut(parent) {
                    if shell.popup == Some(shell_id) {
                        shell.popup = None;
                    }
                }
            }
            if let Ok(root) = root_of(conn, parent) {
                if let Ok(handle) = conn.registry().get(root) {
                    let mut guard = lock(&handle);
                    if let Ok(shell) = guard.as_shell_surface_mut(root) {
                        shell.popups.retain(|p| *p != shell_id);
                    }
                }
            }
            if let Ok(handle) = conn.registry().get(shell_id) {
                let mut guard = lock(&handle);
                if let Ok(shell) = guard.as_shell_surface_mut(shell_id) {
                    shell.popup_object = None;
                    shell.popup = None;
                }
            }
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // grab: keyboard focus moves into the popup
        1 => {
            let _seat = r.u32("seat")?;
            let _serial = r.u32("serial")?;
            let surface = {
                let guard = lock(object);
                let shell_id = guard.as_popup(id)?.shell_surface;
                drop(guard);
                let handle = conn.registry().get(shell_id)?;
                let guard = lock(&handle);
                guard.as_shell_surface(shell_id)?.surface
            };
            seat::focus_keyboard(conn, surface, &KeyboardState::new())
        }
        // reposition
        2 => {
            let positioner_id = r.u32("positioner")?;
            let token = r.u32("token")?;
            let positioner = {
                let handle = conn.registry().get(positioner_id)?;
                let guard = lock(&handle);
                *guard.as_positioner(positioner_id)?
            };
            let offset = positioner.anchor_point();
            let shell_id = {
                let guard = lock(object);
                guard.as_popup(id)?.shell_surface
            };
            let shell_ref = conn.registry().get(shell_id)?;
            {
                let mut guard = lock(&shell_ref);
                let shell = guard.as_shell_surface_mut(shell_id)?;
                shell.positioner = Some(positioner_id);
                shell.offset = offset;
            }
            conn.send(&MessageBuilder::new(id, 2).u32(token).build())?;
            conn.send(
                &MessageBuilder::new(id, 0)
                    .i32(offset.x)
                    .i32(offset.y)
                    .i32(positioner.size.x)
                    .i32(positioner.size.y)
                    .build(),
            )?;
            send_configure(conn, &shell_ref, shell_id)
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "xdg_popup",
            opcode,
        }),
    }
}

pub fn handle_positioner(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy
        0 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // set_size
        1 => {
            let w = r.i32("width")?;
            let h = r.i32("height")?;
            lock(object).as_positioner_mut(id)?.size = Point::new(w, h);
            Ok(())
        }
        // set_anchor_rect
        2 => {
            let x = r.i32("x")?;
            let y = r.i32("y")?;
            let w = r.i32("width")?;
            let h = r.i32("height")?;
            lock(object).as_positioner_mut(id)?.anchor_rect = Rect::from_size(x, y, w, h);
            Ok(())
        }
        // set_anchor
        3 => {
            lock(object).as_positioner_mut(id)?.anchor = r.u32("anchor")?;
            Ok(())
        }
        // set_gravity
        4 => {
            lock(object).as_positioner_mut(id)?.gravity = r.u32("gravity")?;
            Ok(())
        }
        // set_constraint_adjustment
        5 => {
            lock(object).as_positioner_mut(id)?.constraint_adjustment =
                r.u32("constraint_adjustment")?;
            Ok(())
        }
        // set_offset
        6 => {
            let x = r.i32("x")?;
            let y = r.i32("y")?;
            lock(object).as_positioner_mut(id)?.offset = Point::new(x, y);
            Ok(())
        }
        // set_reactive
        7 => {
            lock(object).as_positioner_mut(id)?.reactive = true;
            Ok(())
        }
        // set_parent_size, set_parent_configure: hints for constraint
        // solving we do not perform
        8 | 9 => Ok(()),
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "xdg_positioner",
            opcode,
        }),
    }
}

/// Emit xdg_surface.configure with a fresh serial.
fn send_configure(conn: &Arc<Connection>, object: &ObjectRef, id: u32) -> Result<(), ProtocolError> {
    let serial = {
        let mut guard = lock(object);
        let shell = guard.as_shell_surface_mut(id)?;
        shell.configuring = true;
        shell.next_serial()
    };
    conn.send(&MessageBuilder::new(id, 0).u32(serial).build())?;
    Ok(())
}

/// Called by the render thread each frame with the granted slot size.
/// Sends the toplevel/surface configure pair when the size changed and
/// the client has acked the previous one.
pub fn resize(
    conn: &Arc<Connection>,
    object: &ObjectRef,
    id: u32,
    width: i32,
    height: i32,
) -> Result<(), ProtocolError> {
    let mut events = Vec::new();
    {
        let mut guard = lock(object);
        let shell = guard.as_shell_surface_mut(id)?;
        let Some(toplevel) = shell.toplevel else {
            return Ok(());
        };
        if shell.configuring || shell.last_size == Some((width, height)) {
            return Ok(());
        }
        shell.last_size = Some((width, height));
        if !shell.caps_sent {
            shell.caps_sent = true;
            events.push(MessageBuilder::new(toplevel, 3).array_u32(&[]).build());
        }
        events.push(
            MessageBuilder::new(toplevel, 0)
                .i32(width)
                .i32(height)
                .array_u32(&[])
                .build(),
        );
        shell.configuring = true;
        let serial = shell.next_serial();
        events.push(MessageBuilder::new(id, 0).u32(serial).build());
    }
    seat::send_all(conn, events)
}

/// Walk up to the root toplevel of a popup chain.
pub fn root_of(conn: &Arc<Connection>, mut id: u32) -> Result<u32, ProtocolError> {
    for _ in 0..MAX_POPUP_DEPTH {
        let handle = conn.registry().get(id)?;
        let parent = {
            let guard = lock(&handle);
            guard.as_shell_surface(id)?.parent
        };
        match parent {
            Some(parent) => id = parent,
            None => return Ok(id),
        }
    }
    Ok(id)
}

/// Position of a shell surface's content origin in root-window
/// coordinates: each popup level contributes its placement offset minus
/// its window-geometry origin.
pub fn relative_offset(conn: &Arc<Connection>, mut id: u32) -> Result<Point, ProtocolError> {
    let mut acc = Point::new(0, 0);
    for _ in 0..MAX_POPUP_DEPTH {
        let handle = conn.registry().get(id)?;
        let (offset, geo_min, parent) = {
            let guard = lock(&handle);
            let shell = guard.as_shell_surface(id)?;
            (shell.offset, shell.window_geometry.min, shell.parent)
        };
        match parent {
            Some(parent) => {
                acc = acc + offset - geo_min;
                id = parent;
            }
            None => return Ok(acc),
        }
    }
    Ok(acc)
}

/// The size a popup claims, from its positioner.
fn popup_size(conn: &Arc<Connection>, positioner: Option<u32>) -> Point {
    let Some(positioner) = positioner else {
        return Point::new(0, 0);
    };
    let Ok(handle) = conn.registry().get(positioner) else {
        return Point::new(0, 0);
    };
    let guard = lock(&handle);
    guard
        .as_positioner(positioner)
        .map(|p| p.size)
        .unwrap_or(Point::new(0, 0))
}

/// Whether the surface's committed input region admits the point.
fn input_allowed(conn: &Arc<Connection>, surface: u32, p: Point) -> bool {
    let Ok(handle) = conn.registry().get(surface) else {
        return true;
    };
    let region = {
        let guard = lock(&handle);
        match guard.as_surface(surface) {
            Ok(s) => s.input_region(),
            Err(_) => None,
        }
    };
    let Some(region) = region else {
        return true;
    };
    let Ok(handle) = conn.registry().get(region) else {
        return true;
    };
    let guard = lock(&handle);
    guard
        .as_region(region)
        .map(|r| r.allows_input(p))
        .unwrap_or(true)
}

/// Descend the open-popup chain from the root toplevel; the deepest
/// popup containing the point takes focus. When no popup intersects and
/// the root's committed input region subtracts the point, nothing does.
/// Returns the focused xdg_surface and the point translated into its
/// coordinates, or `None` when the point lands outside every level.
pub fn deepest_at(
    conn: &Arc<Connection>,
    root: u32,
    point: Point,
) -> Result<Option<(u32, Point)>, ProtocolError> {
    let mut id = root;
    let mut local = point;
    for _ in 0..MAX_POPUP_DEPTH {
        let handle = conn.registry().get(id)?;
        let child = {
            let guard = lock(&handle);
            guard.as_shell_surface(id)?.popup
        };
        let Some(child) = child else { break };
        let child_ref = conn.registry().get(child)?;
        let (offset, geo_min, positioner, surface) = {
            let guard = lock(&child_ref);
            let shell = guard.as_shell_surface(child)?;
            (shell.offset, shell.window_geometry.min, shell.positioner, shell.surface)
        };
        let origin = offset - geo_min;
        let size = popup_size(conn, positioner);
        let bounds = Rect::from_size(origin.x, origin.y, size.x, size.y);
        let child_local = local - origin;
        if bounds.contains(local) && input_allowed(conn, surface, child_local) {
            id = child;
            local = child_local;
        } else {
            break;
        }
    }
    if id == root {
        let (surface, geo_min) = {
            let handle = conn.registry().get(root)?;
            let guard = lock(&handle);
            let shell = guard.as_shell_surface(root)?;
            (shell.surface, shell.window_geometry.min)
        };
        if !input_allowed(conn, surface, local + geo_min) {
            return Ok(None);
        }
    }
    Ok(Some((id, local)))
}

fn surface_of(conn: &Arc<Connection>, shell: u32) -> Option<u32> {
    let handle = conn.registry().get(shell).ok()?;
    let guard = lock(&handle);
    guard.as_shell_surface(shell).ok().map(|s| s.surface)
}

/// Deliver a pointer event to whatever is under the cursor inside this
/// root window, issuing enter/leave as focus shifts. A point every level
/// rejects clears pointer focus with a single leave. Keyboard focus
/// follows the pointer.
pub fn route_pointer(
    conn: &Arc<Connection>,
    root: u32,
    local: Point,
    kb: &KeyboardState,
    ev: PointerEvent,
) -> Result<(), ProtocolError> {
    let Some((target, target_local)) = deepest_at(conn, root, local)? else {
        return pointer_left(conn);
    };
    let Some(target_surface) = surface_of(conn, target) else {
        return Ok(());
    };
    let Some((seat_id, seat_ref)) = conn.find_kind(Kind::Seat) else {
        return Ok(());
    };
    let mut events = Vec::new();
    {
        let mut guard = lock(&seat_ref);
        let seat = guard.as_seat_mut(seat_id)?;
        let Some(pointer) = seat.pointer else {
            return Ok(());
        };
        if seat.pointer_focus != Some(target) {
            if let Some(prev) = seat.pointer_focus {
                if let Some(prev_surface) = surface_of(conn, prev) {
                    let serial = seat.next_serial();
                    events.push(seat::pointer_leave_event(pointer, serial, prev_surface));
                }
            }
            let serial = seat.next_serial();
            events.push(seat::pointer_enter_event(
                pointer,
                serial,
                target_surface,
                target_local,
            ));
            seat.pointer_focus = Some(target);
        }
        match ev {
            PointerEvent::Motion => {
                events.push(seat::pointer_motion_event(pointer, target_local));
            }
            PointerEvent::Button { button, pressed } => {
                let serial = seat.next_serial();
                events.push(seat::pointer_button_event(pointer, serial, button, pressed));
            }
            PointerEvent::Axis { axis, value } => {
                events.push(seat::pointer_axis_event(pointer, axis, value));
            }
        }
        events.push(seat::pointer_frame_event(pointer));
    }
    seat::send_all(conn, events)?;
    seat::focus_keyboard(conn, target_surface, kb)
}

/// The pointer left the whole window; drop focus and tell the client.
pub fn pointer_left(conn: &Arc<Connection>) -> Result<(), ProtocolError> {
    let Some((seat_id, seat_ref)) = conn.find_kind(Kind::Seat) else {
        return Ok(());
    };
    let mut events = Vec::new();
    {
        let mut guard = lock(&seat_ref);
        let seat = guard.as_seat_mut(seat_id)?;
        let (Some(pointer), Some(prev)) = (seat.pointer, seat.pointer_focus.take()) else {
            return Ok(());
        };
        if let Some(prev_surface) = surface_of(conn, prev) {
            let serial = seat.next_serial();
            events.push(seat::pointer_leave_event(pointer, serial, prev_surface));
            events.push(seat::pointer_frame_event(pointer));
        }
    }
    seat::send_all(conn, events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_point_corners() {
        let mut pos = Positioner {
            anchor_rect: Rect::new(10, 20, 30, 40),
            ..Positioner::default()
        };
        pos.anchor = 5;
        assert_eq!(pos.anchor_point(), Point::new(10, 20));
        pos.anchor = 6;
        assert_eq!(pos.anchor_point(), Point::new(10, 40));
        pos.anchor = 7;
        assert_eq!(pos.anchor_point(), Point::new(30, 20));
        pos.anchor = 8;
        assert_eq!(pos.anchor_point(), Point::new(30, 40));
    }

    #[test]
    fn test_anchor_point_defaults_to_center() {
        let pos = Positioner {
            anchor_rect: Rect::new(0, 0, 10, 10),
            offset: Point::new(1, 2),
            ..Positioner::default()
        };
        assert_eq!(pos.anchor_point(), Point::new(6, 7));
    }

    #[test]
    fn test_shell_surface_serials() {
        let mut shell = ShellSurface::new(9);
        assert_eq!(shell.next_serial(), 1);
        assert_eq!(shell.next_serial(), 2);
    }
}
