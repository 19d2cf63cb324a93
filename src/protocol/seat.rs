//! wl_seat, wl_keyboard, wl_pointer
//!
//! One seat per connection regardless of how many times the global is
//! bound; later binds alias the same object under the new id so focus and
//! serial state stay shared. The seat advertises pointer and keyboard
//! capabilities and routes events to whichever surface holds focus.

use std::os::fd::AsFd;
use std::sync::Arc;

use log::debug;
use rustix::fs::{memfd_create, MemfdFlags};

use crate::compositor::geometry::Point;
use crate::error::ProtocolError;
use crate::input::{KeyboardEvent, KeyboardState};
use crate::lock;
use crate::protocol::registry::{Kind, Object, ObjectRef};
use crate::protocol::wire::{Message, MessageBuilder};
use crate::server::connection::{now_millis, Connection};

const CAP_POINTER: u32 = 0x01;
const CAP_KEYBOARD: u32 = 0x02;

pub struct Seat {
    pub keyboard: Option<u32>,
    pub pointer: Option<u32>,
    /// xdg_surface currently under the pointer.
    pub pointer_focus: Option<u32>,
    /// wl_surface holding keyboard focus.
    pub keyboard_focus: Option<u32>,
    serial: u32,
}

impl Seat {
    pub fn new() -> Self {
        Self {
            keyboard: None,
            pointer: None,
            pointer_focus: None,
            keyboard_focus: None,
            serial: 0,
        }
    }

    pub fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }
}

impl Default for Seat {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Keyboard;

pub struct Pointer {
    pub cursor_surface: Option<u32>,
    pub hotspot: Point,
}

/// Bind the seat global. A rebind aliases the existing seat object so
/// both ids observe the same focus state.
pub fn bind(conn: &Arc<Connection>, new_id: u32) -> Result<(), ProtocolError> {
    match conn.find_kind(Kind::Seat) {
        Some((_, handle)) => {
            debug!("seat: rebound as #{}", new_id);
            conn.registry().insert_handle(new_id, handle);
        }
        None => {
            conn.registry().insert(new_id, Object::Seat(Seat::new()));
        }
    }
    conn.send(
        &MessageBuilder::new(new_id, 0)
            .u32(CAP_POINTER | CAP_KEYBOARD)
            .build(),
    )?;
    conn.send(&MessageBuilder::new(new_id, 1).string("seat0").build())?;
    Ok(())
}

pub fn handle_seat(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // get_pointer
        0 => {
            let new_id = r.u32("new_id")?;
            conn.registry().insert(
                new_id,
                Object::Pointer(Pointer {
                    cursor_surface: None,
                    hotspot: Point::new(0, 0),
                }),
            );
            lock(object).as_seat_mut(id)?.pointer = Some(new_id);
            Ok(())
        }
        // get_keyboard
        1 => {
            let new_id = r.u32("new_id")?;
            conn.registry().insert(new_id, Object::Keyboard(Keyboard));
            lock(object).as_seat_mut(id)?.keyboard = Some(new_id);
            // No keymap is offered; clients fall back to their own tables.
            // The descriptor still has to be real for strict clients.
            let fd = memfd_create("tessera-keymap", MemfdFlags::CLOEXEC)
                .map_err(|e| ProtocolError::Resource(format!("keymap memfd: {e}")))?;
            let keymap = MessageBuilder::new(new_id, 0).u32(0).u32(0).build();
            conn.send_with_fd(&keymap, fd.as_fd())?;
            Ok(())
        }
        // release
        3 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_seat",
            opcode,
        }),
    }
}

pub fn handle_pointer(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // set_cursor
        0 => {
            let _serial = r.u32("serial")?;
            let surface = r.u32("surface")?;
            let x = r.i32("hotspot_x")?;
            let y = r.i32("hotspot_y")?;
            let mut guard = lock(object);
            let pointer = guard.as_pointer_mut(id)?;
            pointer.cursor_surface = if surface == 0 { None } else { Some(surface) };
            pointer.hotspot = Point::new(x, y);
            Ok(())
        }
        // release
        1 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_pointer",
            opcode,
        }),
    }
}

pub fn handle_keyboard(
    conn: &Arc<Connection>,
    id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    match msg.opcode {
        // release
        0 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_keyboard",
            opcode,
        }),
    }
}

/// Move keyboard focus to `surface`, emitting leave and enter. The enter
/// carries the keys currently held so the client starts from true state.
pub fn focus_keyboard(
    conn: &Arc<Connection>,
    surface: u32,
    kb: &KeyboardState,
) -> Result<(), ProtocolError> {
    let Some((seat_id, seat_ref)) = conn.find_kind(Kind::Seat) else {
        return Ok(());
    };
    let mut events = Vec::new();
    {
        let mut guard = lock(&seat_ref);
        let seat = guard.as_seat_mut(seat_id)?;
        let Some(keyboard) = seat.keyboard else {
            return Ok(());
        };
        if seat.keyboard_focus == Some(surface) {
            return Ok(());
        }
        if let Some(prev) = seat.keyboard_focus {
            let serial = seat.next_serial();
            events.push(MessageBuilder::new(keyboard, 2).u32(serial).u32(prev).build());
        }
        let serial = seat.next_serial();
        events.push(
            MessageBuilder::new(keyboard, 1)
                .u32(serial)
                .u32(surface)
                .array_u32(kb.down_keys())
                .build(),
        );
        let serial = seat.next_serial();
        events.push(modifiers_event(keyboard, serial, kb));
        seat.keyboard_focus = Some(surface);
    }
    send_all(conn, events)
}

/// Deliver a key press or release to the focused surface.
pub fn keyboard_event(
    conn: &Arc<Connection>,
    ev: KeyboardEvent,
    kb: &KeyboardState,
) -> Result<(), ProtocolError> {
    let Some((seat_id, seat_ref)) = conn.find_kind(Kind::Seat) else {
        return Ok(());
    };
    let mut events = Vec::new();
    {
        let mut guard = lock(&seat_ref);
        let seat = guard.as_seat_mut(seat_id)?;
        let (Some(keyboard), Some(_)) = (seat.keyboard, seat.keyboard_focus) else {
            return Ok(());
        };
        let serial = seat.next_serial();
        events.push(
            MessageBuilder::new(keyboard, 3)
                .u32(serial)
                .u32(now_millis())
                .u32(ev.key)
                .u32(ev.pressed as u32)
                .build(),
        );
        let serial = seat.next_serial();
        events.push(modifiers_event(keyboard, serial, kb));
    }
    send_all(conn, events)
}

pub fn send_all(conn: &Arc<Connection>, events: Vec<Vec<u8>>) -> Result<(), ProtocolError> {
    for event in events {
        conn.send(&event)?;
    }
    Ok(())
}

pub fn modifiers_event(keyboard: u32, serial: u32, kb: &KeyboardState) -> Vec<u8> {
    MessageBuilder::new(keyboard, 4)
        .u32(serial)
        .u32(kb.modifiers().bits())
        .u32(0)
        .u32(0)
        .u32(0)
        .build()
}

pub fn pointer_enter_event(pointer: u32, serial: u32, surface: u32, p: Point) -> Vec<u8> {
    MessageBuilder::new(pointer, 0)
        .u32(serial)
        .u32(surface)
        .fixed(p.x as f64)
        .fixed(p.y as f64)
        .build()
}

pub fn pointer_leave_event(pointer: u32, serial: u32, surface: u32) -> Vec<u8> {
    MessageBuilder::new(pointer, 1).u32(serial).u32(surface).build()
}

pub fn pointer_motion_event(pointer: u32, p: Point) -> Vec<u8> {
    MessageBuilder::new(pointer, 2)
        .u32(now_millis())
        .fixed(p.x as f64)
        .fixed(p.y as f64)
        .build()
}

pub fn pointer_button_event(pointer: u32, serial: u32, button: u32, pressed: bool) -> Vec<u8> {
    MessageBuilder::new(pointer, 3)
        .u32(serial)
        .u32(now_millis())
        .u32(button)
        .u32(pressed as u32)
        .build()
}

pub fn pointer_axis_event(pointer: u32, axis: u32, value: f32) -> Vec<u8> {
    MessageBuilder::new(pointer, 4)
        .u32(now_millis())
        .u32(axis)
        .fixed(value as f64)
        .build()
}

pub fn pointer_frame_event(pointer: u32) -> Vec<u8> {
    MessageBuilder::new(pointer, 5).build()
}
