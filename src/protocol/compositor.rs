//! wl_compositor, wl_subcompositor, wp_viewporter
//!
//! The factories. Surfaces and regions come from wl_compositor,
//! subsurfaces from wl_subcompositor, and viewports from wp_viewporter.
//! Viewports are bound but their crop and scale state is ignored; the
//! pipeline composes at buffer scale only.

use std::sync::Arc;

use crate::error::ProtocolError;
use crate::protocol::region::Region;
use crate::protocol::registry::{Object, ObjectRef};
use crate::protocol::surface;
use crate::protocol::wire::Message;
use crate::server::connection::Connection;

pub fn handle_compositor(
    conn: &Arc<Connection>,
    _id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // create_surface
        0 => {
            let new_id = r.u32("new_id")?;
            surface::create(conn, new_id);
            Ok(())
        }
        // create_region
        1 => {
            let new_id = r.u32("new_id")?;
            conn.registry().insert(new_id, Object::Region(Region::new()));
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_compositor",
            opcode,
        }),
    }
}

pub fn handle_subcompositor(
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
        // get_subsurface
        1 => {
            let new_id = r.u32("new_id")?;
            let surface_id = r.u32("surface")?;
            let parent = r.u32("parent")?;
            surface::create_sub(conn, new_id, surface_id, parent)
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_subcompositor",
            opcode,
        }),
    }
}

pub fn handle_viewporter(
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
        // get_viewport
        1 => {
            let new_id = r.u32("new_id")?;
            let _surface = r.u32("surface")?;
            conn.registry().insert(new_id, Object::Viewport);
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wp_viewporter",
            opcode,
        }),
    }
}

pub fn handle_viewport(
    conn: &Arc<Connection>,
    id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    match msg.opcode {
        // destroy
        0 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // set_source / set_destination: crop and scale are not applied
        1 | 2 => Ok(()),
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wp_viewport",
            opcode,
        }),
    }
}
