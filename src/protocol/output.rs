//! wl_output
//!
//! A single fixed output describing the render sink. Everything a client
//! needs arrives in the bind burst: geometry, the one current mode, scale
//! and the done marker.

use std::sync::Arc;

use crate::error::ProtocolError;
use crate::protocol::registry::{Object, ObjectRef};
use crate::protocol::wire::{Message, MessageBuilder};
use crate::server::connection::Connection;

const MODE_CURRENT: u32 = 0x1;
const MODE_PREFERRED: u32 = 0x2;
const SUBPIXEL_UNKNOWN: i32 = 0;
const TRANSFORM_NORMAL: i32 = 0;

pub fn bind(conn: &Arc<Connection>, new_id: u32) -> Result<(), ProtocolError> {
    conn.registry().insert(new_id, Object::Output);
    let (width, height) = conn.output_size();

    // geometry
    conn.send(
        &MessageBuilder::new(new_id, 0)
            .i32(0)
            .i32(0)
            .i32(width)
            .i32(height)
            .i32(SUBPIXEL_UNKNOWN)
            .string("tessera")
            .string("tessera")
            .i32(TRANSFORM_NORMAL)
            .build(),
    )?;
    // mode: the single current mode at a nominal 60Hz
    conn.send(
        &MessageBuilder::new(new_id, 1)
            .u32(MODE_CURRENT | MODE_PREFERRED)
            .i32(width)
            .i32(height)
            .i32(60_000)
            .build(),
    )?;
    // scale, then done
    conn.send(&MessageBuilder::new(new_id, 3).i32(1).build())?;
    conn.send(&MessageBuilder::new(new_id, 2).build())?;
    Ok(())
}

pub fn handle(
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
            interface: "wl_output",
            opcode,
        }),
    }
}
