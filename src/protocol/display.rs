//! wl_display and wl_registry
//!
//! The bootstrap objects. `sync` answers immediately with a monotonically
//! increasing counter, and `get_registry` advertises the fixed global
//! table. Binding a global installs the concrete object and fires that
//! interface's initial event burst.

use std::sync::Arc;

use log::debug;

use crate::error::ProtocolError;
use crate::protocol::registry::{Object, ObjectRef};
use crate::protocol::wire::{Message, MessageBuilder};
use crate::protocol::{output, seat, shm};
use crate::server::connection::Connection;

/// The advertised globals: (name, interface, version).
pub const GLOBALS: &[(u32, &str, u32)] = &[
    (1, "wl_compositor", 5),
    (2, "wl_subcompositor", 1),
    (3, "wl_seat", 7),
    (4, "wl_shm", 1),
    (5, "xdg_wm_base", 2),
    (6, "wl_data_device_manager", 3),
    (7, "wl_output", 1),
    (8, "wp_viewporter", 1),
];

pub fn handle_display(
    conn: &Arc<Connection>,
    _id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // sync
        0 => {
            let callback = r.u32("callback")?;
            let serial = conn.next_sync();
            conn.send(&MessageBuilder::new(callback, 0).u32(serial).build())?;
            conn.delete_id(callback)?;
            Ok(())
        }
        // get_registry
        1 => {
            let new_id = r.u32("registry")?;
            conn.registry().insert(new_id, Object::Registry);
            for (name, interface, version) in GLOBALS {
                conn.send(
                    &MessageBuilder::new(new_id, 0)
                        .u32(*name)
                        .string(interface)
                        .u32(*version)
                        .build(),
                )?;
            }
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_display",
            opcode,
        }),
    }
}

pub fn handle_registry(
    conn: &Arc<Connection>,
    _id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // bind
        0 => {
            let name = r.u32("name")?;
            let interface = r.string("interface")?;
            let _version = r.u32("version")?;
            let new_id = r.u32("new_id")?;
            debug!("registry: bind {} (global {}) as #{}", interface, name, new_id);
            bind_global(conn, name, new_id)
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_registry",
            opcode,
        }),
    }
}

fn bind_global(conn: &Arc<Connection>, name: u32, new_id: u32) -> Result<(), ProtocolError> {
    match name {
        1 => {
            conn.registry().insert(new_id, Object::Compositor);
            Ok(())
        }
        2 => {
            conn.registry().insert(new_id, Object::SubCompositor);
            Ok(())
        }
        3 => seat::bind(conn, new_id),
        4 => {
            conn.registry().insert(new_id, Object::Shm);
            conn.send(&MessageBuilder::new(new_id, 0).u32(shm::FORMAT_ARGB).build())?;
            conn.send(&MessageBuilder::new(new_id, 0).u32(shm::FORMAT_XRGB).build())?;
            Ok(())
        }
        5 => {
            conn.registry().insert(new_id, Object::ShellBase);
            conn.set_ping_target(new_id);
            Ok(())
        }
        6 => {
            conn.registry().insert(new_id, Object::DataDeviceManager);
            Ok(())
        }
        7 => output::bind(conn, new_id),
        8 => {
            conn.registry().insert(new_id, Object::Viewporter);
            Ok(())
        }
        _ => Err(ProtocolError::Resource(format!("bind of unknown global {name}"))),
    }
}
