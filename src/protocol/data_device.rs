//! wl_data_device_manager, wl_data_device, wl_data_source
//!
//! Enough of the data-device family to keep clipboard-aware clients
//! happy: sources record their offered mime types and the device records
//! the current selection. Nothing is ever transferred between clients.

use std::sync::Arc;

use log::debug;

use crate::error::ProtocolError;
use crate::lock;
use crate::protocol::registry::{Object, ObjectRef};
use crate::protocol::wire::Message;
use crate::server::connection::Connection;

pub struct DataSource {
    pub mime_types: Vec<String>,
}

pub struct DataDevice {
    pub seat: u32,
    pub selection: Option<u32>,
}

pub fn handle_manager(
    conn: &Arc<Connection>,
    _id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // create_data_source
        0 => {
            let new_id = r.u32("new_id")?;
            conn.registry()
                .insert(new_id, Object::DataSource(DataSource { mime_types: Vec::new() }));
            Ok(())
        }
        // get_data_device
        1 => {
            let new_id = r.u32("new_id")?;
            let seat = r.u32("seat")?;
            conn.registry().insert(
                new_id,
                Object::DataDevice(DataDevice {
                    seat,
                    selection: None,
                }),
            );
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_data_device_manager",
            opcode,
        }),
    }
}

pub fn handle_source(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // offer
        0 => {
            let mime = r.string("mime_type")?;
            lock(object).as_data_source_mut(id)?.mime_types.push(mime);
            Ok(())
        }
        // destroy
        1 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // set_actions: drag-and-drop is not offered, the hint is dropped
        2 => {
            let _actions = r.u32("dnd_actions")?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_data_source",
            opcode,
        }),
    }
}

pub fn handle_device(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // start_drag: accepted and ignored, window moves are a compositor chord
        0 => Ok(()),
        // set_selection
        1 => {
            let source = r.u32("source")?;
            let _serial = r.u32("serial")?;
            debug!("data_device#{}: selection -> source#{}", id, source);
            lock(object).as_data_device_mut(id)?.selection =
                if source == 0 { None } else { Some(source) };
            Ok(())
        }
        // release
        2 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_data_device",
            opcode,
        }),
    }
}
