//! Wire protocol: codec, object registry, and per-interface handlers.

pub mod compositor;
pub mod data_device;
pub mod display;
pub mod output;
pub mod region;
pub mod registry;
pub mod seat;
pub mod shell;
pub mod shm;
pub mod surface;
pub mod wire;

use std::sync::Arc;

use log::trace;

use crate::error::ProtocolError;
use crate::lock;
use crate::protocol::registry::Kind;
use crate::protocol::wire::Message;
use crate::server::connection::Connection;

/// Route one decoded request to its object's handler. The object's kind
/// is read under a short lock; the handler relocks as needed.
pub fn dispatch(conn: &Arc<Connection>, msg: &Message) -> Result<(), ProtocolError> {
    let object = conn.registry().get(msg.object_id)?;
    let kind = lock(&object).kind();
    trace!(
        "client {:?}: #{} ({:?}) opcode {}",
        conn.id(),
        msg.object_id,
        kind,
        msg.opcode
    );
    let id = msg.object_id;
    match kind {
        Kind::Display => display::handle_display(conn, id, &object, msg),
        Kind::Registry => display::handle_registry(conn, id, &object, msg),
        Kind::Compositor => compositor::handle_compositor(conn, id, &object, msg),
        Kind::SubCompositor => compositor::handle_subcompositor(conn, id, &object, msg),
        Kind::Region => region::handle(conn, id, &object, msg),
        Kind::Surface => surface::handle_surface(conn, id, &object, msg),
        Kind::SubSurface => surface::handle_subsurface(conn, id, &object, msg),
        Kind::Shm => shm::handle_shm(conn, id, &object, msg),
        Kind::Pool => shm::handle_pool(conn, id, &object, msg),
        Kind::Buffer => shm::handle_buffer(conn, id, &object, msg),
        Kind::Seat => seat::handle_seat(conn, id, &object, msg),
        Kind::Keyboard => seat::handle_keyboard(conn, id, &object, msg),
        Kind::Pointer => seat::handle_pointer(conn, id, &object, msg),
        Kind::DataDeviceManager => data_device::handle_manager(conn, id, &object, msg),
        Kind::DataDevice => data_device::handle_device(conn, id, &object, msg),
        Kind::DataSource => data_device::handle_source(conn, id, &object, msg),
        Kind::Output => output::handle(conn, id, &object, msg),
        Kind::ShellBase => shell::handle_shell_base(conn, id, &object, msg),
        Kind::ShellSurface => shell::handle_shell_surface(conn, id, &object, msg),
        Kind::Toplevel => shell::handle_toplevel(conn, id, &object, msg),
        Kind::Popup => shell::handle_popup(conn, id, &object, msg),
        Kind::Positioner => shell::handle_positioner(conn, id, &object, msg),
        Kind::Viewporter => compositor::handle_viewporter(conn, id, &object, msg),
        Kind::Viewport => compositor::handle_viewport(conn, id, &object, msg),
        Kind::Null => Err(ProtocolError::UnknownObject(id)),
    }
}
