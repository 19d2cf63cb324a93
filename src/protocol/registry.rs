//! Object registry
//!
//! Each connection owns one registry: a table from client-chosen 32-bit
//! ids to protocol objects. Id 0 is the null object and id 1 the display;
//! everything else is created by requests. Inserting over an occupied id
//! drops the prior occupant, which runs its teardown (a pool unmaps, file
//! descriptors close).
//!
//! Objects are shared as `Arc<Mutex<Object>>`. The registry lock is only
//! ever held to fetch or insert handles; object locks are taken after it,
//! in target-then-referenced order, and never across a workspace call.
//! Scans over the table (find-the-seat and friends) therefore work on a
//! snapshot of handles taken under the registry lock and probed after it
//! is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::ProtocolError;
use crate::protocol::data_device::{DataDevice, DataSource};
use crate::protocol::region::Region;
use crate::protocol::seat::{Keyboard, Pointer, Seat};
use crate::protocol::shell::{Popup, Positioner, ShellSurface, Toplevel};
use crate::protocol::shm::{Buffer, Pool};
use crate::protocol::surface::{SubSurface, Surface};

pub type ObjectRef = Arc<Mutex<Object>>;

/// Every kind of object a client can hold a handle to.
pub enum Object {
    Null,
    Display,
    /// The bind surface created by `get_registry`.
    Registry,
    Compositor,
    SubCompositor,
    Region(Region),
    Surface(Surface),
    SubSurface(SubSurface),
    Shm,
    Pool(Pool),
    Buffer(Buffer),
    Seat(Seat),
    Keyboard(Keyboard),
    Pointer(Pointer),
    DataDeviceManager,
    DataDevice(DataDevice),
    DataSource(DataSource),
    Output,
    ShellBase,
    ShellSurface(ShellSurface),
    Toplevel(Toplevel),
    Popup(Popup),
    Positioner(Positioner),
    Viewporter,
    Viewport,
}

/// Discriminant of [`Object`], cheap to copy out of a short lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Display,
    Registry,
    Compositor,
    SubCompositor,
    Region,
    Surface,
    SubSurface,
    Shm,
    Pool,
    Buffer,
    Seat,
    Keyboard,
    Pointer,
    DataDeviceManager,
    DataDevice,
    DataSource,
    Output,
    ShellBase,
    ShellSurface,
    Toplevel,
    Popup,
    Positioner,
    Viewporter,
    Viewport,
}

macro_rules! accessors {
    ($ref_name:ident, $mut_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $ref_name(&self, id: u32) -> Result<&$ty, ProtocolError> {
            match self {
                Object::$variant(inner) => Ok(inner),
                _ => Err(ProtocolError::WrongObject {
                    id,
                    expected: $expected,
                }),
            }
        }

        pub fn $mut_name(&mut self, id: u32) -> Result<&mut $ty, ProtocolError> {
            match self {
                Object::$variant(inner) => Ok(inner),
                _ => Err(ProtocolError::WrongObject {
                    id,
                    expected: $expected,
                }),
            }
        }
    };
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Object::Null => Kind::Null,
            Object::Display => Kind::Display,
            Object::Registry => Kind::Registry,
            Object::Compositor => Kind::Compositor,
            Object::SubCompositor => Kind::SubCompositor,
            Object::Region(_) => Kind::Region,
            Object::Surface(_) => Kind::Surface,
            Object::SubSurface(_) => Kind::SubSurface,
            Object::Shm => Kind::Shm,
            Object::Pool(_) => Kind::Pool,
            Object::Buffer(_) => Kind::Buffer,
            Object::Seat(_) => Kind::Seat,
            Object::Keyboard(_) => Kind::Keyboard,
            Object::Pointer(_) => Kind::Pointer,
            Object::DataDeviceManager => Kind::DataDeviceManager,
            Object::DataDevice(_) => Kind::DataDevice,
            Object::DataSource(_) => Kind::DataSource,
            Object::Output => Kind::Output,
            Object::ShellBase => Kind::ShellBase,
            Object::ShellSurface(_) => Kind::ShellSurface,
            Object::Toplevel(_) => Kind::Toplevel,
            Object::Popup(_) => Kind::Popup,
            Object::Positioner(_) => Kind::Positioner,
            Object::Viewporter => Kind::Viewporter,
            Object::Viewport => Kind::Viewport,
        }
    }

    accessors!(as_region, as_region_mut, Region, Region, "wl_region");
    accessors!(as_surface, as_surface_mut, Surface, Surface, "wl_surface");
    accessors!(
        as_subsurface,
        as_subsurface_mut,
        SubSurface,
        SubSurface,
        "wl_subsurface"
    );
    accessors!(as_pool, as_pool_mut, Pool, Pool, "wl_shm_pool");
    accessors!(as_buffer, as_buffer_mut, Buffer, Buffer, "wl_buffer");
    accessors!(as_seat, as_seat_mut, Seat, Seat, "wl_seat");
    accessors!(as_pointer, as_pointer_mut, Pointer, Pointer, "wl_pointer");
    accessors!(
        as_keyboard,
        as_keyboard_mut,
        Keyboard,
        Keyboard,
        "wl_keyboard"
    );
    accessors!(
        as_shell_surface,
        as_shell_surface_mut,
        ShellSurface,
        ShellSurface,
        "xdg_surface"
    );
    accessors!(
        as_toplevel,
        as_toplevel_mut,
        Toplevel,
        Toplevel,
        "xdg_toplevel"
    );
    accessors!(as_popup, as_popup_mut, Popup, Popup, "xdg_popup");
    accessors!(
        as_positioner,
        as_positioner_mut,
        Positioner,
        Positioner,
        "xdg_positioner"
    );
    accessors!(
        as_data_device,
        as_data_device_mut,
        DataDevice,
        DataDevice,
        "wl_data_device"
    );
    accessors!(
        as_data_source,
        as_data_source_mut,
        DataSource,
        DataSource,
        "wl_data_source"
    );
}

pub struct Registry {
    objects: HashMap<u32, ObjectRef>,
}

impl Registry {
    pub fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert(0, Arc::new(Mutex::new(Object::Null)) as ObjectRef);
        objects.insert(1, Arc::new(Mutex::new(Object::Display)) as ObjectRef);
        Self { objects }
    }

    /// Bind `object` to `id`, destroying any prior occupant.
    pub fn insert(&mut self, id: u32, object: Object) -> ObjectRef {
        debug!("registry: new object #{}: {:?}", id, object.kind());
        let handle: ObjectRef = Arc::new(Mutex::new(object));
        self.objects.insert(id, handle.clone());
        handle
    }

    /// Bind `id` to an existing object, aliasing it. Used when a global
    /// that is singular per connection (the seat) is bound twice.
    pub fn insert_handle(&mut self, id: u32, handle: ObjectRef) {
        self.objects.insert(id, handle);
    }

    pub fn get(&self, id: u32) -> Result<ObjectRef, ProtocolError> {
        self.objects
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::UnknownObject(id))
    }

    /// Drop the binding for `id`; a no-op when absent.
    pub fn destroy(&mut self, id: u32) {
        self.objects.remove(&id);
    }

    /// Tear down every object. Pools unmap and descriptors close as the
    /// last handles drop.
    pub fn close(&mut self) {
        self.objects.clear();
    }

    /// Clone out every (id, handle) pair so callers can probe kinds
    /// without holding the registry lock.
    pub fn snapshot(&self) -> Vec<(u32, ObjectRef)> {
        self.objects.iter().map(|(id, obj)| (*id, obj.clone())).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        let reg = Registry::new();
        assert_eq!(reg.get(0).unwrap().lock().unwrap().kind(), Kind::Null);
        assert_eq!(reg.get(1).unwrap().lock().unwrap().kind(), Kind::Display);
        assert!(matches!(reg.get(2), Err(ProtocolError::UnknownObject(2))));
    }

    #[test]
    fn test_insert_replaces_prior() {
        let mut reg = Registry::new();
        let first = reg.insert(5, Object::Compositor);
        reg.insert(5, Object::Shm);
        assert_eq!(reg.get(5).unwrap().lock().unwrap().kind(), Kind::Shm);
        // The displaced handle is detached, not aliased.
        assert_eq!(first.lock().unwrap().kind(), Kind::Compositor);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut reg = Registry::new();
        reg.insert(9, Object::Compositor);
        reg.destroy(9);
        reg.destroy(9);
        assert!(reg.get(9).is_err());
    }

    #[test]
    fn test_wrong_object_accessor() {
        let obj = Object::Compositor;
        assert!(matches!(
            obj.as_surface(4),
            Err(ProtocolError::WrongObject { id: 4, expected: "wl_surface" })
        ));
    }
}
