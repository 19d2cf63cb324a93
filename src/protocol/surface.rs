//! wl_surface, wl_subsurface
//!
//! A surface accumulates pending state (attached buffer, damage, input
//! region) that becomes visible atomically on commit. Commit decodes the
//! attached shared-memory buffer into an owned [`Canvas`], so the pool
//! mapping is only touched on the connection's own thread and the render
//! thread composes from stable pixels.

use std::sync::Arc;

use log::{debug, trace};

use crate::compositor::canvas::Canvas;
use crate::compositor::geometry::{Point, Rect};
use crate::error::ProtocolError;
use crate::lock;
use crate::protocol::registry::{Kind, Object, ObjectRef};
use crate::protocol::shm::{self, Buffer};
use crate::protocol::wire::{Message, MessageBuilder, Reader};
use crate::server::connection::Connection;

/// What the client attached since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Attach {
    /// No attach request arrived; the committed content is kept.
    #[default]
    Keep,
    /// A null buffer was attached; commit unmaps the content.
    Clear,
    /// A wl_buffer was attached.
    Buffer(u32),
}

#[derive(Default)]
pub struct Surface {
    cached: Option<Canvas>,
    pending: Attach,
    damage: Vec<Rect>,
    frame_callbacks: Vec<u32>,
    pending_input_region: Option<u32>,
    input_region: Option<u32>,
    /// Subsurface object ids, oldest first.
    pub children: Vec<u32>,
    entered: bool,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(&self) -> Option<&Canvas> {
        self.cached.as_ref()
    }

    /// The committed input region, if one was set.
    pub fn input_region(&self) -> Option<u32> {
        self.input_region
    }
}

/// A child surface positioned relative to its parent.
pub struct SubSurface {
    pub surface: u32,
    pub parent: u32,
    pub position: Point,
    pub synced: bool,
}

pub fn handle_surface(
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
        // attach
        1 => {
            let buffer = r.u32("buffer")?;
            let _x = r.i32("x")?;
            let _y = r.i32("y")?;
            lock(object).as_surface_mut(id)?.pending = if buffer == 0 {
                Attach::Clear
            } else {
                Attach::Buffer(buffer)
            };
            Ok(())
        }
        // damage / damage_buffer: identical at buffer scale 1
        2 | 9 => {
            let rect = read_rect(&mut r)?;
            lock(object).as_surface_mut(id)?.damage.push(rect);
            Ok(())
        }
        // frame
        3 => {
            let callback = r.u32("callback")?;
            lock(object).as_surface_mut(id)?.frame_callbacks.push(callback);
            Ok(())
        }
        // set_opaque_region: a hint only, our blitter keys off the alpha byte
        4 => {
            let _region = r.u32("region")?;
            Ok(())
        }
        // set_input_region
        5 => {
            let region = r.u32("region")?;
            lock(object).as_surface_mut(id)?.pending_input_region =
                if region == 0 { None } else { Some(region) };
            Ok(())
        }
        // commit
        6 => commit(conn, id, object),
        // set_buffer_transform, set_buffer_scale, offset: accepted, unused
        7 | 8 | 10 => Ok(()),
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_surface",
            opcode,
        }),
    }
}

/// Apply pending state. Events (buffer release, frame done, enter) are
/// collected while locks are held and written after they drop.
fn commit(conn: &Arc<Connection>, id: u32, object: &ObjectRef) -> Result<(), ProtocolError> {
    let output = conn.find_kind(Kind::Output);
    let mut events: Vec<Vec<u8>> = Vec::new();

    let pending = {
        let mut guard = lock(object);
        let surface = guard.as_surface_mut(id)?;
        surface.input_region = surface.pending_input_region;
        std::mem::take(&mut surface.pending)
    };

    match pending {
        Attach::Keep => {}
        Attach::Clear => {
            let mut guard = lock(object);
            let surface = guard.as_surface_mut(id)?;
            surface.cached = None;
            surface.damage.clear();
        }
        Attach::Buffer(buffer_id) => {
            let buffer_ref = conn.registry().get(buffer_id)?;
            let desc = *lock(&buffer_ref).as_buffer(buffer_id)?;
            let pool_ref = conn.registry().get(desc.pool)?;

            let mut guard = lock(object);
            let surface = guard.as_surface_mut(id)?;
            let pool = lock(&pool_ref);
            decode_buffer(surface, pool.as_pool(desc.pool)?.bytes(), &desc)?;
            surface.damage.clear();
            events.push(MessageBuilder::new(buffer_id, 0).build());
        }
    }

    // Frame callbacks fire at commit; each serial is strictly increasing.
    let (callbacks, enter) = {
        let mut guard = lock(object);
        let surface = guard.as_surface_mut(id)?;
        let enter = if !surface.entered && surface.cached.is_some() {
            surface.entered = true;
            output.as_ref().map(|(output_id, _)| *output_id)
        } else {
            None
        };
        (std::mem::take(&mut surface.frame_callbacks), enter)
    };
    for callback in callbacks {
        let serial = conn.next_frame_serial();
        trace!("surface#{}: frame callback#{} done ({})", id, callback, serial);
        events.push(MessageBuilder::new(callback, 0).u32(serial).build());
        events.push(MessageBuilder::new(1, 1).u32(callback).build());
    }
    if let Some(output_id) = enter {
        debug!("surface#{}: enter output#{}", id, output_id);
        events.push(MessageBuilder::new(id, 0).u32(output_id).build());
    }

    for event in events {
        conn.send(&event)?;
    }
    Ok(())
}

/// Decode the attached buffer out of the pool mapping into the surface's
/// canvas, patching damage rows in place when the cached canvas still
/// matches the buffer extent.
fn decode_buffer(
    surface: &mut Surface,
    pool_bytes: &[u8],
    desc: &Buffer,
) -> Result<(), ProtocolError> {
    let len = (desc.stride as u64)
        .checked_mul(desc.height as u64)
        .and_then(|n| n.checked_add(desc.offset as u64))
        .ok_or_else(|| ProtocolError::Resource("buffer extent overflow".into()))?;
    if len > pool_bytes.len() as u64 || len > shm::MAX_BUFFER_BYTES {
        return Err(ProtocolError::Resource(format!(
            "buffer needs {} bytes, pool holds {}",
            len,
            pool_bytes.len()
        )));
    }
    let src = &pool_bytes[desc.offset as usize..];
    let stride = desc.stride as usize;
    let opaque = desc.format == shm::FORMAT_XRGB;

    let reusable = surface
        .cached
        .as_ref()
        .map(|c| c.width() == desc.width && c.height() == desc.height)
        .unwrap_or(false);
    if reusable && !surface.damage.is_empty() {
        if let Some(canvas) = surface.cached.as_mut() {
            for rect in &surface.damage {
                canvas.patch_rows(src, stride, *rect, opaque);
            }
        }
    } else {
        surface.cached = Some(Canvas::from_bytes(
            src,
            desc.width,
            desc.height,
            stride,
            opaque,
        ));
    }
    Ok(())
}

pub fn handle_subsurface(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // destroy: unlink from the parent's child list too
        0 => {
            let parent = {
                let guard = lock(object);
                guard.as_subsurface(id)?.parent
            };
            if let Ok(parent_ref) = conn.registry().get(parent) {
                let mut guard = lock(&parent_ref);
                if let Ok(surface) = guard.as_surface_mut(parent) {
                    surface.children.retain(|child| *child != id);
                }
            }
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // set_position
        1 => {
            let x = r.i32("x")?;
            let y = r.i32("y")?;
            lock(object).as_subsurface_mut(id)?.position = Point::new(x, y);
            Ok(())
        }
        // place_above / place_below: stacking within one parent is unsupported
        2 | 3 => {
            let _sibling = r.u32("sibling")?;
            Ok(())
        }
        // set_sync
        4 => {
            lock(object).as_subsurface_mut(id)?.synced = true;
            Ok(())
        }
        // set_desync
        5 => {
            lock(object).as_subsurface_mut(id)?.synced = false;
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_subsurface",
            opcode,
        }),
    }
}

/// Create surfaces and subsurfaces; shared by wl_compositor and
/// wl_subcompositor dispatch.
pub fn create(conn: &Arc<Connection>, new_id: u32) {
    conn.registry().insert(new_id, Object::Surface(Surface::new()));
}

pub fn create_sub(
    conn: &Arc<Connection>,
    new_id: u32,
    surface: u32,
    parent: u32,
) -> Result<(), ProtocolError> {
    let parent_ref = conn.registry().get(parent)?;
    {
        let mut guard = lock(&parent_ref);
        guard.as_surface_mut(parent)?.children.push(new_id);
    }
    conn.registry().insert(
        new_id,
        Object::SubSurface(SubSurface {
            surface,
            parent,
            position: Point::new(0, 0),
            synced: true,
        }),
    );
    Ok(())
}

fn read_rect(r: &mut Reader<'_>) -> Result<Rect, ProtocolError> {
    let x = r.i32("x")?;
    let y = r.i32("y")?;
    let w = r.i32("width")?;
    let h = r.i32("height")?;
    Ok(Rect::from_size(x, y, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(width: i32, height: i32, stride: u32, format: u32) -> Buffer {
        Buffer {
            pool: 3,
            offset: 0,
            width,
            height,
            stride,
            format,
        }
    }

    #[test]
    fn test_decode_wholesale_then_patch() {
        let mut surface = Surface::new();
        let pool = vec![0x11u8; 2 * 2 * 4];
        decode_buffer(&mut surface, &pool, &buffer(2, 2, 8, shm::FORMAT_ARGB)).unwrap();
        assert_eq!(surface.canvas().unwrap().pixel(1, 1), [0x11; 4]);

        // Same extent with damage patches only the damaged rows.
        let pool = vec![0x22u8; 2 * 2 * 4];
        surface.damage.push(Rect::new(0, 0, 2, 1));
        decode_buffer(&mut surface, &pool, &buffer(2, 2, 8, shm::FORMAT_ARGB)).unwrap();
        let canvas = surface.canvas().unwrap();
        assert_eq!(canvas.pixel(0, 0), [0x22; 4]);
        assert_eq!(canvas.pixel(0, 1), [0x11; 4]);
    }

    #[test]
    fn test_decode_resize_ignores_damage() {
        let mut surface = Surface::new();
        let pool = vec![0x11u8; 4 * 4 * 4];
        decode_buffer(&mut surface, &pool, &buffer(2, 2, 8, shm::FORMAT_ARGB)).unwrap();
        surface.damage.push(Rect::new(0, 0, 1, 1));
        decode_buffer(&mut surface, &pool, &buffer(4, 4, 16, shm::FORMAT_ARGB)).unwrap();
        assert_eq!(surface.canvas().unwrap().width(), 4);
    }

    #[test]
    fn test_decode_xrgb_forces_alpha() {
        let mut surface = Surface::new();
        let pool = vec![0u8; 4];
        decode_buffer(&mut surface, &pool, &buffer(1, 1, 4, shm::FORMAT_XRGB)).unwrap();
        assert_eq!(surface.canvas().unwrap().pixel(0, 0)[3], 0xff);
    }

    #[test]
    fn test_decode_rejects_short_pool() {
        let mut surface = Surface::new();
        let pool = vec![0u8; 8];
        let err = decode_buffer(&mut surface, &pool, &buffer(2, 2, 8, shm::FORMAT_ARGB));
        assert!(matches!(err, Err(ProtocolError::Resource(_))));
        assert!(surface.canvas().is_none());
    }

    #[test]
    fn test_decode_rejects_overflowing_extent() {
        let mut surface = Surface::new();
        let pool = vec![0u8; 8];
        let desc = Buffer {
            pool: 3,
            offset: u32::MAX,
            width: 1,
            height: i32::MAX,
            stride: u32::MAX,
            format: shm::FORMAT_ARGB,
        };
        assert!(decode_buffer(&mut surface, &pool, &desc).is_err());
    }
}
