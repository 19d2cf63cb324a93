//! wl_shm, wl_shm_pool, wl_buffer
//!
//! The shared-memory pipeline. A pool wraps a client-supplied descriptor
//! in a read-only mapping; buffers are windows into a pool described by
//! offset, extent, stride and pixel format. Buffer geometry is validated
//! against the live mapping at commit time, not here, because a pool can
//! be resized after the buffer was created.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use log::debug;
use memmap2::{Mmap, MmapOptions};

use crate::error::ProtocolError;
use crate::lock;
use crate::protocol::registry::{Object, ObjectRef};
use crate::protocol::wire::Message;
use crate::server::connection::Connection;

/// Hard ceiling on a single buffer, independent of what the pool claims.
pub const MAX_BUFFER_BYTES: u64 = 256 * 1024 * 1024;

/// The two advertised pixel formats.
pub const FORMAT_ARGB: u32 = 0;
pub const FORMAT_XRGB: u32 = 1;

/// A mapped shared-memory pool.
///
/// The mapping is read-only. A client shrinking the file behind it can
/// still deliver SIGBUS on access; commit-time bounds checks keep reads
/// inside the mapping as created, but that hole is inherent to mapping
/// client-owned memory and is not recoverable in-process.
pub struct Pool {
    fd: OwnedFd,
    map: Mmap,
}

impl Pool {
    pub fn new(fd: OwnedFd, size: u32) -> Result<Self, ProtocolError> {
        if size == 0 {
            return Err(ProtocolError::Resource("zero-sized pool".into()));
        }
        let map = unsafe { MmapOptions::new().len(size as usize).map(&fd) }
            .map_err(|e| ProtocolError::Resource(format!("pool mmap failed: {e}")))?;
        Ok(Self { fd, map })
    }

    /// Remap after a resize request. Pools only ever grow.
    pub fn resize(&mut self, size: u32) -> Result<(), ProtocolError> {
        if (size as usize) < self.map.len() {
            return Err(ProtocolError::Resource("pool shrink rejected".into()));
        }
        self.map = unsafe { MmapOptions::new().len(size as usize).map(&self.fd) }
            .map_err(|e| ProtocolError::Resource(format!("pool remap failed: {e}")))?;
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }
}

/// A buffer description; the pixels live in the pool.
#[derive(Debug, Clone, Copy)]
pub struct Buffer {
    pub pool: u32,
    pub offset: u32,
    pub width: i32,
    pub height: i32,
    pub stride: u32,
    pub format: u32,
}

pub fn handle_shm(
    conn: &Arc<Connection>,
    _id: u32,
    _object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // create_pool
        0 => {
            let new_id = r.u32("new_id")?;
            let size = r.i32("size")?;
            let fd = conn.take_fd()?;
            debug!("shm: create_pool#{} ({} bytes)", new_id, size);
            if size <= 0 {
                return Err(ProtocolError::Resource("non-positive pool size".into()));
            }
            let pool = Pool::new(fd, size as u32)?;
            conn.registry().insert(new_id, Object::Pool(pool));
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_shm",
            opcode,
        }),
    }
}

pub fn handle_pool(
    conn: &Arc<Connection>,
    id: u32,
    object: &ObjectRef,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let mut r = msg.reader();
    match msg.opcode {
        // create_buffer
        0 => {
            let new_id = r.u32("new_id")?;
            let offset = r.i32("offset")?;
            let width = r.i32("width")?;
            let height = r.i32("height")?;
            let stride = r.i32("stride")?;
            let format = r.u32("format")?;
            debug!(
                "shm_pool#{}: create_buffer#{} {}x{} stride {} format {}",
                id, new_id, width, height, stride, format
            );
            if offset < 0 || width < 0 || height < 0 || stride < 0 {
                return Err(ProtocolError::Resource("negative buffer geometry".into()));
            }
            if (stride as i64) < (width as i64) * 4 {
                return Err(ProtocolError::Resource("stride under four bytes per pixel".into()));
            }
            if format != FORMAT_ARGB && format != FORMAT_XRGB {
                return Err(ProtocolError::Resource(format!(
                    "unsupported buffer format {format}"
                )));
            }
            conn.registry().insert(
                new_id,
                Object::Buffer(Buffer {
                    pool: id,
                    offset: offset as u32,
                    width,
                    height,
                    stride: stride as u32,
                    format,
                }),
            );
            Ok(())
        }
        // destroy
        1 => {
            conn.registry().destroy(id);
            conn.delete_id(id)?;
            Ok(())
        }
        // resize
        2 => {
            let size = r.i32("size")?;
            if size <= 0 {
                return Err(ProtocolError::Resource("non-positive pool size".into()));
            }
            lock(object).as_pool_mut(id)?.resize(size as u32)
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_shm_pool",
            opcode,
        }),
    }
}

pub fn handle_buffer(
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
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_buffer",
            opcode,
        }),
    }
}
