//! Tessera: a minimal tiling display server.
//!
//! A from-scratch implementation of the Wayland wire protocol on top of a
//! Unix socket, a shared-memory buffer pipeline, and a recursive tiling
//! workspace. The crate is organized in four layers:
//!
//! - [`protocol`]: message codec, per-connection object registry, and the
//!   per-interface request handlers.
//! - [`server`]: the listener, one thread per connection, and the frame
//!   loop driving the render sink.
//! - [`compositor`]: the workspace tree and the software blitter.
//! - [`backend`]: traits for the output sink and raw input source.

pub mod backend;
pub mod compositor;
pub mod error;
pub mod input;
pub mod protocol;
pub mod server;

pub use error::ProtocolError;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, shrugging off poisoning.
///
/// Connection threads are panic-isolated; a poisoned guard only means one
/// of them died mid-update, and the guarded state stays usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
