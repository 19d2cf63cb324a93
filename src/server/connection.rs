//! Client connection
//!
//! One accepted Unix socket, its object registry, and the queue of file
//! descriptors that arrived as ancillary data. Messages are read and
//! dispatched sequentially on the connection's own thread; events may be
//! written from any thread under the write lock.

use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut, Write};
use std::mem::MaybeUninit;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use rustix::net::{
    self, RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags, SendAncillaryBuffer,
    SendAncillaryMessage, SendFlags,
};

use crate::compositor::{ClientId, WindowId, Workspace};
use crate::error::ProtocolError;
use crate::lock;
use crate::protocol;
use crate::protocol::registry::{Kind, ObjectRef, Registry};
use crate::protocol::wire::{Message, MessageBuilder, HEADER_LEN};

/// Transient read failures tolerated before the connection is dropped.
/// Each one triggers a liveness ping at the registered ping target.
const MAX_TRANSIENT_FAILURES: u32 = 10;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on any single socket write. A client that stops reading fills
/// its buffer; without this the render or input thread doing the write
/// would block forever, possibly with a workspace lock held.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Milliseconds since the epoch, truncated; used for event timestamps.
pub(crate) fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

pub struct Connection {
    id: ClientId,
    stream: UnixStream,
    write_lock: Mutex<()>,
    fds: Mutex<VecDeque<OwnedFd>>,
    registry: Mutex<Registry>,
    sync_counter: AtomicU32,
    frame_serial: AtomicU32,
    ping_target: AtomicU32,
    workspace: Arc<dyn Workspace>,
    window_ids: Arc<AtomicU32>,
    output_size: (i32, i32),
}

impl Connection {
    pub fn new(
        stream: UnixStream,
        id: ClientId,
        workspace: Arc<dyn Workspace>,
        window_ids: Arc<AtomicU32>,
        output_size: (i32, i32),
    ) -> io::Result<Arc<Self>> {
        net::sockopt::set_socket_timeout(
            &stream,
            net::sockopt::Timeout::Recv,
            Some(RECV_TIMEOUT),
        )
        .map_err(io::Error::from)?;
        net::sockopt::set_socket_timeout(
            &stream,
            net::sockopt::Timeout::Send,
            Some(SEND_TIMEOUT),
        )
        .map_err(io::Error::from)?;

        Ok(Arc::new(Self {
            id,
            stream,
            write_lock: Mutex::new(()),
            fds: Mutex::new(VecDeque::new()),
            registry: Mutex::new(Registry::new()),
            sync_counter: AtomicU32::new(0),
            frame_serial: AtomicU32::new(0),
            ping_target: AtomicU32::new(0),
            workspace,
            window_ids,
            output_size,
        }))
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn output_size(&self) -> (i32, i32) {
        self.output_size
    }

    pub fn next_window_id(&self) -> WindowId {
        WindowId(self.window_ids.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Drive the connection to completion; the caller's thread is consumed.
    ///
    /// A panic inside dispatch is confined here and treated like any
    /// other fatal error: full teardown, nothing shared leaks. This does
    /// not cover signals; a client truncating a mapped pool can still
    /// raise SIGBUS on access.
    pub fn run(self: &Arc<Self>) {
        info!("client {:?}: connected", self.id);
        match catch_unwind(AssertUnwindSafe(|| self.message_loop())) {
            Ok(Err(err)) if matches!(&err, ProtocolError::Io(_)) => {
                debug!("client {:?}: disconnected: {}", self.id, err);
            }
            Ok(Err(err)) => warn!("client {:?}: protocol error: {}", self.id, err),
            Ok(Ok(())) => {}
            Err(_) => warn!("client {:?}: panic in connection thread", self.id),
        }
        self.teardown();
        info!("client {:?}: removed", self.id);
    }

    fn message_loop(self: &Arc<Self>) -> Result<(), ProtocolError> {
        let mut transient = 0u32;
        loop {
            match self.read_message() {
                Ok(msg) => {
                    transient = 0;
                    protocol::dispatch(self, &msg)?;
                }
                Err(err) if err.is_transient() && transient < MAX_TRANSIENT_FAILURES => {
                    transient += 1;
                    self.ping()?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn teardown(&self) {
        self.workspace.remove_client_windows(self.id);
        lock(&self.registry).close();
        // Descriptors queued but never consumed close on drop.
        lock(&self.fds).clear();
    }

    /// One recvmsg, capturing any SCM_RIGHTS descriptors into the fd queue.
    fn recv_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut space = [MaybeUninit::<u8>::uninit(); rustix::cmsg_space!(ScmRights(8))];
        let mut control = RecvAncillaryBuffer::new(&mut space);
        let msg = net::recvmsg(
            &self.stream,
            &mut [IoSliceMut::new(buf)],
            &mut control,
            RecvFlags::empty(),
        )
        .map_err(io::Error::from)?;

        for cmsg in control.drain() {
            if let RecvAncillaryMessage::ScmRights(fds) = cmsg {
                let mut queue = lock(&self.fds);
                for fd in fds {
                    debug!("client {:?}: queued fd", self.id);
                    queue.push_back(fd);
                }
            }
        }
        Ok(msg.bytes)
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        let mut pos = 0;
        while pos < buf.len() {
            let n = self.recv_chunk(&mut buf[pos..])?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            pos += n;
        }
        Ok(())
    }

    /// Read one framed message: 8-byte header, then the declared body.
    pub fn read_message(&self) -> Result<Message, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        self.read_exact(&mut header)?;
        let (object_id, opcode, body_len) = Message::decode_header(&header)?;
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            self.read_exact(&mut body)?;
        }
        Ok(Message::new(object_id, opcode, body))
    }

    /// Pop the oldest queued descriptor; FIFO, never read ahead.
    pub fn take_fd(&self) -> Result<OwnedFd, ProtocolError> {
        lock(&self.fds).pop_front().ok_or_else(|| {
            ProtocolError::Resource("expected a queued file descriptor".into())
        })
    }

    /// Write one event. A write that hits the send timeout means the
    /// client stopped reading; the stream could also be mid-message, so
    /// the socket is shut down and the connection thread tears down on
    /// its next read.
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        let _guard = lock(&self.write_lock);
        let result = (&self.stream).write_all(data);
        if let Err(err) = &result {
            self.poison_on_stall(err);
        }
        result
    }

    pub fn send_with_fd(&self, data: &[u8], fd: BorrowedFd<'_>) -> io::Result<()> {
        let _guard = lock(&self.write_lock);
        let mut space = [MaybeUninit::<u8>::uninit(); rustix::cmsg_space!(ScmRights(1))];
        let mut control = SendAncillaryBuffer::new(&mut space);
        let fds = [fd];
        control.push(SendAncillaryMessage::ScmRights(&fds));
        let result = net::sendmsg(
            &self.stream,
            &[IoSlice::new(data)],
            &mut control,
            SendFlags::empty(),
        )
        .map(|_| ())
        .map_err(io::Error::from);
        if let Err(err) = &result {
            self.poison_on_stall(err);
        }
        result
    }

    fn poison_on_stall(&self, err: &io::Error) {
        if matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ) {
            warn!("client {:?}: send stalled, shutting down", self.id);
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    /// Find the live object of `kind`, probing a registry snapshot so no
    /// object lock is ever taken under the registry lock.
    pub fn find_kind(&self, kind: Kind) -> Option<(u32, ObjectRef)> {
        let snapshot = lock(&self.registry).snapshot();
        snapshot
            .into_iter()
            .find(|(_, obj)| lock(obj).kind() == kind)
    }

    /// Tell the client an object id is free for reuse.
    pub fn delete_id(&self, id: u32) -> io::Result<()> {
        self.send(&MessageBuilder::new(1, 1).u32(id).build())
    }

    pub fn next_sync(&self) -> u32 {
        self.sync_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Timestamp-derived serial for frame callbacks, strictly increasing
    /// even when two commits land in the same millisecond.
    pub fn next_frame_serial(&self) -> u32 {
        let now = now_millis();
        let mut prev = self.frame_serial.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev.wrapping_add(1));
            match self.frame_serial.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn set_ping_target(&self, id: u32) {
        self.ping_target.store(id, Ordering::SeqCst);
    }

    /// Ping the shell base so a quiet client can prove liveness.
    fn ping(&self) -> io::Result<()> {
        let target = self.ping_target.load(Ordering::SeqCst);
        if target != 0 {
            debug!("client {:?}: ping", self.id);
            self.send(&MessageBuilder::new(target, 0).u32(now_millis()).build())?;
        }
        Ok(())
    }
}
