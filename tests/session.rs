//! End-to-end protocol sessions over a socketpair: a scripted client on
//! one end, a real connection thread on the other.

use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::thread::JoinHandle;

use rustix::fs::{ftruncate, memfd_create, MemfdFlags};
use rustix::net::{SendAncillaryBuffer, SendAncillaryMessage, SendFlags};

use tessera::compositor::{DragOverlay, Workspace};
use tessera::protocol::wire::MessageBuilder;
use tessera::server::connection::Connection;
use tessera::compositor::ClientId;

struct TestClient {
    stream: UnixStream,
    workspace: Arc<DragOverlay>,
    server: Option<JoinHandle<()>>,
}

impl TestClient {
    fn start() -> Self {
        Self::start_with(&Arc::new(DragOverlay::new(None)), 1)
    }

    /// Attach another connection to an existing workspace, so tests can
    /// run two clients against one server state.
    fn start_with(workspace: &Arc<DragOverlay>, client: u32) -> Self {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let tree: Arc<dyn Workspace> = workspace.clone();
        let conn = Connection::new(
            server_end,
            ClientId(client),
            tree,
            Arc::new(AtomicU32::new(0)),
            (1024, 1024),
        )
        .unwrap();
        let server = std::thread::spawn(move || conn.run());
        Self {
            stream: client_end,
            workspace: workspace.clone(),
            server: Some(server),
        }
    }

    /// Round-trip a sync so every previously written request has been
    /// dispatched before the caller proceeds.
    fn barrier(&mut self, callback: u32) {
        self.send(&MessageBuilder::new(1, 0).u32(callback).build());
        loop {
            let (id, opcode, body) = self.recv();
            if (id, opcode) == (1, 1) && u32_at(&body, 0) == callback {
                return;
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    fn send_with_fd(&mut self, bytes: &[u8], fd: &OwnedFd) {
        let mut space = [std::mem::MaybeUninit::<u8>::uninit(); rustix::cmsg_space!(ScmRights(1))];
        let mut control = SendAncillaryBuffer::new(&mut space);
        let fds = [fd.as_fd()];
        control.push(SendAncillaryMessage::ScmRights(&fds));
        rustix::net::sendmsg(
            &self.stream,
            &[std::io::IoSlice::new(bytes)],
            &mut control,
            SendFlags::empty(),
        )
        .unwrap();
    }

    /// Read one event frame: (object id, opcode, body).
    fn recv(&mut self) -> (u32, u16, Vec<u8>) {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header).unwrap();
        let id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let opcode = u16::from_le_bytes([header[4], header[5]]);
        let len = u16::from_le_bytes([header[6], header[7]]) as usize;
        let mut body = vec![0u8; len - 8];
        self.stream.read_exact(&mut body).unwrap();
        (id, opcode, body)
    }
}

impl Drop for TestClient {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        if let Some(server) = self.server.take() {
            let _ = server.join();
        }
    }
}

fn u32_at(body: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([body[off], body[off + 1], body[off + 2], body[off + 3]])
}

fn memfd_with(bytes: &[u8]) -> OwnedFd {
    let fd = memfd_create("session-test", MemfdFlags::CLOEXEC).unwrap();
    ftruncate(&fd, bytes.len() as u64).unwrap();
    let mut file = std::fs::File::from(fd.try_clone().unwrap());
    file.write_all(bytes).unwrap();
    fd
}

#[test]
fn test_registry_burst_and_sync() {
    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());

    let mut names = Vec::new();
    for _ in 0..8 {
        let (id, opcode, body) = client.recv();
        assert_eq!((id, opcode), (2, 0));
        names.push(u32_at(&body, 0));
    }
    assert_eq!(names, vec![1, 2, 3, 4, 5, 6, 7, 8]);

    // sync answers with done on the callback, then frees its id.
    client.send(&MessageBuilder::new(1, 0).u32(3).build());
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (3, 0));
    assert_eq!(u32_at(&body, 0), 0);
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (1, 1));
    assert_eq!(u32_at(&body, 0), 3);
}

#[test]
fn test_seat_bind_and_shm_formats() {
    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());
    for _ in 0..8 {
        client.recv();
    }

    // wl_shm announces both formats at bind.
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(4)
            .string("wl_shm")
            .u32(1)
            .u32(5)
            .build(),
    );
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (5, 0));
    assert_eq!(u32_at(&body, 0), 0);
    let (_, _, body) = client.recv();
    assert_eq!(u32_at(&body, 0), 1);

    // wl_seat announces pointer+keyboard and its name.
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(3)
            .string("wl_seat")
            .u32(7)
            .u32(6)
            .build(),
    );
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (6, 0));
    assert_eq!(u32_at(&body, 0), 0x03);
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (6, 1));

    // get_keyboard answers with an empty keymap.
    client.send(&MessageBuilder::new(6, 1).u32(7).build());
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (7, 0));
    assert_eq!(u32_at(&body, 0), 0);
    assert_eq!(u32_at(&body, 4), 0);
}

#[test]
fn test_commit_releases_buffer_and_fires_frame_callback() {
    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());
    for _ in 0..8 {
        client.recv();
    }

    client.send(
        &MessageBuilder::new(2, 0)
            .u32(1)
            .string("wl_compositor")
            .u32(5)
            .u32(4)
            .build(),
    );
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(4)
            .string("wl_shm")
            .u32(1)
            .u32(5)
            .build(),
    );
    client.recv();
    client.recv();

    // Pool backed by a 16x16 buffer of solid pixels.
    let pixels = vec![0x7fu8; 16 * 16 * 4];
    let fd = memfd_with(&pixels);
    client.send_with_fd(
        &MessageBuilder::new(5, 0).u32(11).i32(pixels.len() as i32).build(),
        &fd,
    );
    client.send(
        &MessageBuilder::new(11, 0)
            .u32(12)
            .i32(0)
            .i32(16)
            .i32(16)
            .i32(64)
            .u32(1)
            .build(),
    );

    // Surface, attach, frame, commit.
    client.send(&MessageBuilder::new(4, 0).u32(8).build());
    client.send(&MessageBuilder::new(8, 1).u32(12).i32(0).i32(0).build());
    client.send(&MessageBuilder::new(8, 3).u32(13).build());
    client.send(&MessageBuilder::new(8, 6).build());

    // Release for the consumed buffer.
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (12, 0));
    // Frame callback done, then its id freed.
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (13, 0));
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (1, 1));
    assert_eq!(u32_at(&body, 0), 13);
}

#[test]
fn test_pointer_events_reach_mapped_toplevel() {
    use tessera::compositor::{Point, PointerSample};
    use tessera::input::{KeyboardState, PointerEvent};

    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());
    for _ in 0..8 {
        client.recv();
    }

    client.send(
        &MessageBuilder::new(2, 0)
            .u32(1)
            .string("wl_compositor")
            .u32(5)
            .u32(4)
            .build(),
    );
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(3)
            .string("wl_seat")
            .u32(7)
            .u32(6)
            .build(),
    );
    client.recv(); // capabilities
    client.recv(); // name
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(5)
            .string("xdg_wm_base")
            .u32(2)
            .u32(7)
            .build(),
    );

    // Pointer, surface, and a mapped toplevel.
    client.send(&MessageBuilder::new(6, 0).u32(8).build());
    client.send(&MessageBuilder::new(4, 0).u32(9).build());
    client.send(&MessageBuilder::new(7, 2).u32(10).u32(9).build());
    client.send(&MessageBuilder::new(10, 1).u32(11).build());
    client.barrier(20);

    // Drive the workspace the way the frame loop would.
    let kb = KeyboardState::new();
    client.workspace.pointer_event(
        PointerSample::new(Point::new(5, 6)),
        &kb,
        PointerEvent::Motion,
    );

    // enter carries the surface under the pointer, then motion and frame.
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (8, 0));
    assert_eq!(u32_at(&body, 4), 9);
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 2));
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 5));
}

#[test]
fn test_pointer_crossing_into_popup_sends_leave_then_enter() {
    use tessera::compositor::{Point, PointerSample};
    use tessera::input::{KeyboardState, PointerEvent};

    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());
    for _ in 0..8 {
        client.recv();
    }
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(1)
            .string("wl_compositor")
            .u32(5)
            .u32(3)
            .build(),
    );
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(3)
            .string("wl_seat")
            .u32(7)
            .u32(6)
            .build(),
    );
    client.recv(); // capabilities
    client.recv(); // name
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(5)
            .string("xdg_wm_base")
            .u32(2)
            .u32(7)
            .build(),
    );
    client.send(&MessageBuilder::new(6, 0).u32(8).build());

    // Root toplevel on surface 9.
    client.send(&MessageBuilder::new(3, 0).u32(9).build());
    client.send(&MessageBuilder::new(7, 2).u32(10).u32(9).build());
    client.send(&MessageBuilder::new(10, 1).u32(11).build());

    // A 100x100 popup anchored at (40,40) on surface 12.
    client.send(&MessageBuilder::new(3, 0).u32(12).build());
    client.send(&MessageBuilder::new(7, 2).u32(13).u32(12).build());
    client.send(&MessageBuilder::new(7, 1).u32(14).build());
    client.send(&MessageBuilder::new(14, 1).i32(100).i32(100).build());
    client.send(&MessageBuilder::new(14, 2).i32(40).i32(40).i32(0).i32(0).build());
    client.send(&MessageBuilder::new(14, 3).u32(5).build());
    client.send(&MessageBuilder::new(13, 2).u32(15).u32(10).u32(14).build());

    // Popup placement, own configure, parent configure.
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (15, 0));
    assert_eq!(u32_at(&body, 0), 40);
    assert_eq!(u32_at(&body, 4), 40);
    let (id, _, _) = client.recv();
    assert_eq!(id, 13);
    let (id, _, _) = client.recv();
    assert_eq!(id, 10);
    client.barrier(30);

    let kb = KeyboardState::new();
    client.workspace.pointer_event(
        PointerSample::new(Point::new(5, 6)),
        &kb,
        PointerEvent::Motion,
    );
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (8, 0));
    let enter_root = u32_at(&body, 0);
    assert_eq!(u32_at(&body, 4), 9);
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 2));
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 5));

    // Crossing into the popup leaves the root and enters the popup's
    // surface at popup-local coordinates.
    client.workspace.pointer_event(
        PointerSample::new(Point::new(50, 60)),
        &kb,
        PointerEvent::Motion,
    );
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (8, 1));
    let leave_root = u32_at(&body, 0);
    assert_eq!(u32_at(&body, 4), 9);
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (8, 0));
    let enter_popup = u32_at(&body, 0);
    assert_eq!(u32_at(&body, 4), 12);
    assert_eq!(u32_at(&body, 8), 10 * 256);
    assert_eq!(u32_at(&body, 12), 20 * 256);
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 2));
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 5));

    assert!(enter_root < leave_root);
    assert!(leave_root < enter_popup);
}

#[test]
fn test_subtracted_input_region_clears_pointer_focus() {
    use tessera::compositor::{Point, PointerSample};
    use tessera::input::{KeyboardState, PointerEvent};

    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(1, 1).u32(2).build());
    for _ in 0..8 {
        client.recv();
    }
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(1)
            .string("wl_compositor")
            .u32(5)
            .u32(3)
            .build(),
    );
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(3)
            .string("wl_seat")
            .u32(7)
            .u32(6)
            .build(),
    );
    client.recv(); // capabilities
    client.recv(); // name
    client.send(
        &MessageBuilder::new(2, 0)
            .u32(5)
            .string("xdg_wm_base")
            .u32(2)
            .u32(7)
            .build(),
    );
    client.send(&MessageBuilder::new(6, 0).u32(8).build());
    client.send(&MessageBuilder::new(3, 0).u32(9).build());
    client.send(&MessageBuilder::new(7, 2).u32(10).u32(9).build());
    client.send(&MessageBuilder::new(10, 1).u32(11).build());
    client.barrier(20);

    let kb = KeyboardState::new();
    client.workspace.pointer_event(
        PointerSample::new(Point::new(5, 6)),
        &kb,
        PointerEvent::Motion,
    );
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 0));
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 2));
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 5));

    // Commit an input region subtracting the whole surface.
    client.send(&MessageBuilder::new(3, 1).u32(12).build());
    client.send(&MessageBuilder::new(12, 2).i32(0).i32(0).i32(1024).i32(1024).build());
    client.send(&MessageBuilder::new(9, 5).u32(12).build());
    client.send(&MessageBuilder::new(9, 6).build());
    client.barrier(21);

    // The next motion finds nothing under the pointer: focus clears with
    // one leave, and no enter follows.
    client.workspace.pointer_event(
        PointerSample::new(Point::new(7, 8)),
        &kb,
        PointerEvent::Motion,
    );
    let (id, opcode, body) = client.recv();
    assert_eq!((id, opcode), (8, 1));
    assert_eq!(u32_at(&body, 4), 9);
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (8, 5));

    client.workspace.pointer_event(
        PointerSample::new(Point::new(9, 9)),
        &kb,
        PointerEvent::Motion,
    );
    client.send(&MessageBuilder::new(1, 0).u32(22).build());
    let (id, opcode, _) = client.recv();
    assert_eq!((id, opcode), (22, 0));
}

#[test]
fn test_malformed_message_kills_only_the_offender() {
    let workspace = Arc::new(DragOverlay::new(None));
    let mut offender = TestClient::start_with(&workspace, 1);
    let mut bystander = TestClient::start_with(&workspace, 2);

    // Declared total length below the header size.
    offender.send(&[1, 0, 0, 0, 0, 0, 4, 0]);
    let mut byte = [0u8; 1];
    match offender.stream.read(&mut byte) {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("unexpected {} bytes after malformed header", n),
    }

    // The other connection still round-trips.
    bystander.barrier(5);
}

#[test]
fn test_unknown_object_tears_down_connection() {
    let mut client = TestClient::start();
    client.send(&MessageBuilder::new(99, 0).build());

    let mut byte = [0u8; 1];
    match client.stream.read(&mut byte) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {} bytes after protocol error", n),
        Err(_) => {}
    }
}
