//! The server: socket listener, per-client threads, and the frame loop.

pub mod connection;
pub mod window;

use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{info, warn};

use crate::backend::{InputSource, RawEvent, RenderSink};
use crate::compositor::{Canvas, ClientId, PointerSample, Workspace};
use crate::input::{KeyboardEvent, KeyboardState, PointerEvent, PointerState};
use crate::server::connection::Connection;

/// Minimum frame interval; rendering never runs hotter than this.
const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// Consecutive present failures tolerated before the loop gives up.
const MAX_PRESENT_FAILURES: u32 = 60;

pub struct Server {
    workspace: Arc<dyn Workspace>,
    window_ids: Arc<AtomicU32>,
    client_ids: AtomicU32,
    output_size: (i32, i32),
}

impl Server {
    pub fn new(workspace: Arc<dyn Workspace>, output_size: (i32, i32)) -> Arc<Self> {
        Arc::new(Self {
            workspace,
            window_ids: Arc::new(AtomicU32::new(0)),
            client_ids: AtomicU32::new(0),
            output_size,
        })
    }

    /// Bind the socket and spawn the accept loop. Each accepted client
    /// runs on its own thread until it disconnects or misbehaves.
    pub fn listen(self: &Arc<Self>, path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("binding {}", path.display()))?;
        info!("listening on {}", path.display());

        let server = self.clone();
        thread::Builder::new()
            .name("accept".into())
            .spawn(move || server.accept_loop(listener))
            .context("spawning accept thread")?;
        Ok(())
    }

    fn accept_loop(self: Arc<Self>, listener: UnixListener) {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("accept failed: {}", err);
                    continue;
                }
            };
            let id = ClientId(self.client_ids.fetch_add(1, Ordering::SeqCst) + 1);
            let conn = match Connection::new(
                stream,
                id,
                self.workspace.clone(),
                self.window_ids.clone(),
                self.output_size,
            ) {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("client setup failed: {}", err);
                    continue;
                }
            };
            if let Err(err) = thread::Builder::new()
                .name(format!("client-{}", id.0))
                .spawn(move || conn.run())
            {
                warn!("client thread spawn failed: {}", err);
            }
        }
    }

    /// The frame loop: poll input, feed the workspace, compose, present.
    /// Returns when the quit chord is pressed or the sink fails for good.
    pub fn run(
        &self,
        sink: &mut dyn RenderSink,
        input: &mut dyn InputSource,
    ) -> anyhow::Result<()> {
        let (width, height) = sink.size();
        let mut kb = KeyboardState::new();
        let mut pointer = PointerState::new();
        let mut failures = 0u32;

        loop {
            let started = Instant::now();
            for raw in input.poll() {
                self.apply_input(raw, &mut kb, &mut pointer, width, height);
            }
            let mut frame = Canvas::new(width, height);
            let area = frame.bounds();
            self.workspace.render(&mut frame, area);
            match sink.present(&frame) {
                Ok(()) => failures = 0,
                Err(err) => {
                    failures += 1;
                    warn!("present failed ({}/{}): {}", failures, MAX_PRESENT_FAILURES, err);
                    if failures >= MAX_PRESENT_FAILURES {
                        return Err(err.context("render sink failed repeatedly"));
                    }
                }
            }
            self.workspace.ack_frame();
            if self.workspace.quit_requested() {
                info!("quit requested");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed < FRAME_INTERVAL {
                thread::sleep(FRAME_INTERVAL - elapsed);
            }
        }
    }

    fn apply_input(
        &self,
        raw: RawEvent,
        kb: &mut KeyboardState,
        pointer: &mut PointerState,
        width: i32,
        height: i32,
    ) {
        match raw {
            RawEvent::Key { code, pressed } => {
                let ev = KeyboardEvent { key: code, pressed };
                if kb.apply(ev) {
                    let sample = PointerSample::new(pointer.position());
                    self.workspace.keyboard_event(sample, kb, ev);
                }
            }
            RawEvent::PointerMotion { dx, dy } => {
                pointer.motion(dx, dy, width, height);
                let sample = PointerSample::new(pointer.position());
                self.workspace.pointer_event(sample, kb, PointerEvent::Motion);
            }
            RawEvent::PointerButton { button, pressed } => {
                if pointer.button(button, pressed) {
                    let sample = PointerSample::new(pointer.position());
                    self.workspace
                        .pointer_event(sample, kb, PointerEvent::Button { button, pressed });
                }
            }
            RawEvent::PointerAxis { axis, value } => {
                let sample = PointerSample::new(pointer.position());
                self.workspace
                    .pointer_event(sample, kb, PointerEvent::Axis { axis, value });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessSink;
    use crate::compositor::DragOverlay;

    struct ScriptedInput {
        events: Vec<Vec<RawEvent>>,
    }

    impl InputSource for ScriptedInput {
        fn poll(&mut self) -> Vec<RawEvent> {
            if self.events.is_empty() {
                Vec::new()
            } else {
                self.events.remove(0)
            }
        }
    }

    #[test]
    fn test_frame_loop_exits_on_quit_chord() {
        use crate::input::keys;

        let workspace = Arc::new(DragOverlay::new(None));
        let server = Server::new(workspace, (64, 64));
        let mut sink = HeadlessSink::new(64, 64);
        let mut input = ScriptedInput {
            events: vec![vec![
                RawEvent::Key { code: keys::CTRL, pressed: true },
                RawEvent::Key { code: keys::ALT, pressed: true },
                RawEvent::Key { code: keys::ESC, pressed: true },
            ]],
        };
        server.run(&mut sink, &mut input).unwrap();
        assert!(sink.last_frame().is_some());
    }
}
