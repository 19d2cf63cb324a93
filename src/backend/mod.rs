//! Output and input backends
//!
//! The frame loop talks to two traits: a [`RenderSink`] that accepts the
//! composed frame and an [`InputSource`] polled once per frame for raw
//! device events. The built-in implementations are headless, for tests
//! and for running the server as a pure protocol endpoint; a real
//! display backend implements the same pair.

use crate::compositor::Canvas;

/// An input event as reported by the device layer, before any state
/// tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawEvent {
    Key { code: u32, pressed: bool },
    PointerMotion { dx: f64, dy: f64 },
    PointerButton { button: u32, pressed: bool },
    PointerAxis { axis: u32, value: f32 },
}

/// Where composed frames go.
pub trait RenderSink: Send {
    /// Output extent in pixels; fixed for the sink's lifetime.
    fn size(&self) -> (i32, i32);

    fn present(&mut self, frame: &Canvas) -> anyhow::Result<()>;
}

/// Where raw input comes from.
pub trait InputSource: Send {
    /// Drain whatever arrived since the last poll.
    fn poll(&mut self) -> Vec<RawEvent>;
}

/// A sink that keeps the last frame in memory.
pub struct HeadlessSink {
    width: i32,
    height: i32,
    last: Option<Canvas>,
}

impl HeadlessSink {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            last: None,
        }
    }

    pub fn last_frame(&self) -> Option<&Canvas> {
        self.last.as_ref()
    }
}

impl RenderSink for HeadlessSink {
    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn present(&mut self, frame: &Canvas) -> anyhow::Result<()> {
        self.last = Some(frame.clone());
        Ok(())
    }
}

/// An input source that never reports anything.
pub struct NullInput;

impl InputSource for NullInput {
    fn poll(&mut self) -> Vec<RawEvent> {
        Vec::new()
    }
}
