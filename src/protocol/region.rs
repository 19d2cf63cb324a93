//! wl_region
//!
//! A region is an ordered stack of add/subtract rectangles. Point queries
//! walk the stack newest-first; the first rectangle containing the point
//! decides the answer. Surfaces use regions to shape their input area.

use std::sync::Arc;

use crate::compositor::geometry::{Point, Rect};
use crate::error::ProtocolError;
use crate::lock;
use crate::protocol::registry::ObjectRef;
use crate::protocol::wire::Message;
use crate::server::connection::Connection;

/// Outcome of a point query against a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// The topmost rectangle containing the point was added.
    Added,
    /// The topmost rectangle containing the point was subtracted.
    Subtracted,
    /// No rectangle contains the point.
    Undefined,
}

#[derive(Debug, Default)]
pub struct Region {
    // (rect, subtract), oldest first.
    ops: Vec<(Rect, bool)>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rect: Rect) {
        self.ops.push((rect, false));
    }

    pub fn subtract(&mut self, rect: Rect) {
        self.ops.push((rect, true));
    }

    pub fn coverage(&self, p: Point) -> Coverage {
        for (rect, subtract) in self.ops.iter().rev() {
            if rect.contains(p) {
                return if *subtract {
                    Coverage::Subtracted
                } else {
                    Coverage::Added
                };
            }
        }
        Coverage::Undefined
    }

    /// Input-region test: a point passes unless explicitly subtracted.
    /// (Input defaults to the whole surface; opaque hints default the
    /// other way, but those are ignored.)
    pub fn allows_input(&self, p: Point) -> bool {
        self.coverage(p) != Coverage::Subtracted
    }
}

pub fn handle(
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
        // add
        1 => {
            let rect = read_rect(&mut r)?;
            lock(object).as_region_mut(id)?.add(rect);
            Ok(())
        }
        // subtract
        2 => {
            let rect = read_rect(&mut r)?;
            lock(object).as_region_mut(id)?.subtract(rect);
            Ok(())
        }
        opcode => Err(ProtocolError::UnsupportedOpcode {
            interface: "wl_region",
            opcode,
        }),
    }
}

fn read_rect(r: &mut crate::protocol::wire::Reader<'_>) -> Result<Rect, ProtocolError> {
    let x = r.i32("x")?;
    let y = r.i32("y")?;
    let w = r.i32("width")?;
    let h = r.i32("height")?;
    Ok(Rect::from_size(x, y, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_region_is_undefined() {
        let region = Region::new();
        assert_eq!(region.coverage(Point::new(0, 0)), Coverage::Undefined);
        assert!(region.allows_input(Point::new(0, 0)));
    }

    #[test]
    fn test_newest_rectangle_wins() {
        let mut region = Region::new();
        region.add(Rect::new(0, 0, 100, 100));
        region.subtract(Rect::new(25, 25, 75, 75));
        assert_eq!(region.coverage(Point::new(10, 10)), Coverage::Added);
        assert_eq!(region.coverage(Point::new(50, 50)), Coverage::Subtracted);

        // Re-adding over the hole flips it back.
        region.add(Rect::new(40, 40, 60, 60));
        assert_eq!(region.coverage(Point::new(50, 50)), Coverage::Added);
        assert_eq!(region.coverage(Point::new(30, 30)), Coverage::Subtracted);
    }

    #[test]
    fn test_input_passes_unless_subtracted() {
        let mut region = Region::new();
        region.subtract(Rect::new(0, 0, 10, 10));
        assert!(!region.allows_input(Point::new(5, 5)));
        assert!(region.allows_input(Point::new(50, 50)));
    }
}
