//! Integer geometry primitives shared by the protocol and workspace layers.

use std::ops::{Add, Sub};

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A half-open rectangle: contains (x, y) with min ≤ p < max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    /// Build from corner coordinates.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
    }

    /// Build from an origin and extent.
    pub fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn dx(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn dy(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x < self.max.x && p.y < self.max.y
    }

    /// The largest rectangle contained in both; empty when disjoint.
    pub fn intersect(&self, other: Rect) -> Rect {
        let r = Rect::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if r.is_empty() {
            Rect::default()
        } else {
            r
        }
    }

    pub fn translate(&self, by: Point) -> Rect {
        Rect {
            min: self.min + by,
            max: self.max + by,
        }
    }

    /// Translate a point into this rectangle's local space, if inside.
    pub fn to_local(&self, p: Point) -> Option<Point> {
        if self.contains(p) {
            Some(p - self.min)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_half_open() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(Point::new(0, 0)));
        assert!(r.contains(Point::new(9, 9)));
        assert!(!r.contains(Point::new(10, 0)));
        assert!(!r.contains(Point::new(-1, 5)));
    }

    #[test]
    fn test_intersect_clips() {
        let a = Rect::new(-10, -10, 50, 50);
        let b = Rect::new(0, 0, 40, 40);
        assert_eq!(a.intersect(b), Rect::new(0, 0, 40, 40));
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 30, 30);
        assert!(a.intersect(b).is_empty());
    }

    #[test]
    fn test_to_local() {
        let r = Rect::new(10, 20, 110, 120);
        assert_eq!(r.to_local(Point::new(15, 25)), Some(Point::new(5, 5)));
        assert_eq!(r.to_local(Point::new(5, 25)), None);
    }
}
