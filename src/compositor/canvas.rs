//! Software canvas
//!
//! A tightly-packed 32-bit pixel buffer (B, G, R, A byte order, matching
//! little-endian ARGB8888) with the clipping blitter used to compose
//! client surfaces into the output frame.

use crate::compositor::geometry::{Point, Rect};

/// An owned pixel buffer with stride = width * 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pix: Vec<u8>,
    width: i32,
    height: i32,
}

impl Canvas {
    /// A zero-filled (transparent black) canvas.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            pix: vec![0; (width as usize) * (height as usize) * 4],
            width,
            height,
        }
    }

    /// Copy pixel rows out of a mapped buffer with an arbitrary stride.
    ///
    /// `src` must hold at least `height * stride` bytes; the caller
    /// validates that against the pool mapping before decoding. When
    /// `opaque` is set the alpha byte is forced to 255 (XRGB decode).
    pub fn from_bytes(src: &[u8], width: i32, height: i32, stride: usize, opaque: bool) -> Self {
        let mut canvas = Canvas::new(width, height);
        let row_bytes = canvas.width as usize * 4;
        for y in 0..canvas.height as usize {
            let s = y * stride;
            let d = y * row_bytes;
            canvas.pix[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
        }
        if opaque {
            for px in canvas.pix.chunks_exact_mut(4) {
                px[3] = 0xff;
            }
        }
        canvas
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pix
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Read one pixel; out-of-bounds reads return transparent black.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if !self.bounds().contains(Point::new(x, y)) {
            return [0; 4];
        }
        let n = self.offset(x, y);
        [self.pix[n], self.pix[n + 1], self.pix[n + 2], self.pix[n + 3]]
    }

    /// Write one pixel; out-of-bounds writes are dropped.
    pub fn put_pixel(&mut self, x: i32, y: i32, px: [u8; 4]) {
        if !self.bounds().contains(Point::new(x, y)) {
            return;
        }
        let n = self.offset(x, y);
        self.pix[n..n + 4].copy_from_slice(&px);
    }

    /// Patch rows inside `rect` (canvas coordinates) from a mapped buffer.
    ///
    /// `src` starts at the buffer's offset and is addressed with
    /// `src_stride`; `rect` is clipped to the canvas bounds so damage
    /// extending outside the buffer never touches foreign memory. With
    /// `opaque` set the patched pixels get their alpha forced to 255.
    pub fn patch_rows(&mut self, src: &[u8], src_stride: usize, rect: Rect, opaque: bool) {
        let rect = rect.intersect(self.bounds());
        if rect.is_empty() {
            return;
        }
        let row_bytes = (rect.dx() as usize) * 4;
        for y in rect.min.y..rect.max.y {
            let s = y as usize * src_stride + rect.min.x as usize * 4;
            if s + row_bytes > src.len() {
                break;
            }
            let d = self.offset(rect.min.x, y);
            self.pix[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
            if opaque {
                for px in self.pix[d..d + row_bytes].chunks_exact_mut(4) {
                    px[3] = 0xff;
                }
            }
        }
    }

    /// Composite `src` over this canvas.
    ///
    /// `dst` names the destination rectangle; `src_origin` is the source
    /// point that lands at `dst.min`, so clipping `dst` advances the read
    /// position by the same amount. Both rectangles are clipped so the
    /// copy never leaves either buffer (premultiplied source-over
    /// blending).
    pub fn blit_over(&mut self, dst: Rect, src: &Canvas, src_origin: Point) {
        let mut dst = dst;
        let mut sp = src_origin;

        // Clip against the destination, then against what the source can supply.
        let orig = dst.min;
        dst = dst.intersect(self.bounds());
        dst = dst.intersect(src.bounds().translate(orig - sp));
        if dst.is_empty() {
            return;
        }
        sp = sp + (dst.min - orig);

        for y in 0..dst.dy() {
            for x in 0..dst.dx() {
                let s = src.pixel(sp.x + x, sp.y + y);
                let a = s[3] as u32;
                if a == 0xff {
                    self.put_pixel(dst.min.x + x, dst.min.y + y, s);
                } else if a > 0 {
                    let d = self.pixel(dst.min.x + x, dst.min.y + y);
                    let inv = 255 - a;
                    let blend = |sc: u8, dc: u8| -> u8 {
                        (sc as u32 + (dc as u32 * inv + 127) / 255) as u8
                    };
                    self.put_pixel(
                        dst.min.x + x,
                        dst.min.y + y,
                        [
                            blend(s[0], d[0]),
                            blend(s[1], d[1]),
                            blend(s[2], d[2]),
                            blend(s[3], d[3]),
                        ],
                    );
                }
            }
        }
    }

    /// Draw a one-pixel rectangle outline (used for split boundaries and
    /// the drag marker).
    pub fn draw_rect(&mut self, rect: Rect, px: [u8; 4]) {
        for x in rect.min.x..=rect.max.x {
            self.put_pixel(x, rect.min.y, px);
            self.put_pixel(x, rect.max.y, px);
        }
        for y in rect.min.y..=rect.max.y {
            self.put_pixel(rect.min.x, y, px);
            self.put_pixel(rect.max.x, y, px);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: i32, height: i32, px: [u8; 4]) -> Canvas {
        let mut c = Canvas::new(width, height);
        for y in 0..height {
            for x in 0..width {
                c.put_pixel(x, y, px);
            }
        }
        c
    }

    #[test]
    fn test_from_bytes_respects_stride() {
        // 2x2 image in a 12-byte-stride buffer.
        let mut src = vec![0u8; 24];
        src[0..4].copy_from_slice(&[1, 2, 3, 255]);
        src[12..16].copy_from_slice(&[4, 5, 6, 255]);
        let c = Canvas::from_bytes(&src, 2, 2, 12, false);
        assert_eq!(c.pixel(0, 0), [1, 2, 3, 255]);
        assert_eq!(c.pixel(0, 1), [4, 5, 6, 255]);
    }

    #[test]
    fn test_from_bytes_opaque_forces_alpha() {
        let src = vec![9u8; 16];
        let c = Canvas::from_bytes(&src, 2, 2, 8, true);
        assert_eq!(c.pixel(1, 1)[3], 0xff);
    }

    #[test]
    fn test_blit_clips_to_destination() {
        let mut dst = Canvas::new(4, 4);
        let src = solid(10, 10, [0, 0, 255, 255]);
        // dst.min is off-canvas; the read position advances with the clip,
        // so dst (0,0) reads src (5,5) and the whole canvas is covered.
        dst.blit_over(Rect::new(-5, -5, 5, 5), &src, Point::new(0, 0));
        assert_eq!(dst.pixel(0, 0), [0, 0, 255, 255]);
        assert_eq!(dst.pixel(3, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn test_blit_clips_to_source_extent() {
        let mut dst = Canvas::new(4, 4);
        let src = solid(2, 2, [0, 0, 255, 255]);
        dst.blit_over(Rect::new(0, 0, 4, 4), &src, Point::new(0, 0));
        assert_eq!(dst.pixel(1, 1), [0, 0, 255, 255]);
        assert_eq!(dst.pixel(3, 3), [0; 4]);
    }

    #[test]
    fn test_blit_alpha_blend() {
        let mut dst = solid(1, 1, [100, 100, 100, 255]);
        let mut src = Canvas::new(1, 1);
        // Half-transparent premultiplied white.
        src.put_pixel(0, 0, [128, 128, 128, 128]);
        let area = dst.bounds();
        dst.blit_over(area, &src, Point::new(0, 0));
        let px = dst.pixel(0, 0);
        assert!(px[0] > 128 && px[0] < 255, "got {px:?}");
    }

    #[test]
    fn test_patch_rows_clamps_damage() {
        let mut c = Canvas::new(4, 4);
        let src = vec![7u8; 4 * 4 * 4];
        // Damage far outside the canvas must be clipped away, not wrap.
        c.patch_rows(&src, 16, Rect::new(-10, -10, 50, 50), false);
        assert_eq!(c.pixel(0, 0), [7, 7, 7, 7]);
        assert_eq!(c.pixel(3, 3), [7, 7, 7, 7]);
    }
}
