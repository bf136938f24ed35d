//! Render target surfaces and off-screen frame buffers.

use serde::{Deserialize, Serialize};

/// Bounding box of a render target in surface units (fractional pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceBounds {
    pub width: f64,
    pub height: f64,
}

impl SurfaceBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Area in square surface units. Non-finite or negative extents count as zero.
    pub fn area(&self) -> f64 {
        let w = if self.width.is_finite() { self.width.max(0.0) } else { 0.0 };
        let h = if self.height.is_finite() { self.height.max(0.0) } else { 0.0 };
        w * h
    }

    /// Whether the surface has nothing to capture.
    pub fn is_empty(&self) -> bool {
        self.area() <= 0.0
    }

    /// Pixel dimensions of a buffer mirroring these bounds at `scale`.
    /// Fractional edges round up so no visible pixel is lost. `None` when
    /// either edge does not fit in a `u32`.
    pub fn scaled(&self, scale: u32) -> Option<(u32, u32)> {
        if self.is_empty() {
            return Some((0, 0));
        }
        let edge = |extent: f64| {
            let px = (extent * scale as f64).ceil();
            (px <= u32::MAX as f64).then_some(px as u32)
        };
        Some((edge(self.width)?, edge(self.height)?))
    }
}

/// A visual surface whose contents can be captured frame by frame.
///
/// Capture is read-only: drawing into a frame buffer must never mutate the
/// surface or the composition behind it.
pub trait RenderTarget {
    /// Stable identifier of the surface.
    fn id(&self) -> &str;

    /// Current bounding box.
    fn bounds(&self) -> SurfaceBounds;

    /// Paint the current visual state into `frame`.
    fn draw(&self, frame: &mut FrameBuffer);
}

impl<T: RenderTarget + ?Sized> RenderTarget for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn bounds(&self) -> SurfaceBounds {
        (**self).bounds()
    }

    fn draw(&self, frame: &mut FrameBuffer) {
        (**self).draw(frame)
    }
}

/// RGBA8 pixel buffer sized to a render target at a fixed scale.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    scale: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a transparent buffer mirroring `bounds` at `scale`.
    ///
    /// Returns `None` when the RGBA byte count does not fit in memory
    /// addressing.
    pub fn for_bounds(bounds: SurfaceBounds, scale: u32) -> Option<Self> {
        let (width, height) = bounds.scaled(scale)?;
        let len = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        Some(Self {
            width,
            height,
            scale,
            pixels: vec![0; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Buffer pixels per surface unit.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Raw RGBA bytes, row-major, no padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Fill the whole buffer with one color.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Fill a rectangle given in surface units. The rectangle is clipped to
    /// the buffer.
    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, rgba: [u8; 4]) {
        let s = self.scale as f64;
        let x0 = (x * s).floor().clamp(0.0, self.width as f64) as u32;
        let y0 = (y * s).floor().clamp(0.0, self.height as f64) as u32;
        let x1 = ((x + w) * s).ceil().clamp(0.0, self.width as f64) as u32;
        let y1 = ((y + h) * s).ceil().clamp(0.0, self.height as f64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        for row in y0..y1 {
            let start = (row as usize * self.width as usize + x0 as usize) * 4;
            let end = (row as usize * self.width as usize + x1 as usize) * 4;
            for px in self.pixels[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// Pixel at buffer coordinates, if in range.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_area() {
        assert_eq!(SurfaceBounds::new(4.0, 3.0).area(), 12.0);
        assert!(SurfaceBounds::new(0.0, 100.0).is_empty());
        assert!(SurfaceBounds::new(-5.0, 100.0).is_empty());
        assert!(SurfaceBounds::new(f64::NAN, 100.0).is_empty());
    }

    #[test]
    fn test_scaled_rounds_up() {
        assert_eq!(SurfaceBounds::new(320.0, 180.0).scaled(2), Some((640, 360)));
        assert_eq!(SurfaceBounds::new(100.3, 50.0).scaled(2), Some((201, 100)));
        assert_eq!(SurfaceBounds::new(0.0, 50.0).scaled(2), Some((0, 0)));
    }

    #[test]
    fn test_oversized_bounds_have_no_buffer() {
        let huge = SurfaceBounds::new(1e12, 1e12);
        assert_eq!(huge.scaled(2), None);
        assert!(FrameBuffer::for_bounds(huge, 2).is_none());

        let edge = u32::MAX as f64;
        assert_eq!(SurfaceBounds::new(edge, 1.0).scaled(1), Some((u32::MAX, 1)));
        assert_eq!(SurfaceBounds::new(edge, 1.0).scaled(2), None);
        assert_eq!(SurfaceBounds::new(f64::MAX, 1.0).scaled(2), None);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_buffer_byte_count_overflow_is_rejected() {
        let edge = u32::MAX as f64;
        assert!(FrameBuffer::for_bounds(SurfaceBounds::new(edge, edge), 1).is_none());
    }

    #[test]
    fn test_fill_rect_uses_surface_units() {
        let mut frame = FrameBuffer::for_bounds(SurfaceBounds::new(4.0, 4.0), 2).unwrap();
        assert_eq!(frame.as_bytes().len(), 8 * 8 * 4);

        frame.clear([0, 0, 0, 255]);
        frame.fill_rect(1.0, 1.0, 1.0, 1.0, [255, 0, 0, 255]);

        assert_eq!(frame.pixel(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(frame.pixel(2, 2), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(4, 4), Some([0, 0, 0, 255]));
        assert_eq!(frame.pixel(8, 0), None);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut frame = FrameBuffer::for_bounds(SurfaceBounds::new(2.0, 2.0), 1).unwrap();
        frame.fill_rect(-10.0, -10.0, 100.0, 100.0, [1, 2, 3, 4]);
        assert!(frame.as_bytes().chunks_exact(4).all(|px| px == [1, 2, 3, 4]));
    }
}
