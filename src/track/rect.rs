/// Axis-aligned box in image coordinates.
///
/// Stored as top-left corner plus size (TLWH). Used for detected-object
/// observations and as the image footprint when clipping warped frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    /// Top-left x coordinate
    pub x: f64,
    /// Top-left y coordinate
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box covering a `width` x `height` image.
    #[inline]
    pub fn from_image_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Corners in counter-clockwise order (y down), starting top-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x(), self.min_y()),
            (self.max_x(), self.min_y()),
            (self.max_x(), self.max_y()),
            (self.min_x(), self.max_y()),
        ]
    }
}
