use std::fmt;
use std::ops::Mul;

use nalgebra::{Matrix3, Point2};

use crate::track::FrameId;

/// Homogeneous coordinates with |w| below this map to infinity.
const MIN_HOMOGENEOUS_SCALE: f64 = 1e-12;

/// A projective transform of the image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_translation(dx: f64, dy: f64) -> Self {
        Self::new(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Inverse transform, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix
            .try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .map(Self::new)
    }

    /// Map a point, or `None` if it lands on the line at infinity.
    pub fn map_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let v = self.matrix * p.to_homogeneous();
        if v.z.abs() < MIN_HOMOGENEOUS_SCALE {
            return None;
        }
        Some(Point2::new(v.x / v.z, v.y / v.z))
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Homography {
        Homography::new(self.matrix * rhs.matrix)
    }
}

/// Row-major entries separated by spaces, on a single line.
impl fmt::Display for Homography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..3 {
            for c in 0..3 {
                if r + c > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.matrix[(r, c)])?;
            }
        }
        Ok(())
    }
}

/// A homography mapping the image plane of frame `from` onto frame `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameToFrameHomography {
    homography: Homography,
    from: FrameId,
    to: FrameId,
}

impl FrameToFrameHomography {
    pub fn new(homography: Homography, from: FrameId, to: FrameId) -> Self {
        Self {
            homography,
            from,
            to,
        }
    }

    /// Identity mapping of a frame onto itself.
    pub fn identity(frame: FrameId) -> Self {
        Self::new(Homography::identity(), frame, frame)
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn from_id(&self) -> FrameId {
        self.from
    }

    pub fn to_id(&self) -> FrameId {
        self.to
    }

    /// The `to -> from` mapping, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        Some(Self::new(self.homography.inverse()?, self.to, self.from))
    }

    /// Apply `rhs` first, then `self`.
    ///
    /// Fails unless `rhs` maps onto the frame `self` maps from.
    pub fn compose(&self, rhs: &FrameToFrameHomography) -> Option<Self> {
        if self.from != rhs.to {
            return None;
        }
        let h = self.homography * rhs.homography;
        if !h.matrix().iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Self::new(h, rhs.from, self.to))
    }
}

/// Printed as `from to h00 h01 ... h22` on a single line.
impl fmt::Display for FrameToFrameHomography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.from, self.to, self.homography)
    }
}

/// Combine two frame-to-reference homographies into a `src2 -> src1`
/// homography.
///
/// Returns `None` when the two do not share a reference frame or when
/// `src1_to_ref` cannot be inverted.
pub fn relative_homography(
    src1_to_ref: &FrameToFrameHomography,
    src2_to_ref: &FrameToFrameHomography,
) -> Option<FrameToFrameHomography> {
    src1_to_ref.inverse()?.compose(src2_to_ref)
}
