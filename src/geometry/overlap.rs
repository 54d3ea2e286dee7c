use nalgebra::Point2;

use crate::geometry::homography::Homography;
use crate::track::BoundingBox;

/// Fraction of a `width` x `height` image that stays inside the image when
/// warped by `homography`.
///
/// The image rectangle is mapped through the homography, clipped against the
/// unwarped rectangle, and the clipped area is divided by the image area.
/// Returns 0 for an empty image or when a corner maps to infinity or behind
/// the camera.
pub fn overlap(homography: &Homography, width: u32, height: u32) -> f64 {
    let frame = BoundingBox::from_image_size(width, height);
    let area = frame.area();
    if area <= 0.0 {
        return 0.0;
    }

    let m = homography.matrix();
    let mut warped = Vec::with_capacity(4);
    for (x, y) in frame.corners() {
        let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
        if w <= 0.0 {
            return 0.0;
        }
        match homography.map_point(&Point2::new(x, y)) {
            Some(p) if p.x.is_finite() && p.y.is_finite() => warped.push(p),
            _ => return 0.0,
        }
    }

    let clipped = clip_to_box(warped, &frame);
    (polygon_area(&clipped) / area).clamp(0.0, 1.0)
}

/// Sutherland-Hodgman clipping of a polygon against an axis-aligned box.
fn clip_to_box(polygon: Vec<Point2<f64>>, bbox: &BoundingBox) -> Vec<Point2<f64>> {
    let edges: [(usize, f64, bool); 4] = [
        (0, bbox.min_x(), true),
        (0, bbox.max_x(), false),
        (1, bbox.min_y(), true),
        (1, bbox.max_y(), false),
    ];

    let mut output = polygon;
    for (axis, bound, keep_above) in edges {
        if output.is_empty() {
            break;
        }
        let inside = |p: &Point2<f64>| {
            if keep_above {
                p[axis] >= bound
            } else {
                p[axis] <= bound
            }
        };
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            match (inside(&prev), inside(&cur)) {
                (true, true) => output.push(cur),
                (true, false) => output.push(crossing(&prev, &cur, axis, bound)),
                (false, true) => {
                    output.push(crossing(&prev, &cur, axis, bound));
                    output.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }
    output
}

fn crossing(a: &Point2<f64>, b: &Point2<f64>, axis: usize, bound: f64) -> Point2<f64> {
    let t = (bound - a[axis]) / (b[axis] - a[axis]);
    a + (b - a) * t
}

/// Shoelace area, independent of winding order.
fn polygon_area(polygon: &[Point2<f64>]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, a) in polygon.iter().enumerate() {
        let b = &polygon[(i + 1) % polygon.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    twice.abs() / 2.0
}
