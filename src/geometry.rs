//! Planar homographies between frames and image overlap under a homography.

mod homography;
mod overlap;

pub use homography::{FrameToFrameHomography, Homography, relative_homography};
pub use overlap::overlap;
