use crate::geometry::FrameToFrameHomography;
use crate::track::{FrameId, TrackSet};

/// Estimates the homography from a frame to a running reference frame.
///
/// The estimator picks the reference frame and may switch to a new one at
/// any time; consumers detect the switch from the `to_id` of the result.
pub trait ComputeRefHomography {
    fn estimate(&mut self, frame: FrameId, tracks: &TrackSet) -> FrameToFrameHomography;
}

impl<F> ComputeRefHomography for F
where
    F: FnMut(FrameId, &TrackSet) -> FrameToFrameHomography,
{
    fn estimate(&mut self, frame: FrameId, tracks: &TrackSet) -> FrameToFrameHomography {
        self(frame, tracks)
    }
}
