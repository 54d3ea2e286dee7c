use image::GrayImage;

use crate::track::{FrameId, TrackSet};

/// A loop-closure strategy: stitches track fragments that belong together.
///
/// `stitch` is called once per processed frame, in increasing frame order,
/// and returns the updated track set. The only topology change a strategy
/// makes is merging tracks; when nothing can be stitched the input comes
/// back unchanged.
pub trait CloseLoops {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        tracks: TrackSet,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> TrackSet;

    /// Log every configuration problem. Returns false if there was any.
    fn check_configuration(&self) -> bool {
        true
    }
}

impl<T: CloseLoops + ?Sized> CloseLoops for Box<T> {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        tracks: TrackSet,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> TrackSet {
        (**self).stitch(frame_number, tracks, image, mask)
    }

    fn check_configuration(&self) -> bool {
        (**self).check_configuration()
    }
}
