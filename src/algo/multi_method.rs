use image::GrayImage;

use crate::algo::close_loops::CloseLoops;
use crate::track::{FrameId, TrackSet};

/// Runs several loop-closure strategies in order, each on the output of the
/// previous one.
pub struct MultiMethod {
    methods: Vec<Box<dyn CloseLoops>>,
    span: tracing::Span,
}

impl MultiMethod {
    pub fn new(methods: Vec<Box<dyn CloseLoops>>) -> Self {
        Self {
            methods,
            span: tracing::info_span!("close_loops", method = "multi_method"),
        }
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl CloseLoops for MultiMethod {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        tracks: TrackSet,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> TrackSet {
        let span = self.span.clone();
        let _enter = span.enter();
        self.methods.iter_mut().fold(tracks, |tracks, method| {
            method.stitch(frame_number, tracks, image, mask)
        })
    }

    fn check_configuration(&self) -> bool {
        let _enter = self.span.enter();
        if self.methods.is_empty() {
            tracing::error!("no loop closure methods configured");
            return false;
        }
        // Check every method so that all problems get logged
        self.methods
            .iter()
            .fold(true, |ok, method| method.check_configuration() && ok)
    }
}
