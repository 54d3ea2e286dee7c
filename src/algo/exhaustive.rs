use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::algo::close_loops::CloseLoops;
use crate::algo::match_features::{MatchFeatures, match_tracks};
use crate::track::{FrameId, TrackSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhaustiveConfig {
    /// Fewest matches needed to join the tracks of two frames
    pub match_req: usize,
    /// How many frames back to search; negative searches back to frame 0
    pub num_look_back: i64,
}

impl Default for ExhaustiveConfig {
    fn default() -> Self {
        Self {
            match_req: 100,
            num_look_back: -1,
        }
    }
}

/// Matches the current frame against every earlier frame in the look-back
/// window and joins the tracks of each frame pair with enough matches.
pub struct Exhaustive {
    config: ExhaustiveConfig,
    matcher: Arc<dyn MatchFeatures>,
    span: tracing::Span,
}

impl Exhaustive {
    pub fn new(config: ExhaustiveConfig, matcher: Arc<dyn MatchFeatures>) -> Self {
        Self {
            config,
            matcher,
            span: tracing::info_span!("close_loops", method = "exhaustive"),
        }
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ExhaustiveConfig {
        &self.config
    }
}

impl CloseLoops for Exhaustive {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        mut tracks: TrackSet,
        _image: &GrayImage,
        _mask: Option<&GrayImage>,
    ) -> TrackSet {
        let _enter = self.span.enter();
        let last_frame = if self.config.num_look_back >= 0 {
            (frame_number - self.config.num_look_back).max(0)
        } else {
            0
        };

        // The previous frame is left to the frame-to-frame tracker
        for frame in (last_frame..=frame_number - 2).rev() {
            let pairs = match_tracks(self.matcher.as_ref(), &tracks, frame_number, frame);
            let joined = if pairs.len() >= self.config.match_req {
                pairs
                    .iter()
                    .filter(|&&(current, past)| tracks.merge_tracks(current, past))
                    .count()
            } else {
                0
            };
            tracing::info!(
                "Matching frame {frame_number} to {frame} has {} matches and {joined} joined tracks",
                pairs.len()
            );
        }
        tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::match_features::MatchSet;
    use crate::track::{Descriptor, Feature, Track, TrackState};
    use std::sync::Mutex;

    /// Matches everything index-to-index and records which frames were
    /// compared by the number of features offered.
    #[derive(Default)]
    struct Recorder {
        sizes: Mutex<Vec<usize>>,
    }

    impl MatchFeatures for Recorder {
        fn match_features(
            &self,
            _: &[Feature],
            a: &[Descriptor],
            _: &[Feature],
            b: &[Descriptor],
        ) -> MatchSet {
            self.sizes.lock().unwrap().push(b.len());
            (0..a.len().min(b.len())).map(|i| (i, i)).collect()
        }
    }

    fn described(id: i64, frames: &[FrameId]) -> Track {
        let states = frames
            .iter()
            .map(|&f| {
                TrackState::with_feature(f, Feature::new(0.0, 0.0), Some(Descriptor::new(vec![0])))
            })
            .collect();
        Track::from_states(id, states).unwrap()
    }

    #[test]
    fn test_look_back_window() {
        // Frame f has f + 1 features, so the recorder can tell frames apart
        let mut set = Vec::new();
        let mut id = 0;
        for frame in 0..6 {
            for _ in 0..=frame {
                set.push(described(id, &[frame]));
                id += 1;
            }
        }
        let tracks = TrackSet::from_tracks(set).unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = ExhaustiveConfig {
            match_req: 1000,
            num_look_back: 3,
        };
        let mut closer = Exhaustive::new(config, recorder.clone());
        closer.stitch(5, tracks, &GrayImage::new(1, 1), None);
        // Frames 3 and 2
        assert_eq!(*recorder.sizes.lock().unwrap(), vec![4, 3]);
    }

    /// Log sink shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logs_every_tested_frame() {
        let tracks = TrackSet::from_tracks([
            described(0, &[0]),
            described(1, &[1]),
            described(2, &[3]),
        ])
        .unwrap();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let config = ExhaustiveConfig {
            match_req: 10,
            num_look_back: -1,
        };
        let mut closer = Exhaustive::new(config, Arc::new(Recorder::default()));
        let tracks = tracing::subscriber::with_default(subscriber, || {
            closer.stitch(3, tracks, &GrayImage::new(1, 1), None)
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Matching frame 3 to 1 has 1 matches and 0 joined tracks"));
        assert!(output.contains("Matching frame 3 to 0 has 1 matches and 0 joined tracks"));
        assert_eq!(tracks.len(), 3);
    }

    #[test]
    fn test_joins_tracks() {
        let tracks = TrackSet::from_tracks([
            described(0, &[0, 1]),
            described(1, &[0, 1]),
            described(2, &[4]),
            described(3, &[4]),
        ])
        .unwrap();
        let config = ExhaustiveConfig {
            match_req: 2,
            num_look_back: -1,
        };
        let mut closer = Exhaustive::new(config, Arc::new(Recorder::default()));
        let tracks = closer.stitch(4, tracks, &GrayImage::new(1, 1), None);
        // Joined on frame 1; frame 0 then matches the already joined tracks
        assert_eq!(tracks.all_track_ids(), [0, 1].into_iter().collect());
        assert_eq!(tracks.num_active_tracks(4), 2);
    }
}
