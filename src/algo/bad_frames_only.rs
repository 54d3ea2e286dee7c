//! Short-range recovery from a few bad frames.

use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::algo::close_loops::CloseLoops;
use crate::algo::match_features::MatchFeatures;
use crate::error::{Error, Result};
use crate::track::{FrameId, TrackSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadFramesOnlyConfig {
    pub enabled: bool,
    /// Fraction of tracks that must carry over between frames, in [0, 1]
    pub percent_match_req: f64,
    /// Frames since the break that must be well tracked before stitching
    pub new_shot_length: u32,
    /// How many frames before the break to search
    pub max_search_length: u32,
}

impl Default for BadFramesOnlyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percent_match_req: 0.35,
            new_shot_length: 2,
            max_search_length: 5,
        }
    }
}

impl BadFramesOnlyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.percent_match_req) {
            return Err(Error::InvalidConfig(format!(
                "percent_match_req ({}) must be in [0, 1]",
                self.percent_match_req
            )));
        }
        Ok(())
    }
}

/// Re-attaches the start of a new shot to the frames just before a tracking
/// break.
///
/// When few tracks carry over into the first frame of the latest
/// `new_shot_length` frames, and the new shot itself is well tracked, the
/// first frame of the shot is matched against up to `max_search_length`
/// earlier frames. The first frame with enough matches wins and every
/// matched track pair is merged.
pub struct BadFramesOnly {
    config: BadFramesOnlyConfig,
    matcher: Arc<dyn MatchFeatures>,
    span: tracing::Span,
}

impl BadFramesOnly {
    pub fn new(mut config: BadFramesOnlyConfig, matcher: Arc<dyn MatchFeatures>) -> Self {
        config.new_shot_length = config.new_shot_length.max(1);
        Self {
            config,
            matcher,
            span: tracing::info_span!("close_loops", method = "bad_frames_only"),
        }
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &BadFramesOnlyConfig {
        &self.config
    }

    /// Whether every frame from `first` through `last` kept enough tracks
    /// from its predecessor.
    fn is_well_tracked(&self, tracks: &TrackSet, first: FrameId, last: FrameId) -> bool {
        let req = self.config.percent_match_req;
        (first..=last).all(|frame| tracks.percentage_tracked(frame - 1, frame) >= req)
    }
}

impl CloseLoops for BadFramesOnly {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        mut tracks: TrackSet,
        _image: &GrayImage,
        _mask: Option<&GrayImage>,
    ) -> TrackSet {
        let _enter = self.span.enter();
        let new_shot_length = FrameId::from(self.config.new_shot_length);
        if !self.config.enabled || frame_number <= new_shot_length {
            return tracks;
        }

        let req = self.config.percent_match_req;
        let frame_to_stitch = frame_number - new_shot_length + 1;
        if tracks.percentage_tracked(frame_to_stitch - 1, frame_to_stitch) >= req {
            return tracks;
        }
        if !self.is_well_tracked(&tracks, frame_to_stitch + 1, frame_number) {
            tracing::debug!(frame_to_stitch, "new shot is not stable yet");
            return tracks;
        }

        let stitch_obs = tracks.frame_observations(frame_to_stitch);
        let stitch_count = tracks.num_active_tracks(frame_to_stitch);
        let first_to_test = frame_to_stitch - 2;
        let max_search = FrameId::from(self.config.max_search_length);
        let last_to_test = if first_to_test > max_search {
            first_to_test - max_search
        } else {
            0
        };

        for frame_to_test in ((last_to_test + 1)..=first_to_test).rev() {
            let test_obs = tracks.frame_observations(frame_to_test);
            let matches = self.matcher.match_features(
                &test_obs.features,
                &test_obs.descriptors,
                &stitch_obs.features,
                &stitch_obs.descriptors,
            );
            // Every track on both frames counts, described or not
            let test_count = tracks.num_active_tracks(frame_to_test);
            let needed = req * (test_count + stitch_count) as f64;
            if ((2 * matches.len()) as f64) < needed {
                tracing::trace!(
                    frame_to_test,
                    matches = matches.len(),
                    needed,
                    "not enough matches"
                );
                continue;
            }

            let mut merged = 0;
            for &(i, j) in matches.iter() {
                let (Some(&past), Some(&stitched)) =
                    (test_obs.track_ids.get(i), stitch_obs.track_ids.get(j))
                else {
                    continue;
                };
                if tracks.merge_tracks(past, stitched) {
                    merged += 1;
                }
            }
            tracing::info!(
                matches = matches.len(),
                merged,
                "Stitching frames {frame_to_test} and {frame_to_stitch}"
            );
            return tracks;
        }
        tracks
    }

    fn check_configuration(&self) -> bool {
        let _enter = self.span.enter();
        match self.config.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("{e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::match_features::MatchSet;
    use crate::track::{Descriptor, Feature, Track, TrackLifecycle, TrackState};

    struct NoMatches;

    impl MatchFeatures for NoMatches {
        fn match_features(
            &self,
            _: &[Feature],
            _: &[Descriptor],
            _: &[Feature],
            _: &[Descriptor],
        ) -> MatchSet {
            MatchSet::default()
        }
    }

    fn described(id: i64, frames: std::ops::RangeInclusive<i64>) -> Track {
        let states = frames
            .map(|f| {
                TrackState::with_feature(f, Feature::new(0.0, 0.0), Some(Descriptor::new(vec![0])))
            })
            .collect();
        Track::from_states(id, states).unwrap()
    }

    #[test]
    fn test_new_shot_length_is_coerced() {
        let config = BadFramesOnlyConfig {
            new_shot_length: 0,
            ..Default::default()
        };
        let closer = BadFramesOnly::new(config, Arc::new(NoMatches));
        assert_eq!(closer.config().new_shot_length, 1);
    }

    #[test]
    fn test_check_configuration() {
        let closer = BadFramesOnly::new(BadFramesOnlyConfig::default(), Arc::new(NoMatches));
        assert!(closer.check_configuration());
        let config = BadFramesOnlyConfig {
            percent_match_req: 1.5,
            ..Default::default()
        };
        assert!(!BadFramesOnly::new(config, Arc::new(NoMatches)).check_configuration());
    }

    /// Matches the first observation of each frame.
    struct FirstOnly;

    impl MatchFeatures for FirstOnly {
        fn match_features(
            &self,
            a: &[Feature],
            _: &[Descriptor],
            b: &[Feature],
            _: &[Descriptor],
        ) -> MatchSet {
            if a.is_empty() || b.is_empty() {
                MatchSet::default()
            } else {
                MatchSet::new(vec![(0, 0)])
            }
        }
    }

    #[test]
    fn test_threshold_counts_undescribed_tracks() {
        // One described track per shot; the rest carry no features
        let mut all = vec![described(0, 1..=4), described(10, 6..=7)];
        for id in 1..4 {
            all.push(Track::with_frames(id, 1..=4).unwrap());
            all.push(Track::with_frames(10 + id, 6..=7).unwrap());
        }
        let tracks = TrackSet::from_tracks(all).unwrap();
        let mut closer = BadFramesOnly::new(BadFramesOnlyConfig::default(), Arc::new(FirstOnly));
        // 2 * 1 match < 0.35 * (4 + 4) tracks
        let tracks = closer.stitch(7, tracks, &GrayImage::new(4, 4), None);
        assert_eq!(tracks.len(), 8);
        assert_eq!(tracks.lifecycle(0), Some(TrackLifecycle::Active));

        // The same single match clears the bar once the plain tracks are gone
        let tracks = TrackSet::from_tracks([described(0, 1..=4), described(10, 6..=7)]).unwrap();
        let tracks = closer.stitch(7, tracks, &GrayImage::new(4, 4), None);
        assert_eq!(tracks.lifecycle(0), Some(TrackLifecycle::MergedInto(10)));
    }

    #[test]
    fn test_no_match_leaves_tracks_unchanged() {
        let tracks =
            TrackSet::from_tracks([described(0, 1..=4), described(1, 5..=6)]).unwrap();
        let mut closer = BadFramesOnly::new(BadFramesOnlyConfig::default(), Arc::new(NoMatches));
        let image = GrayImage::new(4, 4);
        let tracks = closer.stitch(6, tracks, &image, None);
        assert_eq!(tracks.len(), 2);
    }
}
