//! Keyframe selection from track continuity.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::track::{FrameData, FrameId, TrackSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeSelectorConfig {
    /// A frame becomes a keyframe once at least this fraction of the tracks
    /// on the previous keyframe is no longer tracked, in (0, 1]
    pub fraction_tracks_lost_to_necessitate_new_keyframe: f64,
    /// Fewest active tracks a keyframe may have
    pub keyframe_min_feature_count: i64,
}

impl Default for KeyframeSelectorConfig {
    fn default() -> Self {
        Self {
            fraction_tracks_lost_to_necessitate_new_keyframe: 0.3,
            keyframe_min_feature_count: 50,
        }
    }
}

impl KeyframeSelectorConfig {
    pub fn validate(&self) -> Result<()> {
        let fraction = self.fraction_tracks_lost_to_necessitate_new_keyframe;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "fraction_tracks_lost_to_necessitate_new_keyframe ({fraction}) must be in (0, 1]"
            )));
        }
        if self.keyframe_min_feature_count < 0 {
            return Err(Error::InvalidConfig(format!(
                "keyframe_min_feature_count ({}) must be non-negative",
                self.keyframe_min_feature_count
            )));
        }
        Ok(())
    }
}

/// Marks keyframes in a track set's frame data.
///
/// The first frame with enough active tracks becomes the first keyframe.
/// After that each newer frame is a keyframe when enough of the tracks on
/// the latest keyframe have been lost and it still has enough active tracks.
/// Frames already carrying frame data are not revisited.
#[derive(Debug, Clone)]
pub struct KeyframeSelector {
    config: KeyframeSelectorConfig,
    span: tracing::Span,
}

impl Default for KeyframeSelector {
    fn default() -> Self {
        Self::new(KeyframeSelectorConfig::default())
    }
}

impl KeyframeSelector {
    pub fn new(config: KeyframeSelectorConfig) -> Self {
        Self {
            config,
            span: tracing::debug_span!("keyframe_selector"),
        }
    }

    /// Replace the span diagnostics are emitted in.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &KeyframeSelectorConfig {
        &self.config
    }

    /// Log every configuration problem. Returns false if there was any.
    pub fn check_configuration(&self) -> bool {
        let _enter = self.span.enter();
        let mut ok = true;
        let fraction = self.config.fraction_tracks_lost_to_necessitate_new_keyframe;
        if !(fraction > 0.0 && fraction <= 1.0) {
            tracing::error!(
                fraction,
                "fraction_tracks_lost_to_necessitate_new_keyframe must be greater than 0 and at most 1"
            );
            ok = false;
        }
        if self.config.keyframe_min_feature_count < 0 {
            tracing::error!(
                count = self.config.keyframe_min_feature_count,
                "keyframe_min_feature_count must be non-negative"
            );
            ok = false;
        }
        ok
    }

    /// Update the keyframe flags of `tracks` in place.
    pub fn select(&self, tracks: &mut TrackSet) {
        let _enter = self.span.enter();
        if tracks.keyframes().is_empty() {
            self.initial_selection(tracks);
        }
        if !tracks.keyframes().is_empty() {
            self.continuing_selection(tracks);
        }
    }

    fn has_enough_features(&self, active: usize) -> bool {
        active as i64 >= self.config.keyframe_min_feature_count
    }

    fn initial_selection(&self, tracks: &mut TrackSet) {
        for frame in tracks.all_frame_ids() {
            if tracks.frame_data(frame).is_some() {
                continue;
            }
            let is_keyframe = self.has_enough_features(tracks.num_active_tracks(frame));
            tracks.set_frame_data(frame, FrameData { is_keyframe });
            if is_keyframe {
                tracing::debug!(frame, "selected first keyframe");
                break;
            }
        }
    }

    fn continuing_selection(&self, tracks: &mut TrackSet) {
        let Some(mut last_keyframe) = tracks.keyframes().last().copied() else {
            return;
        };
        let Some(mut candidate) = tracks
            .all_frame_data()
            .keys()
            .next_back()
            .map(|&frame: &FrameId| frame + 1)
        else {
            return;
        };

        let max_tracked = 1.0 - self.config.fraction_tracks_lost_to_necessitate_new_keyframe;
        let last_frame = tracks.last_frame();
        while candidate <= last_frame {
            let active = tracks.num_active_tracks(candidate);
            // Frames without observations were skipped upstream
            if active > 0 {
                let tracked = tracks.percentage_tracked(last_keyframe, candidate);
                let is_keyframe = tracked <= max_tracked && self.has_enough_features(active);
                tracks.set_frame_data(candidate, FrameData { is_keyframe });
                if is_keyframe {
                    tracing::debug!(frame = candidate, tracked, active, "selected keyframe");
                    last_keyframe = candidate;
                }
            }
            candidate += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;

    fn selector(fraction: f64, count: i64) -> KeyframeSelector {
        KeyframeSelector::new(KeyframeSelectorConfig {
            fraction_tracks_lost_to_necessitate_new_keyframe: fraction,
            keyframe_min_feature_count: count,
        })
    }

    #[test]
    fn test_check_configuration() {
        assert!(KeyframeSelector::default().check_configuration());
        assert!(!selector(0.0, 10).check_configuration());
        assert!(!selector(1.5, 10).check_configuration());
        assert!(!selector(0.3, -1).check_configuration());
        assert!(selector(1.0, 0).check_configuration());
        assert!(KeyframeSelectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_first_keyframe_needs_enough_features() {
        // Frame 1 has one track, frames 2-3 have three
        let mut tracks = TrackSet::from_tracks([
            Track::with_frames(0, [1, 2, 3]).unwrap(),
            Track::with_frames(1, [2, 3]).unwrap(),
            Track::with_frames(2, [2, 3]).unwrap(),
        ])
        .unwrap();
        selector(0.3, 3).select(&mut tracks);
        assert!(!tracks.is_keyframe(1));
        assert!(tracks.is_keyframe(2));
        assert!(!tracks.is_keyframe(3));
        assert_eq!(tracks.all_frame_data().len(), 3);
    }

    #[test]
    fn test_no_keyframe_without_features() {
        let mut tracks = TrackSet::from_tracks([Track::with_frames(0, [1, 2]).unwrap()]).unwrap();
        selector(0.3, 5).select(&mut tracks);
        assert!(tracks.keyframes().is_empty());
        assert_eq!(tracks.all_frame_data().len(), 2);

        // Later frames are still considered once they arrive
        for id in 1..6 {
            tracks.insert(Track::with_frames(id, [3]).unwrap()).unwrap();
        }
        selector(0.3, 5).select(&mut tracks);
        assert!(tracks.is_keyframe(3));
    }

    #[test]
    fn test_skips_empty_frames_and_tracks_reference() {
        // Tracks 0-3 span frames 1-2, frame 3 is empty, tracks 4-7 start at 4
        let mut set = Vec::new();
        for id in 0..4 {
            set.push(Track::with_frames(id, [1, 2]).unwrap());
        }
        for id in 4..8 {
            set.push(Track::with_frames(id, [4, 5]).unwrap());
        }
        let mut tracks = TrackSet::from_tracks(set).unwrap();
        selector(0.5, 4).select(&mut tracks);

        assert!(tracks.is_keyframe(1));
        assert!(!tracks.is_keyframe(2));
        assert!(tracks.frame_data(3).is_none());
        assert!(tracks.is_keyframe(4));
        // Compared against frame 4, not frame 1
        assert!(!tracks.is_keyframe(5));
    }
}
