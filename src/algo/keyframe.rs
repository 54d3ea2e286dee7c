//! Loop closure against a neighbourhood of recent frames and all keyframes.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::algo::close_loops::CloseLoops;
use crate::algo::match_features::{MatchFeatures, match_tracks};
use crate::error::{Error, Result};
use crate::track::{FrameId, TrackSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// Fewest matches needed to join the tracks of two frames
    pub match_req: usize,
    /// Number of recent frames, counting the current one, to search
    pub search_bandwidth: usize,
    /// Frames in a row matching no keyframe before a new keyframe is made
    pub min_keyframe_misses: usize,
    /// Stop at the first failing keyframe once one keyframe has matched
    pub stop_after_match: bool,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            match_req: 100,
            search_bandwidth: 10,
            min_keyframe_misses: 5,
            stop_after_match: false,
        }
    }
}

impl KeyframeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search_bandwidth < 1 {
            return Err(Error::InvalidConfig("search_bandwidth must be at least 1".into()));
        }
        if self.min_keyframe_misses < 1 {
            return Err(Error::InvalidConfig("min_keyframe_misses must be at least 1".into()));
        }
        Ok(())
    }
}

/// Matches each frame against the frames just before it and against every
/// older keyframe, joining the tracks of each pair with enough matches.
///
/// The first frame of the set is the first keyframe. Frames that match no
/// keyframe are remembered as misses; after enough misses the frame since
/// the first miss with the best average neighbourhood matches is promoted
/// to a keyframe.
pub struct Keyframe {
    config: KeyframeConfig,
    matcher: Arc<dyn MatchFeatures>,
    /// Average matches of each processed frame against its neighbourhood
    frame_matches: BTreeMap<FrameId, usize>,
    keyframe_misses: Vec<FrameId>,
    span: tracing::Span,
}

impl Keyframe {
    pub fn new(config: KeyframeConfig, matcher: Arc<dyn MatchFeatures>) -> Self {
        Self {
            config,
            matcher,
            frame_matches: BTreeMap::new(),
            keyframe_misses: Vec::new(),
            span: tracing::info_span!("close_loops", method = "keyframe"),
        }
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &KeyframeConfig {
        &self.config
    }

    /// Match two frames and join their tracks if there are enough matches.
    /// Returns the number of matches and of joined tracks.
    fn match_and_join(
        &self,
        tracks: &mut TrackSet,
        frame_number: FrameId,
        frame: FrameId,
    ) -> (usize, usize) {
        let pairs = match_tracks(self.matcher.as_ref(), tracks, frame_number, frame);
        let joined = if pairs.len() >= self.config.match_req {
            pairs
                .iter()
                .filter(|&&(current, past)| tracks.merge_tracks(current, past))
                .count()
        } else {
            0
        };
        (pairs.len(), joined)
    }

    /// Promote the best matched frame since the first miss, once there are
    /// enough misses and the first has left the neighbourhood.
    fn promote_keyframe(&mut self, tracks: &mut TrackSet, oldest_searched: Option<FrameId>) {
        let Some(&first_miss) = self.keyframe_misses.first() else {
            return;
        };
        let Some(oldest_searched) = oldest_searched else {
            return;
        };
        if self.keyframe_misses.len() <= self.config.min_keyframe_misses
            || first_miss >= oldest_searched
        {
            return;
        }

        let mut best = (first_miss, 0);
        for (&frame, &matches) in self.frame_matches.range(first_miss + 1..) {
            if matches > best.1 {
                best = (frame, matches);
            }
        }
        let (frame, matches) = best;
        if matches <= self.config.match_req {
            return;
        }
        tracing::info!("creating new keyframe on frame {frame}");
        mark_keyframe(tracks, frame);
        self.keyframe_misses.clear();
    }
}

fn mark_keyframe(tracks: &mut TrackSet, frame: FrameId) {
    let mut data = tracks.frame_data(frame).copied().unwrap_or_default();
    data.is_keyframe = true;
    tracks.set_frame_data(frame, data);
}

impl CloseLoops for Keyframe {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        mut tracks: TrackSet,
        _image: &GrayImage,
        _mask: Option<&GrayImage>,
    ) -> TrackSet {
        let span = self.span.clone();
        let _enter = span.enter();
        self.frame_matches.insert(frame_number, 0);

        // Newest first
        let frames: Vec<FrameId> = tracks.all_frame_ids().into_iter().rev().collect();
        if frames.len() <= 2 {
            return tracks;
        }
        let previous = frames[1];
        let bandwidth = self.config.search_bandwidth;
        // First frame past the neighbourhood; only older keyframes are searched
        let oldest_searched = frames.get(bandwidth).copied();
        let neighbourhood: Vec<FrameId> = frames
            .iter()
            .take(bandwidth)
            .skip(2)
            .copied()
            .collect();

        let mut keyframes: Vec<FrameId> = tracks.keyframes().into_iter().rev().collect();
        if keyframes.is_empty() {
            let first = tracks.first_frame();
            mark_keyframe(&mut tracks, first);
            keyframes.push(first);
        }

        // Tracks already continued from the previous frame count as matches
        let on_previous = tracks.active_track_ids(previous);
        let mut neighbourhood_matches = tracks
            .active_track_ids(frame_number)
            .intersection(&on_previous)
            .count();

        let mut max_keyframe_matched = 0;
        let mut newer_keyframes = keyframes.iter().copied().peekable();
        for &frame in &neighbourhood {
            let (matched, joined) = self.match_and_join(&mut tracks, frame_number, frame);
            neighbourhood_matches += matched;

            while newer_keyframes.next_if(|&k| k > frame).is_some() {}
            let kind = if newer_keyframes.next_if_eq(&frame).is_some() {
                max_keyframe_matched = max_keyframe_matched.max(matched);
                "keyframe "
            } else {
                ""
            };
            tracing::info!(
                "Matching frame {frame_number} to {kind}{frame} has {matched} matches and \
                 {joined} joined tracks"
            );
        }
        let average = match neighbourhood.len() {
            0 => neighbourhood_matches,
            n => neighbourhood_matches / n,
        };
        self.frame_matches.insert(frame_number, average);

        if let Some(oldest_searched) = oldest_searched {
            for &keyframe in keyframes.iter().filter(|&&k| k < oldest_searched) {
                let (matched, joined) = self.match_and_join(&mut tracks, frame_number, keyframe);
                tracing::info!(
                    "Matching frame {frame_number} to keyframe {keyframe} has {matched} matches \
                     and {joined} joined tracks"
                );
                max_keyframe_matched = max_keyframe_matched.max(matched);
                if self.config.stop_after_match
                    && max_keyframe_matched >= self.config.match_req
                    && matched < self.config.match_req
                {
                    break;
                }
            }
        }

        if max_keyframe_matched < self.config.match_req {
            self.keyframe_misses.push(frame_number);
            tracing::debug!(
                misses = self.keyframe_misses.len(),
                "frame {frame_number} matched no keyframe"
            );
        }
        self.promote_keyframe(&mut tracks, oldest_searched);
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
