//! Feature and keyframe views over a track set.

use std::collections::BTreeSet;

use crate::track::track_set::TrackSet;
use crate::track::track_state::{Descriptor, Feature};
use crate::track::{FrameId, TrackId};

/// Match-ready observations on one frame.
///
/// The three vectors are aligned: entry `i` of `features` and `descriptors`
/// belongs to track `track_ids[i]`. Only states carrying both a feature and
/// a descriptor are included, ordered by track ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameObservations {
    pub frame: FrameId,
    pub track_ids: Vec<TrackId>,
    pub features: Vec<Feature>,
    pub descriptors: Vec<Descriptor>,
}

impl FrameObservations {
    pub fn len(&self) -> usize {
        self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }
}

impl TrackSet {
    /// Features and descriptors of the tracks active on a frame.
    pub fn frame_observations(&self, offset: FrameId) -> FrameObservations {
        let frame = self.offset_to_frame(offset);
        let mut obs = FrameObservations {
            frame,
            ..Default::default()
        };
        for track in self.active_tracks(frame) {
            let Some(state) = track.find(frame) else {
                continue;
            };
            if let (Some(feature), Some(descriptor)) = (state.feature(), state.descriptor()) {
                obs.track_ids.push(track.id());
                obs.features.push(feature.clone());
                obs.descriptors.push(descriptor.clone());
            }
        }
        obs
    }

    pub fn frame_features(&self, offset: FrameId) -> Vec<Feature> {
        self.frame_observations(offset).features
    }

    pub fn frame_descriptors(&self, offset: FrameId) -> Vec<Descriptor> {
        self.frame_observations(offset).descriptors
    }

    /// Frames whose frame data marks them as keyframes.
    pub fn keyframes(&self) -> BTreeSet<FrameId> {
        self.all_frame_data()
            .iter()
            .filter(|(_, data)| data.is_keyframe)
            .map(|(&frame, _)| frame)
            .collect()
    }

    pub fn is_keyframe(&self, offset: FrameId) -> bool {
        self.frame_data(offset).is_some_and(|d| d.is_keyframe)
    }
}
