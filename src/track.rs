//! Track state store: tracks, their per-frame states and the track set.

mod feature_track_set;
mod frame_index;
mod rect;
#[allow(clippy::module_inception)]
mod track;
mod track_set;
mod track_state;

pub use feature_track_set::FrameObservations;
pub use rect::BoundingBox;
pub use track::{Track, TrackLifecycle};
pub use track_set::{FrameData, TrackSet};
pub use track_state::{Descriptor, DetectedObject, Feature, StateData, TrackState};

/// Frame number. Negative values passed to frame queries are offsets from
/// the end of the set (see [`TrackSet::offset_to_frame`]).
pub type FrameId = i64;

/// Track identifier, unique within a [`TrackSet`].
pub type TrackId = i64;

/// Offset addressing the last frame of a track set.
pub const LAST_FRAME: FrameId = -1;
