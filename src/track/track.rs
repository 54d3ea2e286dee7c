//! A single track: a frame-ordered history of track states.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::track::track_state::TrackState;
use crate::track::{FrameId, TrackId};

/// Lifecycle of a track identifier within a track set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLifecycle {
    /// The track is a live member of the set
    Active,
    /// The track's states were merged into another track
    MergedInto(TrackId),
}

/// A track: states ordered by strictly increasing frame number.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    states: Vec<TrackState>,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            states: Vec::new(),
        }
    }

    /// Build a track from states that are already in frame order.
    pub fn from_states(id: TrackId, states: Vec<TrackState>) -> Result<Self> {
        if states.windows(2).any(|w| w[0].frame() >= w[1].frame()) {
            return Err(Error::InvalidData(format!(
                "states of track {id} are not in strictly increasing frame order"
            )));
        }
        Ok(Self { id, states })
    }

    /// Convenience constructor for a track with payload-free states.
    pub fn with_frames(id: TrackId, frames: impl IntoIterator<Item = FrameId>) -> Result<Self> {
        Self::from_states(id, frames.into_iter().map(TrackState::new).collect())
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn first_frame(&self) -> Option<FrameId> {
        self.states.first().map(TrackState::frame)
    }

    pub fn last_frame(&self) -> Option<FrameId> {
        self.states.last().map(TrackState::frame)
    }

    pub fn states(&self) -> &[TrackState] {
        &self.states
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackState> {
        self.states.iter()
    }

    pub fn all_frame_ids(&self) -> BTreeSet<FrameId> {
        self.states.iter().map(TrackState::frame).collect()
    }

    /// Append a state after the current last state.
    ///
    /// Returns false if the state's frame is not after the last frame.
    pub fn append(&mut self, state: TrackState) -> bool {
        if let Some(last) = self.last_frame() {
            if state.frame() <= last {
                return false;
            }
        }
        self.states.push(state);
        true
    }

    /// Insert a state at its frame position.
    ///
    /// Returns false if the track already has a state on that frame.
    pub fn insert(&mut self, state: TrackState) -> bool {
        match self.position(state.frame()) {
            Ok(_) => false,
            Err(pos) => {
                self.states.insert(pos, state);
                true
            }
        }
    }

    /// Remove and return the state on `frame`.
    pub fn remove(&mut self, frame: FrameId) -> Option<TrackState> {
        let pos = self.position(frame).ok()?;
        Some(self.states.remove(pos))
    }

    pub fn find(&self, frame: FrameId) -> Option<&TrackState> {
        self.position(frame).ok().map(|pos| &self.states[pos])
    }

    pub fn contains_frame(&self, frame: FrameId) -> bool {
        self.position(frame).is_ok()
    }

    /// True if the frame ranges of the two tracks intersect.
    pub fn overlaps(&self, other: &Track) -> bool {
        match (
            self.first_frame(),
            self.last_frame(),
            other.first_frame(),
            other.last_frame(),
        ) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 <= b1 && b0 <= a1,
            _ => false,
        }
    }

    /// Move all states of `other` into this track.
    ///
    /// The frame ranges must be disjoint; `other`'s states end up before or
    /// after this track's states in frame order. Returns false, leaving both
    /// tracks untouched, if the ranges overlap.
    pub(crate) fn absorb(&mut self, other: &mut Track) -> bool {
        if self.overlaps(other) {
            return false;
        }
        let before = matches!(
            (other.last_frame(), self.first_frame()),
            (Some(o), Some(s)) if o < s
        );
        let mut moved = std::mem::take(&mut other.states);
        if before {
            moved.append(&mut self.states);
            self.states = moved;
        } else {
            self.states.append(&mut moved);
        }
        true
    }

    pub(crate) fn renumbered(mut self, id: TrackId) -> Self {
        self.id = id;
        self
    }

    fn position(&self, frame: FrameId) -> std::result::Result<usize, usize> {
        self.states.binary_search_by_key(&frame, TrackState::frame)
    }
}

impl<'a> IntoIterator for &'a Track {
    type Item = &'a TrackState;
    type IntoIter = std::slice::Iter<'a, TrackState>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_requires_increasing_frames() {
        let mut t = Track::new(1);
        assert!(t.append(TrackState::new(3)));
        assert!(t.append(TrackState::new(5)));
        assert!(!t.append(TrackState::new(5)));
        assert!(!t.append(TrackState::new(4)));
        assert_eq!(t.first_frame(), Some(3));
        assert_eq!(t.last_frame(), Some(5));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut t = Track::with_frames(1, [1, 5]).unwrap();
        assert!(t.insert(TrackState::new(3)));
        assert!(!t.insert(TrackState::new(3)));
        assert_eq!(t.all_frame_ids().into_iter().collect::<Vec<_>>(), vec![1, 3, 5]);

        assert_eq!(t.remove(3).map(|s| s.frame()), Some(3));
        assert!(t.remove(3).is_none());
        assert!(t.find(5).is_some());
        assert!(!t.contains_frame(3));
    }

    #[test]
    fn test_from_states_rejects_unordered() {
        assert!(Track::with_frames(1, [1, 3, 2]).is_err());
        assert!(Track::with_frames(1, [1, 1]).is_err());
    }

    #[test]
    fn test_absorb_disjoint() {
        let mut early = Track::with_frames(1, [1, 2, 4]).unwrap();
        let mut late = Track::with_frames(2, [5, 7]).unwrap();
        assert!(late.absorb(&mut early));
        assert!(early.is_empty());
        assert_eq!(late.all_frame_ids().into_iter().collect::<Vec<_>>(), vec![1, 2, 4, 5, 7]);
    }

    #[test]
    fn test_absorb_overlapping_is_rejected() {
        let mut a = Track::with_frames(1, [1, 5]).unwrap();
        let mut b = Track::with_frames(2, [3, 9]).unwrap();
        assert!(!b.absorb(&mut a));
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
    }
}
