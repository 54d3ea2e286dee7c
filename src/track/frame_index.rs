//! Cached mapping from frame number to the tracks with a state on it.

use std::collections::{BTreeMap, BTreeSet};

use crate::track::track::Track;
use crate::track::{FrameId, TrackId};

/// Frame-to-tracks index derived from the tracks of a set.
///
/// Never authoritative: any mutation the index cannot follow incrementally
/// marks it stale, and the owner rebuilds it before the next read.
#[derive(Debug, Clone)]
pub(crate) struct FrameIndex {
    frames: BTreeMap<FrameId, BTreeSet<TrackId>>,
    stale: bool,
    generation: u64,
}

impl Default for FrameIndex {
    fn default() -> Self {
        Self {
            frames: BTreeMap::new(),
            stale: true,
            generation: 0,
        }
    }
}

impl FrameIndex {
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of full rebuilds performed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn rebuild<'a>(&mut self, tracks: impl IntoIterator<Item = &'a Track>) {
        self.frames.clear();
        for track in tracks {
            for state in track {
                self.frames
                    .entry(state.frame())
                    .or_default()
                    .insert(track.id());
            }
        }
        self.stale = false;
        self.generation += 1;
    }

    /// Record a new state. A stale index is left for the next rebuild.
    pub fn insert(&mut self, frame: FrameId, track: TrackId) {
        if !self.stale {
            self.frames.entry(frame).or_default().insert(track);
        }
    }

    /// Forget a removed state. A stale index is left for the next rebuild.
    pub fn remove(&mut self, frame: FrameId, track: TrackId) {
        if self.stale {
            return;
        }
        if let Some(ids) = self.frames.get_mut(&frame) {
            ids.remove(&track);
            if ids.is_empty() {
                self.frames.remove(&frame);
            }
        }
    }

    pub fn tracks_on(&self, frame: FrameId) -> Option<&BTreeSet<TrackId>> {
        self.frames.get(&frame)
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.frames.keys().copied()
    }

    pub fn first_frame(&self) -> Option<FrameId> {
        self.frames.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<FrameId> {
        self.frames.keys().next_back().copied()
    }
}
