//! Track set with a lazily rebuilt frame index.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::track::frame_index::FrameIndex;
use crate::track::track::{Track, TrackLifecycle};
use crate::track::track_state::TrackState;
use crate::track::{FrameId, TrackId};

/// Auxiliary data attached to a frame of a track set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameData {
    pub is_keyframe: bool,
}

/// A collection of tracks with unique IDs plus per-frame metadata.
///
/// Frame-indexed queries go through a cached frame index. Mutations either
/// update the index incrementally (state-level changes made through the set)
/// or mark it stale, in which case it is rebuilt in full on the next query.
///
/// The set is single-writer: the index cache lives in a `RefCell`, so the
/// type is not `Sync`.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    tracks: BTreeMap<TrackId, Track>,
    redirects: HashMap<TrackId, TrackId>,
    frame_data: BTreeMap<FrameId, FrameData>,
    index: RefCell<FrameIndex>,
}

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from tracks, failing on the first duplicate ID.
    pub fn from_tracks(tracks: impl IntoIterator<Item = Track>) -> Result<Self> {
        let mut set = Self::new();
        for track in tracks {
            set.insert(track)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    pub fn get_track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Mutable access to a track. The frame index is marked stale.
    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        if !self.tracks.contains_key(&id) {
            return None;
        }
        self.index.get_mut().invalidate();
        self.tracks.get_mut(&id)
    }

    /// All tracks, ordered by ID.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn all_track_ids(&self) -> BTreeSet<TrackId> {
        self.tracks.keys().copied().collect()
    }

    /// Smallest ID not used by a live or merged track.
    pub fn next_track_id(&self) -> TrackId {
        let live = self.tracks.keys().next_back().copied();
        let merged = self.redirects.keys().max().copied();
        live.max(merged).map_or(0, |id| id + 1)
    }

    /// Add a track. Fails if the ID is taken by a live or merged track.
    pub fn insert(&mut self, track: Track) -> Result<()> {
        let id = track.id();
        if self.tracks.contains_key(&id) || self.redirects.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.tracks.insert(id, track);
        self.index.get_mut().invalidate();
        Ok(())
    }

    /// Remove a track. Returns false if it is not a member of the set.
    ///
    /// IDs merged into the track, directly or through a chain of merges, are
    /// forgotten with it and may be inserted again.
    pub fn remove(&mut self, id: TrackId) -> bool {
        if self.tracks.remove(&id).is_none() {
            return false;
        }
        let mut gone = BTreeSet::from([id]);
        loop {
            let sources: Vec<TrackId> = self
                .redirects
                .iter()
                .filter(|&(source, target)| gone.contains(target) && !gone.contains(source))
                .map(|(&source, _)| source)
                .collect();
            if sources.is_empty() {
                break;
            }
            gone.extend(sources);
        }
        self.redirects.retain(|source, _| !gone.contains(source));
        self.index.get_mut().invalidate();
        true
    }

    /// Append a state to a member track.
    pub fn append_state(&mut self, id: TrackId, state: TrackState) -> bool {
        let frame = state.frame();
        let Some(track) = self.tracks.get_mut(&id) else {
            return false;
        };
        if !track.append(state) {
            return false;
        }
        self.notify_new_state(id, frame);
        true
    }

    /// Insert a state into a member track at its frame position.
    pub fn insert_state(&mut self, id: TrackId, state: TrackState) -> bool {
        let frame = state.frame();
        let Some(track) = self.tracks.get_mut(&id) else {
            return false;
        };
        if !track.insert(state) {
            return false;
        }
        self.notify_new_state(id, frame);
        true
    }

    /// Remove the state on `frame` from a member track.
    pub fn remove_state(&mut self, id: TrackId, frame: FrameId) -> Option<TrackState> {
        let state = self.tracks.get_mut(&id)?.remove(frame)?;
        self.notify_removed_state(id, frame);
        Some(state)
    }

    /// Index hook: track `id` gained a state on `frame`.
    pub fn notify_new_state(&mut self, id: TrackId, frame: FrameId) {
        self.index.get_mut().insert(frame, id);
    }

    /// Index hook: track `id` lost its state on `frame`.
    pub fn notify_removed_state(&mut self, id: TrackId, frame: FrameId) {
        self.index.get_mut().remove(frame, id);
    }

    /// Number of full frame index rebuilds so far.
    pub fn index_generation(&self) -> u64 {
        self.index.borrow().generation()
    }

    fn with_index<R>(&self, f: impl FnOnce(&FrameIndex) -> R) -> R {
        let mut index = self.index.borrow_mut();
        if index.is_stale() {
            index.rebuild(self.tracks.values());
            tracing::trace!(
                generation = index.generation(),
                tracks = self.tracks.len(),
                "rebuilt frame index"
            );
        }
        f(&index)
    }

    /// Smallest frame with any state, 0 for an empty set.
    pub fn first_frame(&self) -> FrameId {
        self.with_index(FrameIndex::first_frame).unwrap_or(0)
    }

    /// Largest frame with any state, 0 for an empty set.
    pub fn last_frame(&self) -> FrameId {
        self.with_index(FrameIndex::last_frame).unwrap_or(0)
    }

    pub fn all_frame_ids(&self) -> BTreeSet<FrameId> {
        self.with_index(|index| index.frames().collect())
    }

    /// Resolve a frame offset to an absolute frame.
    ///
    /// Non-negative offsets are frames. Negative offsets count back from one
    /// past the last frame, so `-1` is the last frame. An offset reaching
    /// before frame 0 resolves to one past the last frame.
    pub fn offset_to_frame(&self, offset: FrameId) -> FrameId {
        if offset >= 0 {
            return offset;
        }
        let mut frame = self.last_frame() + 1;
        if offset.unsigned_abs() <= frame.unsigned_abs() {
            frame += offset;
        }
        frame
    }

    /// IDs of tracks with a state on the frame.
    pub fn active_track_ids(&self, offset: FrameId) -> BTreeSet<TrackId> {
        let frame = self.offset_to_frame(offset);
        self.with_index(|index| index.tracks_on(frame).cloned().unwrap_or_default())
    }

    pub fn num_active_tracks(&self, offset: FrameId) -> usize {
        let frame = self.offset_to_frame(offset);
        self.with_index(|index| index.tracks_on(frame).map_or(0, BTreeSet::len))
    }

    /// Tracks with a state on the frame, ordered by ID.
    pub fn active_tracks(&self, offset: FrameId) -> Vec<&Track> {
        self.active_track_ids(offset)
            .into_iter()
            .filter_map(|id| self.tracks.get(&id))
            .collect()
    }

    /// Tracks without a state on the frame, ordered by ID.
    pub fn inactive_tracks(&self, offset: FrameId) -> Vec<&Track> {
        let active = self.active_track_ids(offset);
        self.tracks
            .values()
            .filter(|t| !active.contains(&t.id()))
            .collect()
    }

    /// Tracks whose first state is on the frame.
    pub fn new_tracks(&self, offset: FrameId) -> Vec<&Track> {
        let frame = self.offset_to_frame(offset);
        self.active_tracks(frame)
            .into_iter()
            .filter(|t| t.first_frame() == Some(frame))
            .collect()
    }

    /// Tracks whose last state is on the frame.
    pub fn terminated_tracks(&self, offset: FrameId) -> Vec<&Track> {
        let frame = self.offset_to_frame(offset);
        self.active_tracks(frame)
            .into_iter()
            .filter(|t| t.last_frame() == Some(frame))
            .collect()
    }

    /// Fraction of the tracks active on `offset_a` that are also active on
    /// `offset_b`. Returns 0 when nothing is active on `offset_a`.
    pub fn percentage_tracked(&self, offset_a: FrameId, offset_b: FrameId) -> f64 {
        let on_a = self.active_track_ids(offset_a);
        if on_a.is_empty() {
            return 0.0;
        }
        let on_b = self.active_track_ids(offset_b);
        let both = on_a.intersection(&on_b).count();
        both as f64 / on_a.len() as f64
    }

    /// States on the frame, ordered by track ID.
    pub fn frame_states(&self, offset: FrameId) -> Vec<&TrackState> {
        let frame = self.offset_to_frame(offset);
        self.active_tracks(frame)
            .into_iter()
            .filter_map(|t| t.find(frame))
            .collect()
    }

    /// Follow merge redirects from `id` to the live track holding its states.
    pub fn resolve(&self, id: TrackId) -> Option<TrackId> {
        let mut current = id;
        while let Some(&next) = self.redirects.get(&current) {
            current = next;
        }
        self.tracks.contains_key(&current).then_some(current)
    }

    /// Lifecycle of a track ID, or `None` if the set never held it (or it
    /// was removed).
    pub fn lifecycle(&self, id: TrackId) -> Option<TrackLifecycle> {
        if self.tracks.contains_key(&id) {
            return Some(TrackLifecycle::Active);
        }
        self.redirects
            .get(&id)
            .map(|&target| TrackLifecycle::MergedInto(target))
    }

    /// Move all states of `source` into `destination`.
    ///
    /// Both IDs are resolved through merge redirects first. The merge fails,
    /// leaving the set unchanged, if either track is not a member, if they
    /// are the same track, or if their frame ranges overlap. On success
    /// `source` leaves the set and becomes a redirect to `destination`.
    pub fn merge_tracks(&mut self, source: TrackId, destination: TrackId) -> bool {
        let (Some(source), Some(destination)) = (self.resolve(source), self.resolve(destination))
        else {
            return false;
        };
        if source == destination {
            return false;
        }
        let Some(mut src) = self.tracks.remove(&source) else {
            return false;
        };
        let frames: Vec<FrameId> = src.iter().map(TrackState::frame).collect();
        let absorbed = match self.tracks.get_mut(&destination) {
            Some(dst) => dst.absorb(&mut src),
            None => false,
        };
        if !absorbed {
            self.tracks.insert(source, src);
            return false;
        }

        self.redirects.insert(source, destination);
        let index = self.index.get_mut();
        for frame in frames {
            index.remove(frame, source);
            index.insert(frame, destination);
        }
        true
    }

    /// Merge the tracks of another set into this one.
    ///
    /// Tracks with unused IDs are copied in. A track whose ID is already
    /// taken is either copied under a fresh ID (`do_not_append_tracks`) or
    /// has its states inserted into the existing track, skipping frames the
    /// existing track already covers.
    pub fn merge_in_other_track_set(&mut self, other: &TrackSet, do_not_append_tracks: bool) {
        let mut next_id = self.next_track_id().max(other.next_track_id());
        for track in other.tracks() {
            let id = track.id();
            let taken = self.tracks.contains_key(&id) || self.redirects.contains_key(&id);
            if !taken {
                self.tracks.insert(id, track.clone());
                self.index.get_mut().invalidate();
            } else if do_not_append_tracks || !self.tracks.contains_key(&id) {
                self.tracks
                    .insert(next_id, track.clone().renumbered(next_id));
                self.index.get_mut().invalidate();
                next_id += 1;
            } else {
                for state in track {
                    self.insert_state(id, state.clone());
                }
            }
        }
    }

    /// Data attached to the frame, if any.
    pub fn frame_data(&self, offset: FrameId) -> Option<&FrameData> {
        self.frame_data.get(&self.offset_to_frame(offset))
    }

    pub fn set_frame_data(&mut self, offset: FrameId, data: FrameData) {
        let frame = self.offset_to_frame(offset);
        self.frame_data.insert(frame, data);
    }

    /// Remove the frame's data. Returns false if there was none.
    pub fn remove_frame_data(&mut self, offset: FrameId) -> bool {
        let frame = self.offset_to_frame(offset);
        self.frame_data.remove(&frame).is_some()
    }

    pub fn all_frame_data(&self) -> &BTreeMap<FrameId, FrameData> {
        &self.frame_data
    }

    pub fn set_all_frame_data(&mut self, frame_data: BTreeMap<FrameId, FrameData>) {
        self.frame_data = frame_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tracks: &[&Track]) -> Vec<TrackId> {
        tracks.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_insert_duplicate_id() {
        let mut set = TrackSet::new();
        set.insert(Track::with_frames(1, [1]).unwrap()).unwrap();
        let err = set.insert(Track::with_frames(1, [2]).unwrap()).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_forgets_merged_ids() {
        let mut set = TrackSet::from_tracks([
            Track::with_frames(0, [1, 2]).unwrap(),
            Track::with_frames(1, [3]).unwrap(),
            Track::with_frames(2, [4]).unwrap(),
            Track::with_frames(3, [9]).unwrap(),
        ])
        .unwrap();
        assert!(set.merge_tracks(2, 1));
        assert!(set.merge_tracks(1, 0));
        assert_eq!(set.resolve(2), Some(0));

        assert!(set.remove(0));
        assert_eq!(set.lifecycle(1), None);
        assert_eq!(set.lifecycle(2), None);

        // The freed ID names an unrelated track now
        set.insert(Track::with_frames(0, [50]).unwrap()).unwrap();
        assert_eq!(set.resolve(1), None);
        assert_eq!(set.resolve(2), None);
        assert!(!set.merge_tracks(1, 3));
        assert_eq!(set.get_track(0).unwrap().all_frame_ids(), [50].into_iter().collect());
        assert_eq!(set.lifecycle(3), Some(TrackLifecycle::Active));
    }

    #[test]
    fn test_offsets() {
        let set = TrackSet::from_tracks([
            Track::with_frames(0, [1, 2, 3]).unwrap(),
            Track::with_frames(1, [3, 4]).unwrap(),
        ])
        .unwrap();
        assert_eq!(set.offset_to_frame(2), 2);
        assert_eq!(set.offset_to_frame(-1), 4);
        assert_eq!(set.offset_to_frame(-2), 3);
        // Reaching before frame 0 matches nothing
        assert_eq!(set.offset_to_frame(-10), 5);
        assert_eq!(set.offset_to_frame(FrameId::MIN), 5);
        assert_eq!(ids(&set.active_tracks(-1)), vec![1]);
    }

    #[test]
    fn test_state_hooks_keep_index_fresh() {
        let mut set = TrackSet::from_tracks([Track::with_frames(0, [1, 2]).unwrap()]).unwrap();
        assert_eq!(set.num_active_tracks(2), 1);
        let generation = set.index_generation();

        assert!(set.append_state(0, TrackState::new(3)));
        assert!(!set.append_state(0, TrackState::new(3)));
        assert!(set.remove_state(0, 1).is_some());

        assert_eq!(set.num_active_tracks(3), 1);
        assert_eq!(set.num_active_tracks(1), 0);
        assert_eq!(set.index_generation(), generation);
    }

    #[test]
    fn test_lazy_rebuild_after_many_mutations() {
        let mut set = TrackSet::new();
        for id in 0..5 {
            set.insert(Track::with_frames(id, [id, id + 1]).unwrap()).unwrap();
        }
        assert_eq!(set.index_generation(), 0);
        assert_eq!(set.num_active_tracks(1), 2);
        assert_eq!(set.index_generation(), 1);
        assert_eq!(set.num_active_tracks(2), 2);
        assert_eq!(set.index_generation(), 1);

        assert!(set.remove(0));
        assert_eq!(set.num_active_tracks(1), 1);
        assert_eq!(set.index_generation(), 2);
    }

    #[test]
    fn test_track_mut_invalidates_index() {
        let mut set = TrackSet::from_tracks([Track::with_frames(0, [1]).unwrap()]).unwrap();
        assert_eq!(set.last_frame(), 1);
        if let Some(track) = set.track_mut(0) {
            track.append(TrackState::new(8));
        }
        assert_eq!(set.last_frame(), 8);
    }

    #[test]
    fn test_merge_redirect_chain() {
        let mut set = TrackSet::from_tracks([
            Track::with_frames(0, [1, 2]).unwrap(),
            Track::with_frames(1, [4, 5]).unwrap(),
            Track::with_frames(2, [7]).unwrap(),
        ])
        .unwrap();
        assert!(set.merge_tracks(1, 0));
        assert_eq!(set.lifecycle(1), Some(TrackLifecycle::MergedInto(0)));
        // Merging through the redirect lands on track 0
        assert!(set.merge_tracks(2, 1));
        assert_eq!(set.resolve(2), Some(0));
        assert_eq!(set.get_track(0).map(Track::len), Some(5));
        assert_eq!(ids(&set.active_tracks(7)), vec![0]);
        // A merged ID cannot be reused
        assert!(set.insert(Track::with_frames(1, [9]).unwrap()).is_err());
    }

    #[test]
    fn test_merge_into_self_fails() {
        let mut set = TrackSet::from_tracks([
            Track::with_frames(0, [1]).unwrap(),
            Track::with_frames(1, [2]).unwrap(),
        ])
        .unwrap();
        assert!(set.merge_tracks(1, 0));
        assert!(!set.merge_tracks(1, 0));
    }

    #[test]
    fn test_merge_in_other_track_set() {
        let mut set = TrackSet::from_tracks([Track::with_frames(0, [1, 2]).unwrap()]).unwrap();
        let other = TrackSet::from_tracks([
            Track::with_frames(0, [2, 3]).unwrap(),
            Track::with_frames(4, [3]).unwrap(),
        ])
        .unwrap();

        let mut appended = set.clone();
        appended.merge_in_other_track_set(&other, false);
        assert_eq!(appended.len(), 2);
        assert_eq!(
            appended.get_track(0).map(Track::all_frame_ids),
            Some([1, 2, 3].into_iter().collect())
        );

        set.merge_in_other_track_set(&other, true);
        assert_eq!(set.len(), 3);
        assert_eq!(set.all_track_ids(), [0, 4, 5].into_iter().collect());
        assert_eq!(set.num_active_tracks(3), 2);
    }

    #[test]
    fn test_frame_data() {
        let mut set = TrackSet::from_tracks([Track::with_frames(0, [1, 2]).unwrap()]).unwrap();
        assert!(!set.remove_frame_data(-1));
        set.set_frame_data(-1, FrameData { is_keyframe: true });
        assert_eq!(set.frame_data(2), Some(&FrameData { is_keyframe: true }));
        assert!(set.remove_frame_data(2));
        assert!(set.all_frame_data().is_empty());
    }
}
