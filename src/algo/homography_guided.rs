//! Long-range loop closure guided by frame-to-reference homographies.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::algo::close_loops::CloseLoops;
use crate::algo::compute_ref_homography::ComputeRefHomography;
use crate::algo::match_features::{MatchFeatures, match_tracks};
use crate::error::{Error, Result};
use crate::geometry::{FrameToFrameHomography, overlap, relative_homography};
use crate::track::{FrameId, TrackSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomographyGuidedConfig {
    pub enabled: bool,
    /// Most checkpoints kept; the oldest is dropped first
    pub max_checkpoint_frames: usize,
    /// Overlap with the latest checkpoint below which a new one is recorded
    pub checkpoint_percent_overlap: f64,
    /// Append each frame's homography to this file
    pub homography_filename: Option<PathBuf>,
}

impl Default for HomographyGuidedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_checkpoint_frames: 10000,
            checkpoint_percent_overlap: 0.70,
            homography_filename: None,
        }
    }
}

impl HomographyGuidedConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.checkpoint_percent_overlap) {
            return Err(Error::InvalidConfig(format!(
                "checkpoint_percent_overlap ({}) must be in [0, 1]",
                self.checkpoint_percent_overlap
            )));
        }
        Ok(())
    }
}

/// A past frame and its homography to the reference frame at the time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub frame: FrameId,
    pub src_to_ref: FrameToFrameHomography,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    /// Checkpoints still overlapping the current view
    Initial,
    /// The view has left the current neighbourhood
    NonIntersection,
    /// Older checkpoints overlapping the current view again
    Reintersection,
}

/// Detects revisits of earlier scene regions.
///
/// Each frame's homography to the running reference is estimated, and a
/// checkpoint is recorded whenever the view has moved far enough from the
/// latest one. Walking the checkpoints from newest to oldest, the frame that
/// best overlaps the current view after the view was first lost is matched
/// against the current frame and the matched tracks are merged.
pub struct HomographyGuided {
    config: HomographyGuidedConfig,
    matcher: Arc<dyn MatchFeatures>,
    ref_computer: Box<dyn ComputeRefHomography>,
    checkpoints: VecDeque<Checkpoint>,
    span: tracing::Span,
}

impl HomographyGuided {
    pub fn new(
        config: HomographyGuidedConfig,
        matcher: Arc<dyn MatchFeatures>,
        ref_computer: Box<dyn ComputeRefHomography>,
    ) -> Self {
        Self {
            config,
            matcher,
            ref_computer,
            checkpoints: VecDeque::new(),
            span: tracing::info_span!("close_loops", method = "homography_guided"),
        }
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &HomographyGuidedConfig {
        &self.config
    }

    /// Checkpoints, oldest first.
    pub fn checkpoints(&self) -> &VecDeque<Checkpoint> {
        &self.checkpoints
    }

    fn push_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push_back(checkpoint);
        while self.checkpoints.len() > self.config.max_checkpoint_frames {
            self.checkpoints.pop_front();
        }
    }

    fn needs_checkpoint(&self, current: &FrameToFrameHomography, width: u32, height: u32) -> bool {
        let Some(latest) = self.checkpoints.back() else {
            return true;
        };
        match relative_homography(&latest.src_to_ref, current) {
            Some(rel) => {
                overlap(rel.homography(), width, height) < self.config.checkpoint_percent_overlap
            }
            None => {
                tracing::warn!(
                    checkpoint = latest.frame,
                    frame = current.from_id(),
                    "cannot relate frame to latest checkpoint"
                );
                true
            }
        }
    }

    /// Newest-to-oldest scan for the best checkpoint after the view was lost
    /// and found again.
    fn find_revisit(
        &self,
        current: &FrameToFrameHomography,
        width: u32,
        height: u32,
    ) -> Option<FrameId> {
        let mut phase = ScanPhase::Initial;
        let mut best: Option<(FrameId, f64)> = None;
        for checkpoint in self.checkpoints.iter().rev() {
            let po = relative_homography(&checkpoint.src_to_ref, current)
                .map(|rel| overlap(rel.homography(), width, height))
                .filter(|&po| po > 0.0);
            match (phase, po) {
                (ScanPhase::Reintersection, None) => break,
                (ScanPhase::Reintersection, Some(po)) => {
                    if best.is_none_or(|(_, b)| po > b) {
                        best = Some((checkpoint.frame, po));
                    }
                }
                (ScanPhase::Initial, None) => phase = ScanPhase::NonIntersection,
                (ScanPhase::Initial, Some(_)) | (ScanPhase::NonIntersection, None) => {}
                (ScanPhase::NonIntersection, Some(po)) => {
                    best = Some((checkpoint.frame, po));
                    phase = ScanPhase::Reintersection;
                }
            }
        }
        best.map(|(frame, _)| frame)
    }
}

fn append_homography(path: &Path, homography: &FrameToFrameHomography) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{homography}")
}

impl CloseLoops for HomographyGuided {
    fn stitch(
        &mut self,
        frame_number: FrameId,
        mut tracks: TrackSet,
        image: &GrayImage,
        _mask: Option<&GrayImage>,
    ) -> TrackSet {
        let span = self.span.clone();
        let _enter = span.enter();
        if !self.config.enabled {
            return tracks;
        }

        let current = self.ref_computer.estimate(frame_number, &tracks);
        if let Some(path) = &self.config.homography_filename {
            if let Err(e) = append_homography(path, &current) {
                tracing::warn!("failed to append homography to {}: {e}", path.display());
            }
        }

        let (width, height) = image.dimensions();
        if self.needs_checkpoint(&current, width, height) {
            tracing::debug!(frame = frame_number, "recording checkpoint");
            self.push_checkpoint(Checkpoint {
                frame: frame_number,
                src_to_ref: current,
            });
        }

        let Some(prior) = self.find_revisit(&current, width, height) else {
            return tracks;
        };
        let pairs = match_tracks(self.matcher.as_ref(), &tracks, frame_number, prior);
        if pairs.is_empty() {
            tracing::debug!(prior, "revisit candidate without matches");
            return tracks;
        }
        tracing::info!("Stitching frames {prior} and {frame_number}");
        for (current_track, prior_track) in pairs {
            tracks.merge_tracks(current_track, prior_track);
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
