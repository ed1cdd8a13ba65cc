use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::error::SpotlightError;
use crate::shared::timecode::parse_hms;
use crate::tracking::domain::appearance_interval::AppearanceInterval;

/// One clip to cut: an inclusive frame range of the source, labelled with
/// the track and its per-track sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipRequest {
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub track_id: u32,
    /// 1-based, chronological within a track.
    pub sequence_number: usize,
    pub start_frame: usize,
    pub end_frame: usize,
}

impl ClipRequest {
    /// Uses the frame indices the interval carries, so no precision is lost
    /// to `HH:MM:SS` formatting. The clip ends on the last frame the track
    /// was active, never on the first frame it was missing.
    pub fn from_interval(
        interval: &AppearanceInterval,
        sequence_number: usize,
        source_path: &Path,
        output_dir: &Path,
    ) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            track_id: interval.track_id,
            sequence_number,
            start_frame: interval.start.index,
            end_frame: interval.last_active.index,
        }
    }

    /// Builds a request from second-granularity timecodes, mapping each to
    /// `floor(seconds * fps)`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_timecodes(
        source_path: &Path,
        output_dir: &Path,
        track_id: u32,
        sequence_number: usize,
        start: &str,
        end: &str,
        fps: f64,
    ) -> Result<Self, SpotlightError> {
        if fps <= 0.0 {
            return Err(SpotlightError::InvalidConfig(format!(
                "frame rate must be positive, got {fps}"
            )));
        }
        let to_frame = |text: &str| -> Result<usize, SpotlightError> {
            let seconds = parse_hms(text).map_err(SpotlightError::InvalidConfig)?;
            Ok((seconds as f64 * fps).floor() as usize)
        };
        let start_frame = to_frame(start)?;
        let end_frame = to_frame(end)?;
        if end_frame < start_frame {
            return Err(SpotlightError::InvalidConfig(format!(
                "clip end {end} is before start {start}"
            )));
        }
        Ok(Self {
            source_path: source_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            track_id,
            sequence_number,
            start_frame,
            end_frame,
        })
    }

    /// Frames in the requested range, before any truncation.
    pub fn frame_count(&self) -> usize {
        self.end_frame - self.start_frame + 1
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "person_{}_appearance_{}.{extension}",
            self.track_id, self.sequence_number
        )
    }

    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_dir.join(self.file_name(extension))
    }
}

/// A finished clip. `truncated` means the source ran out before
/// `request.end_frame`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedClip {
    pub request: ClipRequest,
    pub output_path: PathBuf,
    pub frames_written: usize,
    pub truncated: bool,
}

/// Why a single clip was not produced. Other clips are unaffected.
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("cannot open source {path}: {reason}")]
    Source { path: PathBuf, reason: String },

    #[error("cannot create clip {path}: {reason}")]
    Create { path: PathBuf, reason: String },

    #[error("failed writing clip {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("cancelled before extraction started")]
    Cancelled,
}
