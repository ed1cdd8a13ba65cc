use crate::detection::domain::embedding_gate::{cosine_similarity, l2_normalized, Detection};
use crate::shared::bbox::{bbox_advance, bbox_delta};

/// Weight of the newest box displacement in the velocity estimate.
const VELOCITY_ALPHA: f64 = 0.5;

/// Weight kept by the running appearance feature on each update.
const FEATURE_MOMENTUM: f32 = 0.9;

/// Longest gap, in frames, the motion model extrapolates across.
const MAX_PREDICT_STEPS: usize = 5;

/// Lifecycle of a track identity. `Deleted` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// A persistent identity assigned to a run of associated detections.
#[derive(Clone, Debug)]
pub struct Track {
    id: u32,
    state: TrackState,
    hits: usize,
    misses: usize,
    bbox: [f64; 4],
    velocity: Option<[f64; 4]>,
    feature: Vec<f32>,
    matched: bool,
}

impl Track {
    /// Starts a track from an unmatched detection. The spawning detection
    /// counts as the first consecutive match.
    pub(crate) fn spawn(id: u32, detection: &Detection, n_init: usize) -> Self {
        let state = if n_init <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };
        Self {
            id,
            state,
            hits: 1,
            misses: 0,
            bbox: detection.bbox,
            velocity: None,
            feature: detection.embedding.clone(),
            matched: true,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Consecutive frames with an associated detection.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Consecutive frames without an associated detection.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn bbox(&self) -> [f64; 4] {
        self.bbox
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }

    /// Whether a detection was associated in the current frame.
    pub fn is_matched(&self) -> bool {
        self.matched
    }

    /// Where the box is expected in the current frame, extrapolating the
    /// last observed motion across the frames since it was last seen.
    pub fn predicted_bbox(&self) -> [f64; 4] {
        match self.velocity {
            Some(v) => {
                let steps = (self.misses + 1).min(MAX_PREDICT_STEPS);
                bbox_advance(&self.bbox, &v, steps as f64)
            }
            None => self.bbox,
        }
    }

    pub fn appearance_similarity(&self, embedding: &[f32]) -> f64 {
        cosine_similarity(&self.feature, embedding)
    }

    pub(crate) fn begin_frame(&mut self) {
        self.matched = false;
    }

    pub(crate) fn mark_matched(&mut self, detection: &Detection, n_init: usize) {
        let steps = (self.misses + 1) as f64;
        let step = bbox_delta(&self.bbox, &detection.bbox).map(|d| d / steps);
        self.velocity = Some(match self.velocity {
            Some(v) => {
                let mut blended = [0.0; 4];
                for i in 0..4 {
                    blended[i] = VELOCITY_ALPHA * step[i] + (1.0 - VELOCITY_ALPHA) * v[i];
                }
                blended
            }
            None => step,
        });
        self.bbox = detection.bbox;
        self.update_feature(&detection.embedding);

        self.matched = true;
        self.hits += 1;
        self.misses = 0;
        if self.state == TrackState::Tentative && self.hits >= n_init {
            self.state = TrackState::Confirmed;
        }
    }

    pub(crate) fn mark_missed(&mut self, max_age: usize) {
        self.matched = false;
        self.hits = 0;
        self.misses += 1;
        if self.misses >= max_age {
            self.state = TrackState::Deleted;
        }
    }

    fn update_feature(&mut self, embedding: &[f32]) {
        let blended: Vec<f32> = self
            .feature
            .iter()
            .zip(embedding)
            .map(|(f, e)| FEATURE_MOMENTUM * f + (1.0 - FEATURE_MOMENTUM) * e)
            .collect();
        self.feature = l2_normalized(&blended).unwrap_or_else(|| embedding.to_vec());
    }
}
