/// Multi-object tracker over gated face detections.
///
/// Two-stage association: confirmed tracks claim detections first, then the
/// remaining tracks (tentative, plus confirmed ones left unmatched) compete
/// for what is left. Each stage scores pairs by overlap with the
/// motion-predicted box, with appearance similarity as a secondary term,
/// and matches greedily by descending score.
///
/// Tracks live in an arena indexed by `id - 1`. Deleted tracks stay in the
/// arena so their ids are never handed out again.
use std::collections::HashSet;

use crate::detection::domain::embedding_gate::Detection;
use crate::shared::bbox::bbox_iou;

use super::track::{Track, TrackState};

/// Minimum overlap with the predicted box for an association.
const MATCH_IOU: f64 = 0.3;

/// Looser overlap accepted when appearance agrees strongly.
const RELAXED_IOU: f64 = 0.1;
const STRONG_APPEARANCE: f64 = 0.8;

/// Weight of appearance similarity relative to IoU in the match score.
const APPEARANCE_WEIGHT: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackManagerConfig {
    pub n_init: usize,
    pub max_age: usize,
}

pub struct TrackManager {
    arena: Vec<Track>,
    live: Vec<usize>,
    config: TrackManagerConfig,
}

impl TrackManager {
    pub fn new(config: TrackManagerConfig) -> Self {
        Self {
            arena: Vec::new(),
            live: Vec::new(),
            config,
        }
    }

    /// Advances the tracker by one frame and returns the ids of confirmed
    /// tracks that received a detection this frame, ascending.
    ///
    /// An empty `detections` slice is a normal frame: every track accrues
    /// a miss.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<u32> {
        for &slot in &self.live {
            self.arena[slot].begin_frame();
        }

        let mut claimed: HashSet<usize> = HashSet::new();
        let confirmed: Vec<usize> = self
            .live
            .iter()
            .copied()
            .filter(|&s| self.arena[s].is_confirmed())
            .collect();
        self.associate(&confirmed, detections, &mut claimed);

        let remaining: Vec<usize> = self
            .live
            .iter()
            .copied()
            .filter(|&s| !self.arena[s].is_matched())
            .collect();
        self.associate(&remaining, detections, &mut claimed);

        self.age_unmatched_tracks();
        self.spawn_tracks(detections, &claimed);

        self.active_ids()
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        let slot = (id as usize).checked_sub(1)?;
        self.arena.get(slot)
    }

    /// Tracks not yet deleted.
    pub fn live_tracks(&self) -> impl Iterator<Item = &Track> {
        self.live.iter().map(|&s| &self.arena[s])
    }

    /// Every track ever created, including deleted ones.
    pub fn total_tracks(&self) -> usize {
        self.arena.len()
    }

    fn associate(
        &mut self,
        slots: &[usize],
        detections: &[Detection],
        claimed: &mut HashSet<usize>,
    ) {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for &slot in slots {
            let track = &self.arena[slot];
            for (di, det) in detections.iter().enumerate() {
                if claimed.contains(&di) {
                    continue;
                }
                if let Some(score) = association_score(track, det) {
                    pairs.push((slot, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_slots = HashSet::new();
        for (slot, di, _) in pairs {
            if used_slots.contains(&slot) || claimed.contains(&di) {
                continue;
            }
            used_slots.insert(slot);
            claimed.insert(di);
            self.arena[slot].mark_matched(&detections[di], self.config.n_init);
        }
    }

    fn age_unmatched_tracks(&mut self) {
        let max_age = self.config.max_age;
        for &slot in &self.live {
            let track = &mut self.arena[slot];
            if !track.is_matched() {
                track.mark_missed(max_age);
                if track.is_deleted() {
                    log::debug!("Track {} deleted after {max_age} missed frames", track.id());
                }
            }
        }
        let arena = &self.arena;
        self.live.retain(|&s| !arena[s].is_deleted());
    }

    fn spawn_tracks(&mut self, detections: &[Detection], claimed: &HashSet<usize>) {
        for (di, det) in detections.iter().enumerate() {
            if claimed.contains(&di) {
                continue;
            }
            let id = self.arena.len() as u32 + 1;
            self.arena.push(Track::spawn(id, det, self.config.n_init));
            self.live.push(self.arena.len() - 1);
        }
    }

    fn active_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .live_tracks()
            .filter(|t| t.is_matched() && t.state() == TrackState::Confirmed)
            .map(|t| t.id())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Score for pairing `track` with `det`, or `None` when the pair is gated out.
fn association_score(track: &Track, det: &Detection) -> Option<f64> {
    let iou = bbox_iou(&track.predicted_bbox(), &det.bbox);
    let appearance = track.appearance_similarity(&det.embedding);
    let admissible = iou >= MATCH_IOU || (iou >= RELAXED_IOU && appearance >= STRONG_APPEARANCE);
    admissible.then_some(iou + APPEARANCE_WEIGHT * appearance)
}
