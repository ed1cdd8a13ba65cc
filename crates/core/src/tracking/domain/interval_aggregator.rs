/// Reduces per-frame active-track sets into closed appearance intervals.
///
/// An interval opens on the first frame a track is active and closes on
/// the first frame it is absent, with that frame as its end. Tracks still
/// active when the stream ends are closed at the last observed frame by
/// [`IntervalAggregator::finish`]. Either way the interval also records the
/// last frame the track was active. Separate activity windows of the same
/// track are kept as separate intervals, in chronological order.
use std::collections::{BTreeMap, HashSet};

use super::appearance_interval::{AppearanceInterval, FrameStamp};

/// Closed intervals per track id, each list in chronological order.
pub type AppearanceLog = BTreeMap<u32, Vec<AppearanceInterval>>;

#[derive(Clone, Copy)]
struct OpenInterval {
    start: FrameStamp,
    last_active: FrameStamp,
}

#[derive(Default)]
pub struct IntervalAggregator {
    open: BTreeMap<u32, OpenInterval>,
    closed: AppearanceLog,
    last: Option<FrameStamp>,
}

impl IntervalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one frame into the state. Returns the intervals this frame
    /// closed.
    pub fn observe(&mut self, stamp: FrameStamp, active: &[u32]) -> Vec<AppearanceInterval> {
        debug_assert!(
            self.last.map_or(true, |l| l.index < stamp.index),
            "frames must be observed in strictly increasing order"
        );
        self.last = Some(stamp);

        for &id in active {
            self.open
                .entry(id)
                .or_insert(OpenInterval {
                    start: stamp,
                    last_active: stamp,
                })
                .last_active = stamp;
        }

        let active: HashSet<u32> = active.iter().copied().collect();
        let ended: Vec<u32> = self
            .open
            .keys()
            .copied()
            .filter(|id| !active.contains(id))
            .collect();

        ended
            .into_iter()
            .filter_map(|id| self.close(id, stamp))
            .collect()
    }

    pub fn is_open(&self, track_id: u32) -> bool {
        self.open.contains_key(&track_id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// The timestamp of the most recent frame observed.
    pub fn last_stamp(&self) -> Option<FrameStamp> {
        self.last
    }

    /// Closes every still-open interval at the last observed frame and
    /// returns those intervals, ascending by track id.
    pub fn flush(&mut self) -> Vec<AppearanceInterval> {
        let Some(last) = self.last else {
            return Vec::new();
        };
        let still_open: Vec<u32> = self.open.keys().copied().collect();
        still_open
            .into_iter()
            .filter_map(|id| self.close(id, last))
            .collect()
    }

    /// Flushes and returns the full log.
    pub fn finish(mut self) -> AppearanceLog {
        self.flush();
        self.closed
    }

    fn close(&mut self, track_id: u32, end: FrameStamp) -> Option<AppearanceInterval> {
        let open = self.open.remove(&track_id)?;
        let interval = AppearanceInterval {
            track_id,
            start: open.start,
            end,
            last_active: open.last_active,
        };
        self.closed
            .entry(track_id)
            .or_default()
            .push(interval.clone());
        Some(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FPS: f64 = 30.0;

    fn stamp(index: usize) -> FrameStamp {
        FrameStamp::new(index, index as f64 / FPS)
    }

    /// Feeds frames `0..frames`, making `track_id` active on `active_ranges`.
    fn run(frames: usize, track_id: u32, active_ranges: &[(usize, usize)]) -> AppearanceLog {
        let mut agg = IntervalAggregator::new();
        for i in 0..frames {
            let active: Vec<u32> = if active_ranges.iter().any(|&(a, b)| (a..=b).contains(&i)) {
                vec![track_id]
            } else {
                vec![]
            };
            agg.observe(stamp(i), &active);
        }
        agg.finish()
    }

    #[test]
    fn test_single_window_closes_at_first_absent_frame() {
        let log = run(200, 5, &[(90, 150)]);
        let intervals = &log[&5];
        assert_eq!(intervals.len(), 1);
        let iv = &intervals[0];
        assert_eq!(iv.start.index, 90);
        assert_eq!(iv.end.index, 151);
        assert_eq!(iv.last_active.index, 150);
        assert_eq!(iv.start_time(), "00:00:03");
        assert_eq!(iv.end_time(), "00:00:05");
        assert_eq!(iv.duration(), "00:00:02");
    }

    #[test]
    fn test_reopened_track_produces_two_intervals_in_order() {
        let log = run(120, 5, &[(0, 29), (60, 89)]);
        let intervals = &log[&5];
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start.index, 0);
        assert_eq!(intervals[0].end.index, 30);
        assert_eq!(intervals[1].start.index, 60);
        assert_eq!(intervals[1].end.index, 90);
        assert_eq!(intervals[0].last_active.index, 29);
        assert_eq!(intervals[1].last_active.index, 89);
        assert!(intervals[0].end.seconds <= intervals[1].start.seconds);
    }

    #[test]
    fn test_active_at_end_of_stream_closes_at_last_frame() {
        let log = run(100, 3, &[(40, 99)]);
        let iv = &log[&3][0];
        assert_eq!(iv.start.index, 40);
        assert_eq!(iv.end.index, 99);
        assert_eq!(iv.last_active.index, 99);
    }

    #[test]
    fn test_active_only_on_final_frame_gives_zero_length_interval() {
        let log = run(10, 1, &[(9, 9)]);
        let iv = &log[&1][0];
        assert_eq!(iv.start, iv.end);
        assert_eq!(iv.duration_seconds(), 0.0);
    }

    #[test]
    fn test_observe_returns_intervals_closed_this_frame() {
        let mut agg = IntervalAggregator::new();
        assert!(agg.observe(stamp(0), &[1, 2]).is_empty());
        assert!(agg.is_open(1));
        let closed = agg.observe(stamp(1), &[2]);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].track_id, 1);
        assert!(!agg.is_open(1));
        assert_eq!(agg.open_count(), 1);
        assert_eq!(agg.last_stamp(), Some(stamp(1)));
    }

    #[test]
    fn test_flush_returns_only_open_intervals() {
        let mut agg = IntervalAggregator::new();
        agg.observe(stamp(0), &[1, 2]);
        agg.observe(stamp(1), &[2, 3]);
        let flushed = agg.flush();
        let ids: Vec<u32> = flushed.iter().map(|iv| iv.track_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(flushed.iter().all(|iv| iv.end == stamp(1)));
        assert_eq!(agg.open_count(), 0);
        assert!(agg.flush().is_empty());
        assert_eq!(agg.finish().len(), 3);
    }

    #[test]
    fn test_empty_stream_yields_empty_log() {
        assert!(IntervalAggregator::new().finish().is_empty());
    }

    #[test]
    fn test_never_active_track_has_no_entry() {
        let log = run(50, 7, &[]);
        assert!(log.is_empty());
    }

    #[rstest]
    #[case(vec![vec![1], vec![1, 2], vec![2], vec![], vec![1, 2, 3], vec![3]])]
    #[case(vec![vec![4, 9], vec![9], vec![4], vec![4, 9], vec![]])]
    #[case(vec![vec![], vec![], vec![6]])]
    fn test_closure_every_active_track_gets_an_interval(#[case] frames: Vec<Vec<u32>>) {
        let mut agg = IntervalAggregator::new();
        let mut seen = std::collections::BTreeSet::new();
        for (i, active) in frames.iter().enumerate() {
            seen.extend(active.iter().copied());
            agg.observe(stamp(i), active);
        }
        let log = agg.finish();

        for id in &seen {
            let intervals = log.get(id).expect("track must have an interval");
            assert!(!intervals.is_empty());
            for iv in intervals {
                assert!(iv.start.seconds <= iv.end.seconds);
            }
            for pair in intervals.windows(2) {
                assert!(pair[0].end.index <= pair[1].start.index);
            }
        }
        assert_eq!(log.keys().copied().collect::<Vec<_>>(), seen.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_interval_count_matches_activity_windows() {
        // windows for track 1: [0,1], [3,3], [5,6] -> 3 intervals
        let frames: Vec<Vec<u32>> = vec![
            vec![1],
            vec![1],
            vec![],
            vec![1],
            vec![],
            vec![1],
            vec![1],
        ];
        let mut agg = IntervalAggregator::new();
        for (i, active) in frames.iter().enumerate() {
            agg.observe(stamp(i), active);
        }
        let log = agg.finish();
        let starts: Vec<usize> = log[&1].iter().map(|iv| iv.start.index).collect();
        let ends: Vec<usize> = log[&1].iter().map(|iv| iv.end.index).collect();
        assert_eq!(starts, vec![0, 3, 5]);
        assert_eq!(ends, vec![2, 4, 6]);
    }
}
