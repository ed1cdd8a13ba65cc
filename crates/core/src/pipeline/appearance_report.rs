use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::tracking::domain::appearance_interval::AppearanceInterval;
use crate::tracking::domain::interval_aggregator::AppearanceLog;

/// One appearance of a track, formatted for people and for machines.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppearanceEntry {
    pub sequence_number: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub start_frame: usize,
    /// First frame the track was missing, or the final frame of the scan.
    pub end_frame: usize,
    /// Final frame the track was seen; clips end here.
    pub last_active_frame: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl AppearanceEntry {
    fn new(sequence_number: usize, interval: &AppearanceInterval) -> Self {
        Self {
            sequence_number,
            start_time: interval.start_time(),
            end_time: interval.end_time(),
            duration: interval.duration(),
            start_frame: interval.start.index,
            end_frame: interval.end.index,
            last_active_frame: interval.last_active.index,
            start_seconds: interval.start.seconds,
            end_seconds: interval.end.seconds,
        }
    }
}

/// Result of scanning a video: every appearance per track, ordered by
/// track id and then chronologically.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppearanceReport {
    pub fps: f64,
    pub frames_processed: usize,
    /// Decoding stopped early on a read error; later frames were not seen.
    pub decode_truncated: bool,
    pub tracks: BTreeMap<u32, Vec<AppearanceEntry>>,
}

impl AppearanceReport {
    pub fn new(
        log: &AppearanceLog,
        fps: f64,
        frames_processed: usize,
        decode_truncated: bool,
    ) -> Self {
        let tracks = log
            .iter()
            .map(|(&id, intervals)| {
                let entries = intervals
                    .iter()
                    .enumerate()
                    .map(|(i, interval)| AppearanceEntry::new(i + 1, interval))
                    .collect();
                (id, entries)
            })
            .collect();
        Self {
            fps,
            frames_processed,
            decode_truncated,
            tracks,
        }
    }

    pub fn appearance_count(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::from("Appearance Times:\n");
        for (id, entries) in &self.tracks {
            let _ = writeln!(out, "\nTrack ID: {id}");
            for entry in entries {
                let _ = writeln!(out, "Appearance {}:", entry.sequence_number);
                let _ = writeln!(out, "  Start Time: {}", entry.start_time);
                let _ = writeln!(out, "  End Time: {}", entry.end_time);
                let _ = writeln!(out, "  Duration: {}", entry.duration);
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
