use serde::Serialize;

use crate::shared::timecode::format_hms;

/// A frame position paired with its presentation time.
///
/// Frame indices travel with the seconds value so clip extraction never
/// has to re-derive them from truncated `HH:MM:SS` text.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrameStamp {
    pub index: usize,
    pub seconds: f64,
}

impl FrameStamp {
    pub fn new(index: usize, seconds: f64) -> Self {
        Self { index, seconds }
    }
}

/// One closed window during which a track was continuously active.
///
/// `end` is the first frame at which the track was observed absent, or the
/// final processed frame when the stream ended while it was still active.
/// Reported times use `end`; `last_active` is the final frame the track was
/// actually seen and bounds the clip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppearanceInterval {
    pub track_id: u32,
    pub start: FrameStamp,
    pub end: FrameStamp,
    pub last_active: FrameStamp,
}

impl AppearanceInterval {
    pub fn duration_seconds(&self) -> f64 {
        self.end.seconds - self.start.seconds
    }

    pub fn start_time(&self) -> String {
        format_hms(self.start.seconds)
    }

    pub fn end_time(&self) -> String {
        format_hms(self.end.seconds)
    }

    pub fn duration(&self) -> String {
        format_hms(self.duration_seconds())
    }
}
