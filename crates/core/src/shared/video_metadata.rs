use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Exact stream rate as `(numerator, denominator)`, e.g. `(30000, 1001)`,
    /// when the container reports one.
    pub frame_rate: Option<(i32, i32)>,
    /// Container-reported frame count; 0 when the container does not say.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Presentation time of a frame, in seconds from the start of the stream.
    pub fn timestamp(&self, frame_index: usize) -> f64 {
        if self.fps <= 0.0 {
            return 0.0;
        }
        frame_index as f64 / self.fps
    }
}
