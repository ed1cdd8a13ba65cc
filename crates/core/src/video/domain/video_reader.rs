use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Reads frames from a video source.
///
/// Each reader owns its own demux/decode position; two readers opened on
/// the same file never affect each other.
pub trait VideoReader: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Positions the next `frames()` call so that its first frame is the
    /// first one whose index is at least `frame_index`.
    fn seek(&mut self, frame_index: usize) -> Result<(), Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in presentation order.
    ///
    /// An `Err` item means decoding cannot continue; callers treat it as
    /// the end of the readable stream.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
