use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Abstracts video encoding so clip extraction can write output without
/// depending on a specific codec library.
pub trait VideoWriter: Send {
    /// Creates the output file at the metadata's resolution and frame rate.
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes buffered frames, finalizes the container and releases the
    /// file. Safe to call more than once.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
