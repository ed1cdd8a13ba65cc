use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

use super::ffmpeg_writer::FfmpegWriter;

/// Encodes `num_frames` flat-colored frames whose brightness steps with the
/// frame index.
pub(crate) fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: u32) {
    let meta = VideoMetadata {
        width,
        height,
        fps: fps as f64,
        frame_rate: None,
        total_frames: num_frames,
        codec: String::new(),
        source_path: None,
    };

    let mut writer = FfmpegWriter::new();
    writer.open(path, &meta).unwrap();
    for i in 0..num_frames {
        let value = ((i * 40) % 256) as u8;
        let data = vec![value; (width * height * 3) as usize];
        writer.write(&Frame::new(data, width, height, 3, i)).unwrap();
    }
    writer.close().unwrap();
}
