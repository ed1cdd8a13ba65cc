use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
/// Frame numbers always come from presentation timestamps (see
/// [`presentation_index`]), whether or not the reader was seeked, so a
/// full scan and a clip cut from the middle agree on every index. After
/// [`VideoReader::seek`], the demuxer jumps to the preceding keyframe and
/// frames before the target are decoded and discarded.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    metadata: Option<VideoMetadata>,
    start_frame: usize,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
            metadata: None,
            start_frame: 0,
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let (fps, frame_rate) = if rate.denominator() != 0 {
            (
                rate.numerator() as f64 / rate.denominator() as f64,
                Some((rate.numerator(), rate.denominator())),
            )
        } else {
            (0.0, None)
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            frame_rate,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };

        self.video_stream_index = video_stream_index;
        self.metadata = Some(metadata.clone());
        self.input_ctx = Some(ictx);
        self.start_frame = 0;

        Ok(metadata)
    }

    fn seek(&mut self, frame_index: usize) -> Result<(), Box<dyn std::error::Error>> {
        if self.input_ctx.is_none() {
            return Err("FfmpegReader: not opened".into());
        }
        self.start_frame = frame_index;
        Ok(())
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let (Some(ictx), Some(metadata)) = (self.input_ctx.as_mut(), self.metadata.as_ref()) else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };
        let fps = metadata.fps;
        let start_frame = self.start_frame;

        let setup = match prepare_decode(ictx, self.video_stream_index) {
            Ok(setup) => setup,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        if start_frame > 0 && fps > 0.0 {
            let target_us = (start_frame as f64 / fps * 1_000_000.0) as i64;
            if let Err(e) = ictx.seek(target_us, ..target_us) {
                log::debug!("Seek to frame {start_frame} failed ({e}); decoding from start");
            }
        }

        Box::new(FfmpegFrameIter {
            ictx,
            decoder: setup.decoder,
            scaler: setup.scaler,
            width: setup.width,
            height: setup.height,
            video_stream_index: self.video_stream_index,
            tick_seconds: setup.tick_seconds,
            stream_start: setup.stream_start,
            fps,
            start_frame,
            min_next: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.metadata = None;
        self.start_frame = 0;
    }
}

struct DecodeSetup {
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    tick_seconds: f64,
    stream_start: i64,
}

fn prepare_decode(
    ictx: &ffmpeg_next::format::context::Input,
    video_stream_index: usize,
) -> Result<DecodeSetup, Box<dyn std::error::Error>> {
    let stream = ictx
        .stream(video_stream_index)
        .ok_or("Video stream disappeared")?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;

    let width = decoder.width();
    let height = decoder.height();

    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;

    // AV_NOPTS_VALUE is i64::MIN
    let stream_start = match stream.start_time() {
        i64::MIN => 0,
        t => t,
    };

    Ok(DecodeSetup {
        decoder,
        scaler,
        width,
        height,
        tick_seconds: f64::from(stream.time_base()),
        stream_start,
    })
}

/// Lazy iterator that decodes video frames one at a time, avoiding the need
/// to buffer the entire video in memory.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    tick_seconds: f64,
    stream_start: i64,
    fps: f64,
    start_frame: usize,
    /// Smallest index the next decoded frame may take.
    min_next: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let index = presentation_index(
                decoded.timestamp(),
                self.stream_start,
                self.tick_seconds,
                self.fps,
                self.min_next,
            );
            self.min_next = index + 1;
            if index < self.start_frame {
                continue;
            }

            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
                return Some(Err(Box::new(e)));
            }
            let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
            return Some(Ok(Frame::new(pixels, self.width, self.height, 3, index)));
        }
        None
    }
}

/// Frame index of a decoded frame: its presentation time times `fps`,
/// rounded, but never below `min_index` (one past the previous frame).
/// Frames without a timestamp take `min_index`. Variable-rate gaps
/// therefore skip indices, and duplicate or backwards timestamps still
/// get strictly increasing ones.
fn presentation_index(
    timestamp: Option<i64>,
    stream_start: i64,
    tick_seconds: f64,
    fps: f64,
    min_index: usize,
) -> usize {
    let Some(ts) = timestamp else {
        return min_index;
    };
    let seconds = (ts - stream_start) as f64 * tick_seconds;
    let index = (seconds * fps).round().max(0.0) as usize;
    index.max(min_index)
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::infrastructure::test_video::create_test_video;
    use rstest::rstest;

    // 90 kHz ticks, as in MPEG-TS.
    const TICK: f64 = 1.0 / 90_000.0;

    #[rstest]
    #[case::first_frame(Some(0), 0, 0)]
    #[case::constant_rate(Some(3000 * 90), 0, 90)]
    #[case::rounds_jitter(Some(3000 * 90 + 400), 0, 90)]
    #[case::variable_rate_gap_skips(Some(3000 * 12), 5, 12)]
    #[case::duplicate_timestamp(Some(3000 * 4), 5, 5)]
    #[case::backwards_timestamp(Some(3000 * 2), 5, 5)]
    #[case::missing_timestamp(None, 7, 7)]
    fn test_presentation_index(
        #[case] timestamp: Option<i64>,
        #[case] min_index: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(presentation_index(timestamp, 0, TICK, 30.0, min_index), expected);
    }

    #[test]
    fn test_presentation_index_subtracts_stream_start() {
        let start = 126_000;
        assert_eq!(presentation_index(Some(start), start, TICK, 30.0, 0), 0);
        assert_eq!(presentation_index(Some(start + 3000 * 20), start, TICK, 30.0, 0), 20);
    }

    #[test]
    fn test_scan_and_seek_agree_on_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 40, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let full: Vec<(usize, Vec<u8>)> = reader
            .frames()
            .map(|f| {
                let f = f.unwrap();
                (f.index(), f.data().to_vec())
            })
            .collect();

        let mut clip = FfmpegReader::new();
        clip.open(&path).unwrap();
        clip.seek(25).unwrap();
        let first = clip.frames().next().unwrap().unwrap();
        assert_eq!(first.index(), 25);
        assert_eq!(first.data(), full[25].1.as_slice());
        assert_eq!(full[25].0, 25);
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 5, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!((meta.fps - 30.0).abs() < 0.01);
        assert_eq!(meta.source_path, Some(path));
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open(Path::new("/nonexistent/test.mp4")).is_err());
    }

    #[test]
    fn test_open_non_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"definitely not a video").unwrap();

        let mut reader = FfmpegReader::new();
        assert!(reader.open(&path).is_err());
    }

    #[test]
    fn test_frames_yields_sequential_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 5, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
    }

    #[test]
    fn test_seek_starts_at_requested_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 40, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.seek(20).unwrap();

        let indices: Vec<usize> = reader.frames().map(|f| f.unwrap().index()).collect();
        assert_eq!(indices, (20..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_seek_past_end_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 10, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.seek(500).unwrap();
        assert_eq!(reader.frames().count(), 0);
    }

    #[test]
    fn test_independent_readers_do_not_share_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 30, 160, 120, 30);

        let mut a = FfmpegReader::new();
        let mut b = FfmpegReader::new();
        a.open(&path).unwrap();
        b.open(&path).unwrap();
        a.seek(15).unwrap();

        let first_a = a.frames().next().unwrap().unwrap().index();
        let first_b = b.frames().next().unwrap().unwrap().index();
        assert_eq!(first_a, 15);
        assert_eq!(first_b, 0);
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = FfmpegReader::new();
        let result = reader.frames().next().unwrap();
        assert!(result.is_err());
        assert!(reader.seek(3).is_err());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 1, 160, 120, 30);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
    }
}
