use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::clipping::domain::clip::{ClipError, ClipRequest, ExtractedClip};
use crate::clipping::domain::clip_extractor::{ClipExtractor, ReaderFactory, WriterFactory};
use crate::detection::domain::embedding_gate::{EmbeddingGate, ReferenceEmbedding};
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::shared::config::TrackingConfig;
use crate::shared::error::SpotlightError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::appearance_interval::FrameStamp;
use crate::tracking::domain::interval_aggregator::{AppearanceLog, IntervalAggregator};
use crate::tracking::domain::track_manager::{TrackManager, TrackManagerConfig};
use crate::video::domain::image_reader::ImageReader;
use crate::video::domain::video_reader::VideoReader;

use super::appearance_report::AppearanceReport;
use super::clip_executor::ClipExecutor;
use super::pipeline_logger::PipelineLogger;

const FRAME_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;
type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;

pub type ClipResults = Vec<Result<ExtractedClip, ClipError>>;

/// Everything learned from one pass over the video.
pub struct ScanResult {
    pub source_path: PathBuf,
    pub metadata: VideoMetadata,
    pub log: AppearanceLog,
    pub report: AppearanceReport,
    /// Frames on which the detector failed and which were treated as empty.
    pub detector_failures: usize,
    /// The scan stopped early on request. The log holds every appearance
    /// seen up to that point, with any open one closed at the last
    /// processed frame.
    pub cancelled: bool,
}

pub struct TrackingRun {
    pub scan: ScanResult,
    /// `Err` only when the clip phase could not start at all; individual
    /// clip failures are inside the vector.
    pub clips: Result<ClipResults, SpotlightError>,
}

/// Finds one person in a video and cuts a clip for each appearance.
///
/// Scanning decodes on a background thread while detection, gating,
/// tracking and interval bookkeeping run in frame order on the calling
/// thread. Clip extraction is handed to a [`ClipExecutor`] afterwards.
pub struct TrackPersonUseCase {
    image_reader: Box<dyn ImageReader>,
    embedder: Box<dyn FaceEmbedder>,
    reader_factory: ReaderFactory,
    extractor: ClipExtractor,
    clip_executor: Box<dyn ClipExecutor>,
    logger: Box<dyn PipelineLogger>,
    config: TrackingConfig,
    on_progress: Option<ProgressFn>,
    cancelled: Arc<AtomicBool>,
}

impl TrackPersonUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_reader: Box<dyn ImageReader>,
        embedder: Box<dyn FaceEmbedder>,
        reader_factory: ReaderFactory,
        writer_factory: WriterFactory,
        clip_executor: Box<dyn ClipExecutor>,
        logger: Box<dyn PipelineLogger>,
        config: TrackingConfig,
        on_progress: Option<ProgressFn>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        let extractor = ClipExtractor::new(
            reader_factory.clone(),
            writer_factory,
            config.clip_extension.clone(),
        );
        Self {
            image_reader,
            embedder,
            reader_factory,
            extractor,
            clip_executor,
            logger,
            config,
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    /// Scans the video, then extracts one clip per appearance into
    /// `output_dir`.
    pub fn execute(
        &mut self,
        reference_path: &Path,
        video_path: &Path,
        output_dir: &Path,
    ) -> Result<TrackingRun, SpotlightError> {
        let scan = self.scan(reference_path, video_path)?;
        let clips = if scan.cancelled {
            Err(SpotlightError::Cancelled)
        } else {
            self.extract_clips(&scan, output_dir)
        };
        self.logger.summary();
        Ok(TrackingRun { scan, clips })
    }

    pub fn scan(
        &mut self,
        reference_path: &Path,
        video_path: &Path,
    ) -> Result<ScanResult, SpotlightError> {
        self.config.validate()?;
        let reference = self.load_reference(reference_path)?;

        let mut reader = (self.reader_factory)();
        let metadata = reader
            .open(video_path)
            .map_err(|e| SpotlightError::source_unreadable(video_path, e))?;
        if !metadata.fps.is_finite() || metadata.fps <= 0.0 {
            reader.close();
            return Err(SpotlightError::source_unreadable(
                video_path,
                "frame rate is unknown",
            ));
        }
        self.logger.info(&format!(
            "Scanning {} ({}x{} @ {:.2} fps, {} frames)",
            video_path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames
        ));

        let mut state = ScanState {
            gate: EmbeddingGate::new(reference, self.config.similarity_threshold),
            tracker: TrackManager::new(TrackManagerConfig {
                n_init: self.config.n_init,
                max_age: self.config.max_age,
            }),
            aggregator: IntervalAggregator::new(),
            processed: 0,
            decode_truncated: false,
            was_cancelled: false,
            detector_failures: 0,
        };

        let (frame_tx, frame_rx) =
            crossbeam_channel::bounded::<Result<Frame, SendError>>(FRAME_CHANNEL_CAPACITY);
        let reader_cancelled = self.cancelled.clone();

        let reader_joined = std::thread::scope(|scope| {
            let handle =
                scope.spawn(move || read_frames(reader.as_mut(), frame_tx, &reader_cancelled));
            self.process_frames(frame_rx, &metadata, &mut state);
            handle.join()
        });
        match reader_joined {
            Ok(reader_stopped) => state.was_cancelled |= reader_stopped,
            Err(_) => {
                return Err(SpotlightError::source_unreadable(
                    video_path,
                    "decoder thread panicked",
                ))
            }
        }

        if state.was_cancelled {
            self.logger.info(&format!(
                "Scan cancelled after {} frames",
                state.processed
            ));
            if state.processed == 0 {
                return Err(SpotlightError::Cancelled);
            }
        }
        if state.processed == 0 {
            return Err(SpotlightError::source_unreadable(
                video_path,
                "no decodable frames",
            ));
        }

        for interval in state.aggregator.flush() {
            self.logger.interval_closed(&interval);
        }
        let log = state.aggregator.finish();
        let report = AppearanceReport::new(
            &log,
            metadata.fps,
            state.processed,
            state.decode_truncated,
        );
        if !state.was_cancelled {
            self.logger.info(&format!(
                "Scan complete: {} appearances across {} tracks",
                report.appearance_count(),
                report.tracks.len()
            ));
        }

        Ok(ScanResult {
            source_path: video_path.to_path_buf(),
            metadata,
            log,
            report,
            detector_failures: state.detector_failures,
            cancelled: state.was_cancelled,
        })
    }

    /// Cuts one clip per appearance. The output directory is created once
    /// up front; failing that is the only phase-level error.
    pub fn extract_clips(
        &mut self,
        scan: &ScanResult,
        output_dir: &Path,
    ) -> Result<ClipResults, SpotlightError> {
        fs::create_dir_all(output_dir).map_err(|e| SpotlightError::OutputDirectory {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let requests = clip_requests(&scan.log, &scan.source_path, output_dir);
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        self.logger
            .info(&format!("Extracting {} clips", requests.len()));

        let results = self
            .clip_executor
            .execute(&self.extractor, requests, &self.cancelled);
        for result in &results {
            self.logger.clip_finished(result);
        }
        Ok(results)
    }

    /// Emits the logger's end-of-run summary. [`execute`](Self::execute)
    /// does this itself.
    pub fn log_summary(&self) {
        self.logger.summary();
    }

    fn load_reference(&mut self, path: &Path) -> Result<ReferenceEmbedding, SpotlightError> {
        let unreadable = |reason: String| SpotlightError::ReferenceImageUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let image = self
            .image_reader
            .read(path)
            .map_err(|e| unreadable(e.to_string()))?;
        let faces = self
            .embedder
            .detect_and_embed(&image)
            .map_err(|e| unreadable(format!("face detection failed: {e}")))?;

        let not_found = || SpotlightError::ReferenceFaceNotFound {
            path: path.to_path_buf(),
        };
        let first = faces.first().ok_or_else(not_found)?;
        if faces.len() > 1 {
            log::warn!(
                "Reference image has {} faces; using the first at {:?}",
                faces.len(),
                first.bbox
            );
        }
        ReferenceEmbedding::new(&first.embedding).ok_or_else(not_found)
    }

    fn process_frames(
        &mut self,
        frame_rx: crossbeam_channel::Receiver<Result<Frame, SendError>>,
        metadata: &VideoMetadata,
        state: &mut ScanState,
    ) {
        let total = metadata.total_frames;

        for message in frame_rx {
            if self.cancelled.load(Ordering::Relaxed) {
                state.was_cancelled = true;
                break;
            }
            let frame = match message {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!(
                        "Decoding stopped after {} frames: {e}; treating as end of stream",
                        state.processed
                    );
                    state.decode_truncated = true;
                    break;
                }
            };

            let t0 = Instant::now();
            let faces = match self.embedder.detect_and_embed(&frame) {
                Ok(faces) => faces,
                Err(e) => {
                    log::warn!("Detection failed on frame {}: {e}", frame.index());
                    state.detector_failures += 1;
                    Vec::new()
                }
            };
            self.logger
                .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
            self.logger.metric("faces", faces.len() as f64);

            let t1 = Instant::now();
            let detections = state.gate.filter(faces);
            let active = state.tracker.update(&detections);
            let stamp = FrameStamp::new(frame.index(), metadata.timestamp(frame.index()));
            for interval in state.aggregator.observe(stamp, &active) {
                self.logger.interval_closed(&interval);
            }
            self.logger
                .timing("track", t1.elapsed().as_secs_f64() * 1000.0);

            state.processed += 1;
            self.logger.progress(state.processed, total);
            if let Some(ref cb) = self.on_progress {
                if !cb(state.processed, total) {
                    self.cancelled.store(true, Ordering::Relaxed);
                }
            }
        }
    }
}

struct ScanState {
    gate: EmbeddingGate,
    tracker: TrackManager,
    aggregator: IntervalAggregator,
    processed: usize,
    decode_truncated: bool,
    was_cancelled: bool,
    detector_failures: usize,
}

/// One request per appearance, by track id then chronologically, with
/// sequence numbers restarting at 1 for each track.
pub fn clip_requests(log: &AppearanceLog, source_path: &Path, output_dir: &Path) -> Vec<ClipRequest> {
    log.values()
        .flat_map(|intervals| {
            intervals.iter().enumerate().map(|(i, interval)| {
                ClipRequest::from_interval(interval, i + 1, source_path, output_dir)
            })
        })
        .collect()
}

/// Returns `true` when decoding stopped because of the cancel flag while
/// frames were still coming.
fn read_frames(
    reader: &mut dyn VideoReader,
    frame_tx: crossbeam_channel::Sender<Result<Frame, SendError>>,
    cancelled: &AtomicBool,
) -> bool {
    let mut stopped = false;
    for frame_result in reader.frames() {
        if cancelled.load(Ordering::Relaxed) {
            stopped = true;
            break;
        }
        let failed = frame_result.is_err();
        let mapped = frame_result.map_err(|e| -> SendError { e.to_string().into() });
        if frame_tx.send(mapped).is_err() || failed {
            break;
        }
    }
    reader.close();
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_embedder::FaceObservation;
    use crate::pipeline::infrastructure::threaded_clip_executor::ThreadedClipExecutor;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::tracking::domain::appearance_interval::AppearanceInterval;
    use crate::video::domain::video_writer::VideoWriter;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const REF_SIZE: u32 = 8;

    // --- Stubs ---

    struct StubImageReader {
        fail: bool,
    }

    impl ImageReader for StubImageReader {
        fn read(&self, _path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("not an image".into());
            }
            Ok(Frame::new(
                vec![0; (REF_SIZE * REF_SIZE * 3) as usize],
                REF_SIZE,
                REF_SIZE,
                3,
                0,
            ))
        }
    }

    #[derive(Clone)]
    struct SourceSpec {
        frames: usize,
        fps: f64,
        fail_at: Option<usize>,
        fail_open: bool,
    }

    struct StubReader {
        spec: SourceSpec,
        start: usize,
        opened: Arc<Mutex<usize>>,
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.spec.fail_open {
                return Err("moov atom not found".into());
            }
            *self.opened.lock().unwrap() += 1;
            Ok(VideoMetadata {
                width: 4,
                height: 4,
                fps: self.spec.fps,
                frame_rate: None,
                total_frames: self.spec.frames,
                codec: "stub".into(),
                source_path: None,
            })
        }

        fn seek(&mut self, frame_index: usize) -> Result<(), Box<dyn std::error::Error>> {
            self.start = frame_index;
            Ok(())
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            let fail_at = self.spec.fail_at;
            Box::new((self.start..self.spec.frames).map(move |i| {
                if Some(i) == fail_at {
                    return Err("invalid data found when processing input".into());
                }
                Ok(Frame::new(vec![0; 4 * 4 * 3], 4, 4, 3, i))
            }))
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct Written {
        files: HashMap<PathBuf, Vec<usize>>,
    }

    struct StubWriter {
        path: Option<PathBuf>,
        written: Arc<Mutex<Written>>,
    }

    impl VideoWriter for StubWriter {
        fn open(
            &mut self,
            path: &Path,
            _metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            fs::write(path, b"")?;
            self.path = Some(path.to_path_buf());
            self.written
                .lock()
                .unwrap()
                .files
                .insert(path.to_path_buf(), Vec::new());
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            let path = self.path.clone().ok_or("not opened")?;
            self.written
                .lock()
                .unwrap()
                .files
                .entry(path)
                .or_default()
                .push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    type Script = Box<dyn Fn(usize) -> Result<Vec<FaceObservation>, String> + Send>;

    /// Returns `reference` for the reference image and `script(index)` for
    /// video frames.
    struct StubEmbedder {
        reference: Vec<FaceObservation>,
        script: Script,
    }

    impl FaceEmbedder for StubEmbedder {
        fn detect_and_embed(
            &mut self,
            frame: &Frame,
        ) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>> {
            if frame.width() == REF_SIZE {
                return Ok(self.reference.clone());
            }
            (self.script)(frame.index()).map_err(Into::into)
        }
    }

    // --- Helpers ---

    fn face_at(x: f64, embedding: [f32; 3]) -> FaceObservation {
        FaceObservation {
            bbox: [x, 100.0, x + 50.0, 150.0],
            embedding: embedding.to_vec(),
        }
    }

    fn target(x: f64) -> FaceObservation {
        face_at(x, [1.0, 0.0, 0.0])
    }

    fn source(frames: usize) -> SourceSpec {
        SourceSpec {
            frames,
            fps: 30.0,
            fail_at: None,
            fail_open: false,
        }
    }

    struct Harness {
        use_case: TrackPersonUseCase,
        written: Arc<Mutex<Written>>,
        opened: Arc<Mutex<usize>>,
    }

    fn harness(
        spec: SourceSpec,
        script: Script,
        config: TrackingConfig,
        on_progress: Option<ProgressFn>,
    ) -> Harness {
        harness_with(spec, vec![target(0.0)], false, script, config, on_progress)
    }

    fn harness_with(
        spec: SourceSpec,
        reference: Vec<FaceObservation>,
        image_fails: bool,
        script: Script,
        config: TrackingConfig,
        on_progress: Option<ProgressFn>,
    ) -> Harness {
        let written = Arc::new(Mutex::new(Written::default()));
        let opened = Arc::new(Mutex::new(0));
        let (w, o) = (written.clone(), opened.clone());
        let use_case = TrackPersonUseCase::new(
            Box::new(StubImageReader { fail: image_fails }),
            Box::new(StubEmbedder { reference, script }),
            Arc::new(move || {
                Box::new(StubReader {
                    spec: spec.clone(),
                    start: 0,
                    opened: o.clone(),
                }) as Box<dyn VideoReader>
            }),
            Arc::new(move || {
                Box::new(StubWriter {
                    path: None,
                    written: w.clone(),
                }) as Box<dyn VideoWriter>
            }),
            Box::new(ThreadedClipExecutor::new(2)),
            Box::new(NullPipelineLogger),
            config,
            on_progress,
            None,
        );
        Harness {
            use_case,
            written,
            opened,
        }
    }

    /// Decoys on frames 0..4 spawn tentative tracks 1-4 that never confirm;
    /// the target is then visible on frames 88..=150, so track 5 confirms on
    /// frame 90.
    fn track_five_script() -> Script {
        Box::new(|i| {
            Ok(match i {
                0..=3 => vec![target(1000.0 + 200.0 * i as f64)],
                88..=150 => vec![target(400.0)],
                _ => vec![],
            })
        })
    }

    // --- Tests ---

    #[test]
    fn test_end_to_end_single_appearance_of_track_five() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clips");
        let mut h = harness(source(300), track_five_script(), TrackingConfig::default(), None);

        let run = h
            .use_case
            .execute(Path::new("me.jpg"), Path::new("in.mp4"), &out)
            .unwrap();

        let report = &run.scan.report;
        assert_eq!(report.tracks.len(), 1);
        let entries = &report.tracks[&5];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_time, "00:00:03");
        assert_eq!(entries[0].end_time, "00:00:05");
        assert_eq!(entries[0].duration, "00:00:02");
        assert_eq!((entries[0].start_frame, entries[0].end_frame), (90, 151));
        assert_eq!(entries[0].last_active_frame, 150);
        assert_eq!(report.frames_processed, 300);
        assert!(!report.decode_truncated);

        let clips = run.clips.unwrap();
        assert_eq!(clips.len(), 1);
        let clip = clips[0].as_ref().unwrap();
        assert_eq!(clip.output_path, out.join("person_5_appearance_1.mp4"));
        assert!(clip.output_path.exists());
        assert!(!clip.truncated);
        assert_eq!(clip.frames_written, 61);

        let written = h.written.lock().unwrap();
        assert_eq!(written.files[&clip.output_path], (90..=150).collect::<Vec<_>>());
    }

    #[test]
    fn test_reappearance_yields_two_clips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackingConfig {
            n_init: 1,
            max_age: 40,
            ..Default::default()
        };
        let script: Script = Box::new(|i| {
            Ok(match i {
                0..=29 | 60..=89 => vec![target(400.0)],
                _ => vec![],
            })
        });
        let mut h = harness(source(120), script, config, None);

        let run = h
            .use_case
            .execute(Path::new("me.jpg"), Path::new("in.mp4"), dir.path())
            .unwrap();

        let entries = &run.scan.report.tracks[&1];
        let frames: Vec<(usize, usize)> =
            entries.iter().map(|e| (e.start_frame, e.end_frame)).collect();
        assert_eq!(frames, vec![(0, 30), (60, 90)]);

        let names: Vec<String> = run
            .clips
            .unwrap()
            .iter()
            .map(|c| {
                let c = c.as_ref().unwrap();
                c.output_path.file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        assert_eq!(
            names,
            vec!["person_1_appearance_1.mp4", "person_1_appearance_2.mp4"]
        );

        let written = h.written.lock().unwrap();
        let mut ranges: Vec<(usize, usize)> = written
            .files
            .values()
            .map(|frames| (frames[0], frames[frames.len() - 1]))
            .collect();
        ranges.sort_unstable();
        assert_eq!(ranges, vec![(0, 29), (60, 89)]);
    }

    #[test]
    fn test_dissimilar_faces_never_tracked() {
        let script: Script = Box::new(|_| Ok(vec![face_at(400.0, [0.0, 1.0, 0.0])]));
        let mut h = harness(source(60), script, TrackingConfig::default(), None);

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();
        assert!(scan.log.is_empty());
        assert_eq!(scan.report.frames_processed, 60);
    }

    #[test]
    fn test_tentative_track_never_reported() {
        // Seen on two frames only, n_init = 3.
        let script: Script = Box::new(|i| Ok(if i < 2 { vec![target(0.0)] } else { vec![] }));
        let mut h = harness(source(40), script, TrackingConfig::default(), None);

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();
        assert!(scan.log.is_empty());
    }

    #[test]
    fn test_still_visible_at_end_closes_at_last_frame() {
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let script: Script = Box::new(|i| Ok(if i >= 10 { vec![target(0.0)] } else { vec![] }));
        let mut h = harness(source(50), script, config, None);

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();
        let entry = &scan.report.tracks[&1][0];
        assert_eq!((entry.start_frame, entry.end_frame), (10, 49));
    }

    #[test]
    fn test_decode_error_flushes_at_last_good_frame() {
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let spec = SourceSpec {
            fail_at: Some(25),
            ..source(100)
        };
        let script: Script = Box::new(|_| Ok(vec![target(0.0)]));
        let mut h = harness(spec, script, config, None);

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();
        assert!(scan.report.decode_truncated);
        assert_eq!(scan.report.frames_processed, 25);
        assert_eq!(scan.report.tracks[&1][0].end_frame, 24);
    }

    #[test]
    fn test_detector_failure_counts_as_empty_frame() {
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let script: Script = Box::new(|i| {
            if i == 5 {
                Err("inference failed".into())
            } else {
                Ok(vec![target(0.0)])
            }
        });
        let mut h = harness(source(10), script, config, None);

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();
        assert_eq!(scan.detector_failures, 1);
        let frames: Vec<(usize, usize)> = scan.report.tracks[&1]
            .iter()
            .map(|e| (e.start_frame, e.end_frame))
            .collect();
        assert_eq!(frames, vec![(0, 5), (6, 9)]);
    }

    #[test]
    fn test_reference_without_face_aborts_before_scanning() {
        let mut h = harness_with(
            source(10),
            Vec::new(),
            false,
            Box::new(|_| Ok(vec![])),
            TrackingConfig::default(),
            None,
        );

        let err = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, SpotlightError::ReferenceFaceNotFound { .. }));
        assert_eq!(*h.opened.lock().unwrap(), 0);
    }

    #[test]
    fn test_zero_norm_reference_is_face_not_found() {
        let mut h = harness_with(
            source(10),
            vec![face_at(0.0, [0.0, 0.0, 0.0])],
            false,
            Box::new(|_| Ok(vec![])),
            TrackingConfig::default(),
            None,
        );
        let err = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, SpotlightError::ReferenceFaceNotFound { .. }));
    }

    #[test]
    fn test_unreadable_reference_image() {
        let mut h = harness_with(
            source(10),
            vec![target(0.0)],
            true,
            Box::new(|_| Ok(vec![])),
            TrackingConfig::default(),
            None,
        );
        let err = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, SpotlightError::ReferenceImageUnreadable { .. }));
    }

    #[test]
    fn test_source_errors() {
        let cases = [
            SourceSpec {
                fail_open: true,
                ..source(10)
            },
            source(0),
            SourceSpec {
                fps: 0.0,
                ..source(10)
            },
            SourceSpec {
                fail_at: Some(0),
                ..source(10)
            },
        ];
        for spec in cases {
            let mut h = harness(spec, Box::new(|_| Ok(vec![])), TrackingConfig::default(), None);
            let err = h
                .use_case
                .scan(Path::new("me.jpg"), Path::new("in.mp4"))
                .err()
                .unwrap();
            assert!(matches!(err, SpotlightError::SourceUnreadable { .. }), "{err}");
        }
    }

    #[test]
    fn test_cancel_keeps_appearances_seen_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(0usize));
        let seen_cb = seen.clone();
        let on_progress: ProgressFn = Box::new(move |current, total| {
            assert_eq!(total, 100);
            *seen_cb.lock().unwrap() = current;
            current < 6
        });
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let script: Script = Box::new(|i| {
            Ok(match i {
                0..=2 | 4..=99 => vec![target(400.0)],
                _ => vec![],
            })
        });
        let mut h = harness(source(100), script, config, Some(on_progress));

        let run = h
            .use_case
            .execute(Path::new("me.jpg"), Path::new("in.mp4"), dir.path())
            .unwrap();

        assert!(run.scan.cancelled);
        assert_eq!(*seen.lock().unwrap(), 6);
        assert_eq!(run.scan.report.frames_processed, 6);
        let frames: Vec<(usize, usize, usize)> = run.scan.report.tracks[&1]
            .iter()
            .map(|e| (e.start_frame, e.end_frame, e.last_active_frame))
            .collect();
        assert_eq!(frames, vec![(0, 3, 2), (4, 5, 5)]);
        assert!(matches!(run.clips, Err(SpotlightError::Cancelled)));
        assert!(h.written.lock().unwrap().files.is_empty());
    }

    #[test]
    fn test_stop_request_on_final_frame_is_not_a_cancellation() {
        let on_progress: ProgressFn = Box::new(|current, total| current < total);
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let script: Script = Box::new(|i| Ok(if i >= 5 { vec![target(400.0)] } else { vec![] }));
        let mut h = harness(source(10), script, config, Some(on_progress));

        let scan = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .unwrap();

        assert!(!scan.cancelled);
        assert_eq!(scan.report.frames_processed, 10);
        let entry = &scan.report.tracks[&1][0];
        assert_eq!((entry.start_frame, entry.end_frame), (5, 9));
    }

    #[test]
    fn test_output_directory_failure_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file.txt");
        fs::write(&blocker, b"x").unwrap();
        let config = TrackingConfig {
            n_init: 1,
            ..Default::default()
        };
        let mut h = harness(source(20), Box::new(|_| Ok(vec![target(0.0)])), config, None);

        let run = h
            .use_case
            .execute(Path::new("me.jpg"), Path::new("in.mp4"), &blocker.join("clips"))
            .unwrap();

        assert_eq!(run.scan.report.appearance_count(), 1);
        assert!(matches!(run.clips, Err(SpotlightError::OutputDirectory { .. })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackingConfig {
            n_init: 0,
            ..Default::default()
        };
        let mut h = harness(source(10), Box::new(|_| Ok(vec![])), config, None);
        let err = h
            .use_case
            .scan(Path::new("me.jpg"), Path::new("in.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, SpotlightError::InvalidConfig(_)));
    }

    #[test]
    fn test_clip_requests_number_per_track() {
        let stamp = |i: usize| FrameStamp::new(i, i as f64 / 30.0);
        let iv = |id: u32, a: usize, b: usize| AppearanceInterval {
            track_id: id,
            start: stamp(a),
            end: stamp(b),
            last_active: stamp(b - 1),
        };
        let mut log = AppearanceLog::new();
        log.insert(7, vec![iv(7, 0, 10), iv(7, 20, 30)]);
        log.insert(3, vec![iv(3, 5, 15)]);

        let reqs = clip_requests(&log, Path::new("in.mp4"), Path::new("out"));
        let keys: Vec<(u32, usize)> = reqs.iter().map(|r| (r.track_id, r.sequence_number)).collect();
        assert_eq!(keys, vec![(3, 1), (7, 1), (7, 2)]);
    }
}
