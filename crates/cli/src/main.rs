use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use spotlight_core::detection::infrastructure::model_resolver;
use spotlight_core::detection::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use spotlight_core::pipeline::infrastructure::threaded_clip_executor::ThreadedClipExecutor;
use spotlight_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use spotlight_core::pipeline::track_person_use_case::{ClipResults, TrackPersonUseCase};
use spotlight_core::shared::config::TrackingConfig;
use spotlight_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, IMAGE_EXTENSIONS, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use spotlight_core::video::domain::video_reader::VideoReader;
use spotlight_core::video::domain::video_writer::VideoWriter;
use spotlight_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use spotlight_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use spotlight_core::video::infrastructure::image_file_reader::ImageFileReader;

/// Find one person in a video and cut a clip for each appearance.
#[derive(Parser)]
#[command(name = "spotlight")]
struct Cli {
    /// Image containing the person's face.
    reference: PathBuf,

    /// Video to search.
    video: PathBuf,

    /// Directory the clips are written to.
    output_dir: PathBuf,

    /// Minimum cosine similarity to the reference face (-1.0-1.0).
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Consecutive matched frames before a track counts as present.
    #[arg(long)]
    n_init: Option<usize>,

    /// Consecutive missed frames before a track is dropped.
    #[arg(long)]
    max_age: Option<usize>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Clip extraction threads (0 = one per core).
    #[arg(long)]
    workers: Option<usize>,

    /// Container extension for clips, e.g. mp4 or mkv.
    #[arg(long)]
    clip_extension: Option<String>,

    /// JSON file with tracking settings; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the appearance report as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Only report appearance times; do not write clips.
    #[arg(long)]
    no_clips: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = build_config(&cli)?;

    let embedder = build_embedder(config.detector_confidence)?;
    let workers = config.effective_clip_workers();
    log::debug!("Using {workers} clip workers");

    let mut use_case = TrackPersonUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(embedder),
        Arc::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
        Arc::new(|| Box::new(FfmpegWriter::new()) as Box<dyn VideoWriter>),
        Box::new(ThreadedClipExecutor::new(workers)),
        Box::new(StdoutPipelineLogger::default()),
        config,
        None,
        None,
    );

    let scan = use_case.scan(&cli.reference, &cli.video)?;
    println!("{}", scan.report.render_text());
    if scan.report.decode_truncated {
        log::warn!(
            "Video could only be decoded up to frame {}; later appearances are missing",
            scan.report.frames_processed
        );
    }
    if scan.detector_failures > 0 {
        log::warn!(
            "Face detection failed on {} frames; they were treated as empty",
            scan.detector_failures
        );
    }
    if let Some(path) = &cli.report_json {
        fs::write(path, scan.report.to_json()?)?;
        log::info!("Report written to {}", path.display());
    }

    if scan.cancelled {
        log::warn!("Scan was cancelled; skipping clip extraction");
    } else if !cli.no_clips {
        let clips = use_case.extract_clips(&scan, &cli.output_dir)?;
        print_clips(&clips);
    }
    use_case.log_summary();
    Ok(())
}

fn print_clips(clips: &ClipResults) {
    if clips.is_empty() {
        println!("No clips written.");
        return;
    }
    println!("Clips:");
    for result in clips {
        match result {
            Ok(clip) if clip.truncated => println!(
                "  {} ({} frames, source ended early)",
                clip.output_path.display(),
                clip.frames_written
            ),
            Ok(clip) => println!(
                "  {} ({} frames)",
                clip.output_path.display(),
                clip.frames_written
            ),
            Err(e) => println!("  failed: {e}"),
        }
    }
}

fn build_config(cli: &Cli) -> Result<TrackingConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => TrackingConfig::load(path)?,
        None => TrackingConfig::default(),
    };
    if let Some(v) = cli.similarity_threshold {
        config.similarity_threshold = v;
    }
    if let Some(v) = cli.n_init {
        config.n_init = v;
    }
    if let Some(v) = cli.max_age {
        config.max_age = v;
    }
    if let Some(v) = cli.confidence {
        config.detector_confidence = v;
    }
    if let Some(v) = cli.workers {
        config.clip_workers = v;
    }
    if let Some(v) = &cli.clip_extension {
        config.clip_extension = v.trim_start_matches('.').to_string();
    }
    config.validate()?;
    Ok(config)
}

fn build_embedder(confidence: f64) -> Result<OnnxFaceEmbedder, Box<dyn std::error::Error>> {
    log::info!("Resolving models: {YOLO_MODEL_NAME}, {EMBEDDING_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        None,
        Some(Box::new(|done, total| download_progress("face detection", done, total))),
    )?;
    let embedding_path = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        None,
        Some(Box::new(|done, total| download_progress("face embedding", done, total))),
    )?;
    OnnxFaceEmbedder::new(&detector_path, &embedding_path, confidence)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.reference.exists() {
        return Err(format!("Reference image not found: {}", cli.reference.display()).into());
    }
    if !is_image(&cli.reference) {
        return Err(format!(
            "Reference must be an image ({}), got {}",
            IMAGE_EXTENSIONS.join(", "),
            cli.reference.display()
        )
        .into());
    }
    if !cli.video.exists() {
        return Err(format!("Video not found: {}", cli.video.display()).into());
    }
    if is_image(&cli.video) {
        return Err(format!("Expected a video, got an image: {}", cli.video.display()).into());
    }
    if cli.output_dir.is_file() {
        return Err(format!(
            "Output directory is an existing file: {}",
            cli.output_dir.display()
        )
        .into());
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(label: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {label} model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {label} model... {downloaded} bytes");
    }
}
