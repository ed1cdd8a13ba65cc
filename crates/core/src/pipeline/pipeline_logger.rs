use std::collections::HashMap;
use std::time::Instant;

use crate::clipping::domain::clip::{ClipError, ExtractedClip};
use crate::tracking::domain::appearance_interval::AppearanceInterval;

/// Cross-cutting logger for pipeline orchestration events.
///
/// Decouples the use case from specific output mechanisms so callers can
/// observe a run without changing the orchestration code.
pub trait PipelineLogger: Send {
    /// Report frame-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named pipeline stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. detections per frame).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    fn interval_closed(&mut self, interval: &AppearanceInterval);

    fn clip_finished(&mut self, result: &Result<ExtractedClip, ClipError>);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
    fn interval_closed(&mut self, _interval: &AppearanceInterval) {}
    fn clip_finished(&mut self, _result: &Result<ExtractedClip, ClipError>) {}
}

/// CLI-oriented logger that tracks per-stage timing, metrics and
/// interval/clip counts, and prints a summary when the run completes.
///
/// Progress output is throttled to every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames_seen: usize,
    intervals: usize,
    clips_written: usize,
    clips_truncated: usize,
    clips_failed: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
            intervals: 0,
            clips_written: 0,
            clips_truncated: 0,
            clips_failed: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.frames_seen == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_seen;
        let mut lines = vec![format!(
            "Run summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        lines.push(format!("  Appearances: {}", self.intervals));
        let clips_total = self.clips_written + self.clips_failed;
        if clips_total > 0 {
            lines.push(format!(
                "  Clips: {} written ({} truncated), {} failed",
                self.clips_written, self.clips_truncated, self.clips_failed
            ));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = self.frames_seen.max(current);
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Scanning: {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Scanning: {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn interval_closed(&mut self, interval: &AppearanceInterval) {
        self.intervals += 1;
        log::info!(
            "Track {} seen {} - {}",
            interval.track_id,
            interval.start_time(),
            interval.end_time()
        );
    }

    fn clip_finished(&mut self, result: &Result<ExtractedClip, ClipError>) {
        match result {
            Ok(clip) => {
                self.clips_written += 1;
                if clip.truncated {
                    self.clips_truncated += 1;
                }
                log::info!(
                    "Wrote {} ({} frames{})",
                    clip.output_path.display(),
                    clip.frames_written,
                    if clip.truncated { ", truncated" } else { "" }
                );
            }
            Err(e) => {
                self.clips_failed += 1;
                log::warn!("Clip failed: {e}");
            }
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
