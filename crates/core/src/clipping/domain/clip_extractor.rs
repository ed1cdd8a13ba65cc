/// Cuts one frame range of a source video into its own file.
///
/// Every call opens a fresh reader and writer from the factories, so any
/// number of extractions can run side by side on the same source.
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

use super::clip::{ClipError, ClipRequest, ExtractedClip};

pub type ReaderFactory = Arc<dyn Fn() -> Box<dyn VideoReader> + Send + Sync>;
pub type WriterFactory = Arc<dyn Fn() -> Box<dyn VideoWriter> + Send + Sync>;

const PROGRESS_EVERY: usize = 30;

#[derive(Clone)]
pub struct ClipExtractor {
    reader_factory: ReaderFactory,
    writer_factory: WriterFactory,
    extension: String,
}

struct CopyOutcome {
    frames_written: usize,
    truncated: bool,
}

impl ClipExtractor {
    pub fn new(
        reader_factory: ReaderFactory,
        writer_factory: WriterFactory,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            reader_factory,
            writer_factory,
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Writes `request`'s frames to `<output_dir>/<file_name>`.
    ///
    /// The writer is closed on every path. Running out of source frames is
    /// not an error; the clip is marked `truncated`. A failed clip leaves no
    /// file behind.
    pub fn extract(&self, request: &ClipRequest) -> Result<ExtractedClip, ClipError> {
        let output_path = request.output_path(&self.extension);
        let source_err = |e: Box<dyn std::error::Error>| ClipError::Source {
            path: request.source_path.clone(),
            reason: e.to_string(),
        };

        let mut reader = (self.reader_factory)();
        let metadata = reader.open(&request.source_path).map_err(source_err)?;
        if let Err(e) = reader.seek(request.start_frame) {
            reader.close();
            return Err(source_err(e));
        }

        fs::create_dir_all(&request.output_dir).map_err(|e| ClipError::Create {
            path: output_path.clone(),
            reason: e.to_string(),
        })?;

        let mut writer = (self.writer_factory)();
        if let Err(e) = writer.open(&output_path, &metadata) {
            reader.close();
            let _ = writer.close();
            remove_partial(&output_path);
            return Err(ClipError::Create {
                path: output_path,
                reason: e.to_string(),
            });
        }

        let copied = copy_range(reader.as_mut(), writer.as_mut(), request);
        let closed = writer.close();
        reader.close();

        match (copied, closed) {
            (Ok(outcome), Ok(())) => {
                if outcome.truncated {
                    log::debug!(
                        "Clip {} truncated at {} of {} frames",
                        output_path.display(),
                        outcome.frames_written,
                        request.frame_count()
                    );
                }
                Ok(ExtractedClip {
                    request: request.clone(),
                    output_path,
                    frames_written: outcome.frames_written,
                    truncated: outcome.truncated,
                })
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                remove_partial(&output_path);
                Err(ClipError::Write {
                    path: output_path,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn copy_range(
    reader: &mut dyn VideoReader,
    writer: &mut dyn VideoWriter,
    request: &ClipRequest,
) -> Result<CopyOutcome, Box<dyn std::error::Error>> {
    let mut frames_written = 0;
    for item in reader.frames() {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!(
                    "Decode stopped in {} at clip frame {frames_written}: {e}",
                    request.source_path.display()
                );
                break;
            }
        };
        if frame.index() < request.start_frame {
            continue;
        }
        if frame.index() > request.end_frame {
            return Ok(CopyOutcome {
                frames_written,
                truncated: false,
            });
        }

        writer.write(&frame)?;
        frames_written += 1;
        if frames_written % PROGRESS_EVERY == 0 {
            log::debug!(
                "Track {} appearance {}: {frames_written}/{} frames",
                request.track_id,
                request.sequence_number,
                request.frame_count()
            );
        }
        if frame.index() == request.end_frame {
            return Ok(CopyOutcome {
                frames_written,
                truncated: false,
            });
        }
    }
    Ok(CopyOutcome {
        frames_written,
        truncated: true,
    })
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not remove partial clip {}: {e}", path.display());
        }
    }
}
