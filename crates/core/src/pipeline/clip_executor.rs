use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::clipping::domain::clip::{ClipError, ClipRequest, ExtractedClip};
use crate::clipping::domain::clip_extractor::ClipExtractor;

/// Abstracts how a batch of clip extractions is scheduled.
///
/// Results come back in request order, one per request. Implementations
/// check `cancelled` before starting each clip; clips not started are
/// reported as [`ClipError::Cancelled`].
pub trait ClipExecutor: Send {
    fn execute(
        &self,
        extractor: &ClipExtractor,
        requests: Vec<ClipRequest>,
        cancelled: &Arc<AtomicBool>,
    ) -> Vec<Result<ExtractedClip, ClipError>>;
}
