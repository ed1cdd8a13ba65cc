use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clipping::domain::clip::{ClipError, ClipRequest, ExtractedClip};
use crate::clipping::domain::clip_extractor::ClipExtractor;
use crate::pipeline::clip_executor::ClipExecutor;

type ClipResult = Result<ExtractedClip, ClipError>;

/// Runs extractions on a fixed pool of worker threads fed from a shared
/// queue. Each extraction opens its own reader and writer, so workers
/// share nothing but the queue.
pub struct ThreadedClipExecutor {
    workers: usize,
}

impl ThreadedClipExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl ClipExecutor for ThreadedClipExecutor {
    fn execute(
        &self,
        extractor: &ClipExtractor,
        requests: Vec<ClipRequest>,
        cancelled: &Arc<AtomicBool>,
    ) -> Vec<ClipResult> {
        let count = requests.len();
        if count == 0 {
            return Vec::new();
        }
        let workers = self.workers.min(count);

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, ClipRequest)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, ClipResult)>();
        for job in requests.into_iter().enumerate() {
            // Receiver is alive until the scope below ends.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (idx, request) in job_rx {
                        let result = if cancelled.load(Ordering::Relaxed) {
                            Err(ClipError::Cancelled)
                        } else {
                            extractor.extract(&request)
                        };
                        if result_tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<ClipResult>> = (0..count).map(|_| None).collect();
        for (idx, result) in result_rx {
            slots[idx] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(ClipError::Cancelled)))
            .collect()
    }
}
